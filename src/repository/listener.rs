use anyhow::{bail, Result};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ListenerConfig;
use crate::telemetry::{self};
use crate::telemetry::ops::listen::Phase as ListenPhase;
use super::types::{self, Change};

fn trigger_sql(channel: &str) -> Vec<String> {
    vec![
        "DROP TRIGGER IF EXISTS feeds_notify_event ON feeds".to_string(),
        "DROP TRIGGER IF EXISTS feeds_notify_url_change ON feeds".to_string(),
        "DROP TRIGGER IF EXISTS feeds_notify_truncate ON feeds".to_string(),
        format!(r#"
CREATE OR REPLACE FUNCTION notify_event() RETURNS TRIGGER AS $$
    DECLARE
        feed_id uuid;
        notification json;
    BEGIN
        IF (TG_LEVEL = 'STATEMENT') THEN
            feed_id = NULL;
        ELSIF (TG_OP = 'DELETE') THEN
            feed_id = OLD.id;
        ELSE
            feed_id = NEW.id;
        END IF;

        notification = json_build_object(
                          'table', TG_TABLE_NAME,
                          'action', TG_OP,
                          'feed_id', feed_id);

        PERFORM pg_notify('{channel}', notification::text);
        RETURN NULL;
    END;
$$ LANGUAGE plpgsql"#),
        "CREATE TRIGGER feeds_notify_event AFTER INSERT OR DELETE ON feeds FOR EACH ROW EXECUTE PROCEDURE notify_event()".to_string(),
        // the fetcher rewrites feed_url on every update; only a real change matters
        "CREATE TRIGGER feeds_notify_url_change AFTER UPDATE OF feed_url ON feeds FOR EACH ROW \
         WHEN (OLD.feed_url IS DISTINCT FROM NEW.feed_url) EXECUTE PROCEDURE notify_event()".to_string(),
        "CREATE TRIGGER feeds_notify_truncate AFTER TRUNCATE ON feeds FOR EACH STATEMENT EXECUTE PROCEDURE notify_event()".to_string(),
    ]
}

fn valid_channel(channel: &str) -> bool {
    !channel.is_empty() && channel.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// (Re)create the notify trigger on `feeds`.
pub async fn install_trigger(pool: &PgPool, channel: &str) -> Result<()> {
    if !valid_channel(channel) { bail!("invalid notification channel name {channel:?}"); }
    let mut tx = pool.begin().await?;
    for stmt in trigger_sql(channel) {
        sqlx::query(&stmt).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Install the trigger, LISTEN, and forward notifications from a background task.
///
/// Errors here mean change notifications aren't available at all.
pub async fn watch(pool: PgPool, cfg: ListenerConfig, feed_added: mpsc::Sender<Uuid>, need_rehash: mpsc::Sender<bool>) -> Result<()> {
    let log = telemetry::listen();
    install_trigger(&pool, &cfg.channel).instrument(log.span(&ListenPhase::Install)).await?;

    let mut listener = PgListener::connect_with(&pool).await?;
    listener.listen(&cfg.channel).await?;
    log.info_kv("👂 added feed change trigger and listener", [("channel", cfg.channel.clone())]);

    let span = log.root_span_kv([("channel", cfg.channel.clone())]);
    tokio::spawn(listen_loop(listener, cfg, feed_added, need_rehash).instrument(span));
    Ok(())
}

async fn listen_loop(mut listener: PgListener, cfg: ListenerConfig, feed_added: mpsc::Sender<Uuid>, need_rehash: mpsc::Sender<bool>) {
    let log = telemetry::listen();
    loop {
        let reason = match listener.try_recv().instrument(log.span(&ListenPhase::Receive)).await {
            Ok(Some(n)) => {
                log.info_kv("🔔 got notification", [("payload", n.payload().to_string())]);
                if !forward(n.payload(), &feed_added, &need_rehash).await {
                    log.info("scheduler is gone, stopping listener");
                    return;
                }
                continue;
            }
            Ok(None) => "connection closed".to_string(),
            Err(e) => e.to_string(),
        };

        {
            let _s = log.span(&ListenPhase::Reconnect).entered();
            log.warn_kv("listener connection lost, reconnecting", [("reason", reason), ("wait", format!("{:?}", cfg.reconnect_delay))]);
        }
        // PgListener reconnects on the next receive
        tokio::time::sleep(cfg.reconnect_delay).await;
        // anything that happened while we were away is unknown
        if need_rehash.try_send(true).is_err() && need_rehash.is_closed() { return; }
    }
}

/// Hand a notification to the scheduler. False once the scheduler stopped listening.
pub async fn forward(payload: &str, feed_added: &mpsc::Sender<Uuid>, need_rehash: &mpsc::Sender<bool>) -> bool {
    let log = telemetry::listen();
    match types::classify(payload) {
        Ok(Change::Added(id)) => feed_added.send(id).await.is_ok(),
        // one pending pulse is enough
        Ok(Change::Rehash) => !matches!(need_rehash.try_send(true), Err(TrySendError::Closed(_))),
        Ok(Change::Ignored(action)) => {
            log.warn_kv("ignoring payload with unhandled action", [("action", action)]);
            true
        }
        Err(e) => {
            log.error_kv("couldn't decode notification payload", [("error", format!("{e:#}"))]);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_inserts_and_coalesces_rehash() {
        let (added_tx, mut added_rx) = mpsc::channel(4);
        let (rehash_tx, mut rehash_rx) = mpsc::channel(1);
        let id = Uuid::new_v4();

        let insert = format!(r#"{{"table":"feeds","action":"INSERT","feed_id":"{id}"}}"#);
        assert!(forward(&insert, &added_tx, &rehash_tx).await);
        assert_eq!(added_rx.recv().await, Some(id));

        let update = format!(r#"{{"table":"feeds","action":"UPDATE","feed_id":"{id}"}}"#);
        assert!(forward(&update, &added_tx, &rehash_tx).await);
        assert!(forward(&update, &added_tx, &rehash_tx).await);
        assert_eq!(rehash_rx.recv().await, Some(true));
        assert!(rehash_rx.try_recv().is_err());

        assert!(forward("garbage", &added_tx, &rehash_tx).await);
    }

    #[tokio::test]
    async fn stops_when_scheduler_is_gone() {
        let (added_tx, added_rx) = mpsc::channel::<Uuid>(1);
        let (rehash_tx, rehash_rx) = mpsc::channel::<bool>(1);
        drop(added_rx);
        drop(rehash_rx);
        let id = Uuid::new_v4();
        let insert = format!(r#"{{"table":"feeds","action":"INSERT","feed_id":"{id}"}}"#);
        assert!(!forward(&insert, &added_tx, &rehash_tx).await);
        let delete = format!(r#"{{"table":"feeds","action":"DELETE","feed_id":"{id}"}}"#);
        assert!(!forward(&delete, &added_tx, &rehash_tx).await);
    }

    #[test]
    fn trigger_uses_channel_and_skips_unchanged_urls() {
        let sql = trigger_sql("feed_change").join(";\n");
        assert!(sql.contains("pg_notify('feed_change'"));
        assert!(sql.contains("OLD.feed_url IS DISTINCT FROM NEW.feed_url"));
        assert!(sql.contains("AFTER TRUNCATE"));
        assert!(valid_channel("feed_change"));
        assert!(!valid_channel("x'); DROP TABLE feeds; --"));
        assert!(!valid_channel(""));
    }
}
