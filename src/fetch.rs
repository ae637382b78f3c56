use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{FetcherConfig, ListenerConfig};
use crate::repository::PgRepository;
use crate::scheduler::Repository;
use crate::telemetry::{self};
use crate::worker::{FeedWorkerPool, HttpFetcher};

/// Run the ingestion pipeline once for one feed, outside the scheduler.
#[derive(Args)]
pub struct FetchCmd {
    #[arg(long)]
    pub feed: Uuid,
}

pub async fn run(pool: &PgPool, args: FetchCmd) -> Result<()> {
    let span = telemetry::fetch().root_span_kv([("feed", args.feed.to_string())]);
    fetch_once(pool, args).instrument(span).await
}

async fn fetch_once(pool: &PgPool, args: FetchCmd) -> Result<()> {
    let log = telemetry::fetch();
    let cfg = FetcherConfig::from_env();
    let repo = Arc::new(PgRepository::new(pool.clone(), ListenerConfig::default()));
    let workers = FeedWorkerPool::new(Arc::clone(&repo), HttpFetcher::new(&cfg)?, cfg)?;

    let mut feed = repo.get_feed(args.feed).await?;
    log.info(format!("🌐 Fetching {} ({})", feed.feed_url, feed.id));
    let summary = workers.fetch_feed(&mut feed).await?;

    log.info(format!(
        "✅ Done — total={} new={} failed={} broken={} https_upgraded={} next_delay={}s",
        summary.total, summary.new, summary.failed, summary.broken, summary.https_upgraded, feed.fetcher_state.fetch_delay_s
    ));
    if telemetry::config::json_mode() {
        log.result(&summary)?;
    }
    Ok(())
}
