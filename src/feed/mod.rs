use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use sqlx::PgPool;
use tracing::Instrument;

use crate::config::SchedulerConfig;
use crate::repository;
use crate::scheduler;
use crate::telemetry::{self};
use crate::telemetry::ops::feed::Phase as FeedPhase;
use crate::util::url;

mod db;
pub mod types;

/// feed-fetcher feed add/ls
#[derive(Args)]
pub struct FeedCmd {
    #[command(subcommand)]
    pub cmd: FeedSub,
}

#[derive(Subcommand)]
pub enum FeedSub {
    // add a new feed (plan-only by default; use --apply to write)
    Add {
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    // list feeds with their fetch status
    Ls,
}

pub async fn run(pool: &PgPool, args: FeedCmd) -> Result<()> {
    let log = telemetry::feed();
    match args.cmd {
        FeedSub::Add { url, title, apply } => {
            let span = log.root_span_kv([
                ("mode", if apply { "apply".to_string() } else { "plan".to_string() }),
                ("url", url.clone()),
                ("title", format!("{:?}", title)),
            ]);
            add_feed(pool, url, title, apply).instrument(span).await?
        }
        FeedSub::Ls => ls_feeds(pool).instrument(log.root_span()).await?,
    }
    Ok(())
}

async fn add_feed(pool: &PgPool, url: String, title: Option<String>, apply: bool) -> Result<()> {
    let log = telemetry::feed();

    // the worker would only mark it "Invalid URL" later
    if !url::is_url(&url) { bail!("Invalid URL: {}", url); }

    if !apply {
        let _s = log.span(&FeedPhase::Plan).entered();
        log.info(format!("📝 Feed plan — add url={} title={:?}", url, title));
        log.info("   Use --apply to execute.");
        if telemetry::config::json_mode() {
            let plan = types::FeedAddPlan { action: "add", url: url.clone(), title: title.clone() };
            log.plan(&plan)?;
        }
        return Ok(());
    }

    let id = db::insert_feed(pool, &url, title.as_deref()).instrument(log.span(&FeedPhase::Add)).await?;
    match id {
        // the insert trigger tells a running scheduler about it
        Some(id) => log.info(format!("➕ Feed added id={}", id)),
        None => log.info("↩️ Feed already exists"),
    }
    if telemetry::config::json_mode() {
        let result = types::FeedAddResult { inserted: id.is_some(), id, url };
        log.result(&result)?;
    }
    Ok(())
}

async fn ls_feeds(pool: &PgPool) -> Result<()> {
    let log = telemetry::feed();

    let minimum = SchedulerConfig::from_env().minimum_fetch_delay;
    let feeds: Vec<types::FeedListRow> = repository::db::list_feeds(pool).instrument(log.span(&FeedPhase::List)).await?
        .into_iter()
        .map(|f| types::FeedListRow {
            next_fetch: scheduler::deadline_for(&f, minimum),
            id: f.id,
            feed_url: f.feed_url,
            title: f.title,
            article_count: f.article_count,
            working: f.fetcher_state.working,
            last_success: f.fetcher_state.last_success,
            last_error: f.fetcher_state.last_error,
            message: f.fetcher_state.message,
            fetch_delay_s: f.fetcher_state.fetch_delay_s,
        })
        .collect();

    log.info("📡 Feeds:");
    for row in &feeds {
        log.info(format!(
            "[{}] {} ({:?}) articles={} working={} delay={}s next={} msg={:?}",
            row.id, row.feed_url, row.title, row.article_count, row.working, row.fetch_delay_s, row.next_fetch.to_rfc3339(), row.message
        ));
    }
    if telemetry::config::json_mode() {
        let list = types::FeedList { feeds };
        log.result(&list)?;
    }
    Ok(())
}
