use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{FetcherConfig, ListenerConfig, SchedulerConfig};
use crate::repository::PgRepository;
use crate::scheduler::Scheduler;
use crate::telemetry::{self};
use crate::worker::{FeedWorkerPool, HttpFetcher};

/// Start the scheduler and its workers; runs until Ctrl-C.
#[derive(Args)]
pub struct RunCmd {
    /// number of concurrent fetch workers (1..=1024)
    #[arg(long)]
    pub workers: Option<usize>,
}

pub async fn run(pool: &PgPool, args: RunCmd) -> Result<()> {
    let log = telemetry::schedule();

    let mut sched_cfg = SchedulerConfig::from_env();
    if let Some(n) = args.workers { sched_cfg = sched_cfg.with_workers(n); }
    let fetch_cfg = FetcherConfig::from_env();

    let repo = Arc::new(PgRepository::new(pool.clone(), ListenerConfig::default()));
    let workers = Arc::new(FeedWorkerPool::new(Arc::clone(&repo), HttpFetcher::new(&fetch_cfg)?, fetch_cfg)?);
    log.info(format!("🚀 Starting feed fetcher — workers={}", sched_cfg.worker_count));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    telemetry::schedule().info("🛑 Ctrl-C received, stopping dispatcher");
                    shutdown.cancel();
                }
                Err(e) => telemetry::schedule().warn_kv("⚠️  Cannot listen for Ctrl-C", [("error", e.to_string())]),
            }
        });
    }

    let span = log.root_span_kv([("workers", sched_cfg.worker_count.to_string())]);
    Scheduler::new(repo, workers, sched_cfg).run(shutdown).instrument(span).await
}
