use anyhow::{Context, Result};
use clap::Args;
use sqlx::PgPool;
use tracing::Instrument;

use crate::telemetry::{self};
use crate::telemetry::ops::init::Phase as InitPhase;

/// Apply the embedded migrations.
#[derive(Args)]
pub struct InitCmd {}

pub async fn run(pool: &PgPool, _args: InitCmd) -> Result<()> {
    let log = telemetry::init();

    // idempotent
    async { sqlx::migrate!().run(pool).instrument(log.span(&InitPhase::Migrate)).await }
        .instrument(log.root_span())
        .await
        .context("applying migrations")?;

    log.info("✅ Database initialized");
    if telemetry::config::json_mode() {
        log.result(&serde_json::json!({ "migrated": true }))?;
    }
    Ok(())
}
