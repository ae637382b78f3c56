use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;
use tracing::Instrument;

mod config;
mod feed;
mod fetch;
mod init;
mod repository;
mod run;
mod scheduler;
mod telemetry;
mod util;
mod worker;

use telemetry::ops::init::Phase as InitPhase;

#[derive(Parser)]
#[command(name = "feed-fetcher", about = "Feed scheduling and ingestion worker")]
struct Cli {
    #[arg(global = true, short, long)]
    dsn: Option<String>,
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Init(init::InitCmd),
    Run(run::RunCmd),
    Fetch(fetch::FetchCmd),
    Feed(feed::FeedCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // initialize logging/tracing (stderr). Respect RUST_LOG and FETCHER_LOG_FORMAT
    telemetry::config::init_tracing();
    let dsn = cli
        .dsn
        .or_else(|| env::var("DATABASE_URL").ok())
        .context("Please provide --dsn or set DATABASE_URL in .env")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&dsn)
        .instrument(telemetry::init().span(&InitPhase::Connect))
        .await
        .context("connecting to database")?;

    match cli.command {
        Commands::Init(args) => init::run(&pool, args).await?,
        Commands::Run(args) => run::run(&pool, args).await?,
        Commands::Fetch(args) => fetch::run(&pool, args).await?,
        Commands::Feed(args) => feed::run(&pool, args).await?,
    }

    Ok(())
}
