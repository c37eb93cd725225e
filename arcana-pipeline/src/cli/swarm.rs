//! Swarm commands — parallel backfill planning, validation, progress.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::Settings;
use crate::storage::TradeStore;
use crate::swarm::{
    missing_days, render_compose, split_months, split_range, worker_summary, ComposeDb,
};

use super::{parse_date, DEFAULT_SOURCE};

/// Swarm subcommands.
#[derive(Subcommand)]
pub enum SwarmCommands {
    /// Plan a parallel backfill and write its docker-compose manifest
    Plan(PlanArgs),
    /// Report UTC days with zero stored trades inside a range
    Validate(ValidateArgs),
    /// Show per-month ingestion progress
    Status(SwarmStatusArgs),
}

/// Arguments for the plan command.
#[derive(Args)]
pub struct PlanArgs {
    /// Trading pair, e.g. ETH-USD
    pub pair: String,

    /// Start of the backfill range
    #[arg(long)]
    pub since: String,

    /// End of the backfill range (default: now)
    #[arg(long)]
    pub until: Option<String>,

    /// Number of workers; omit to partition on calendar months
    #[arg(long)]
    pub workers: Option<usize>,

    /// Docker image for the workers
    #[arg(long, default_value = "arcana:latest")]
    pub image: String,

    /// Output compose file
    #[arg(long, default_value = "docker-compose.swarm.yml")]
    pub output: String,

    /// Database hostname within the compose network
    #[arg(long, default_value = "db")]
    pub db_host: String,
}

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Trading pair, e.g. ETH-USD
    pub pair: String,

    /// Start of the expected data range
    #[arg(long)]
    pub since: String,

    /// End of the expected data range (default: now)
    #[arg(long)]
    pub until: Option<String>,
}

/// Arguments for the swarm status command.
#[derive(Args)]
pub struct SwarmStatusArgs {
    /// Trading pair, e.g. ETH-USD
    pub pair: String,
}

pub async fn execute(cmd: SwarmCommands) -> Result<()> {
    match cmd {
        SwarmCommands::Plan(args) => execute_plan(args).await,
        SwarmCommands::Validate(args) => execute_validate(args).await,
        SwarmCommands::Status(args) => execute_status(args).await,
    }
}

async fn execute_plan(args: PlanArgs) -> Result<()> {
    let since = parse_date(&args.since)?;
    let until = args
        .until
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or_else(chrono::Utc::now);

    let chunks = match args.workers {
        Some(workers) => split_range(since, until, workers)?,
        None => split_months(since, until)?,
    };

    println!("{}", worker_summary(&args.pair, since, until, &chunks));
    println!();

    let settings = Settings::load()?;
    let db = ComposeDb {
        host: args.db_host.clone(),
        port: settings.database.port,
        name: settings.database.name.clone(),
        user: settings.database.user.clone(),
        password: if settings.database.password.is_empty() {
            "arcana".to_string()
        } else {
            settings.database.password.clone()
        },
    };

    let manifest = render_compose(&args.pair, &chunks, &db, &args.image);
    std::fs::write(&args.output, manifest)?;

    println!("Compose file written to: {}", args.output);
    println!();
    println!("To start the swarm:");
    println!("  docker compose -f {} up -d", args.output);
    println!();
    println!("To monitor progress:");
    println!("  arcana swarm status {}", args.pair);
    Ok(())
}

async fn execute_validate(args: ValidateArgs) -> Result<()> {
    let since = parse_date(&args.since)?;
    let until = args
        .until
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or_else(chrono::Utc::now);

    let settings = Settings::load()?;
    let store = TradeStore::connect(&settings.database, settings.ingest.batch_size).await?;

    let counts = store
        .count_by_day(DEFAULT_SOURCE, &args.pair, since, until)
        .await?;
    let total = store.trade_count(Some(&args.pair)).await?;
    let gaps = missing_days(&counts, since, until);

    println!(
        "Validation: {} | {} -> {}",
        args.pair,
        since.date_naive(),
        until.date_naive()
    );
    println!("  Total trades: {total}");

    if gaps.is_empty() {
        println!("  No gaps detected. Coverage is complete.");
    } else {
        println!("  Days with zero trades: {}", gaps.len());
        for day in gaps {
            println!("  GAP: {day}");
        }
    }
    Ok(())
}

async fn execute_status(args: SwarmStatusArgs) -> Result<()> {
    let settings = Settings::load()?;
    let store = TradeStore::connect(&settings.database, settings.ingest.batch_size).await?;

    let months = store.month_summary(DEFAULT_SOURCE, &args.pair).await?;
    let total = store.trade_count(Some(&args.pair)).await?;

    println!("Swarm status: {}", args.pair);
    println!("  Total trades: {total}");
    println!();

    if months.is_empty() {
        println!("  No trades found.");
        return Ok(());
    }

    println!(
        "  {:>8}  {:>12}  {:>17}  {:>17}",
        "Month", "Trades", "First", "Last"
    );
    for stat in months {
        println!(
            "  {:>8}  {:>12}  {:>17}  {:>17}",
            stat.month.format("%Y-%m"),
            stat.count,
            stat.first.format("%Y-%m-%d %H:%M"),
            stat.last.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}
