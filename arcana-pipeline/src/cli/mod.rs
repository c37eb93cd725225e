//! Command-line interface.
//!
//! Exit codes: 0 on success, 1 on operational failure (network
//! exhaustion, schema errors, daemon without a baseline), 2 on bad input
//! (malformed bar spec, invalid date — and clap's own usage errors).

pub mod bars;
pub mod db;
pub mod ingest;
pub mod run;
pub mod status;
pub mod swarm;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use thiserror::Error;

use arcana_common::bars::BarSpecError;

use crate::swarm::SwarmPlanError;

/// Source tag the pipeline ingests from and builds bars over.
pub const DEFAULT_SOURCE: &str = "coinbase";

/// Arcana — quantitative trading data pipeline.
#[derive(Parser)]
#[command(name = "arcana")]
#[command(about = "Quantitative trading data pipeline")]
#[command(version)]
pub struct Cli {
    /// Logging verbosity (overrides config and LOG_LEVEL).
    #[arg(long, global = true, value_parser = ["debug", "info", "warning", "error"])]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Bulk ingest historical trades for a trading pair
    Ingest(ingest::IngestArgs),
    /// Run the ingestion daemon for a trading pair
    Run(run::RunArgs),
    /// Show ingestion status and trade counts
    Status(status::StatusArgs),
    /// Bar construction commands
    #[command(subcommand)]
    Bars(bars::BarsCommands),
    /// Database management commands
    #[command(subcommand)]
    Db(db::DbCommands),
    /// Parallel backfill orchestration
    #[command(subcommand)]
    Swarm(swarm::SwarmCommands),
}

/// Bad user input, rejected before any I/O. Exits with code 2.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct InputError(pub String);

/// Parse a CLI date: `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`, taken as UTC.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, InputError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }
    Err(InputError(format!(
        "invalid date '{raw}' (expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)"
    )))
}

/// Execute the parsed command.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Ingest(args) => ingest::execute(args).await,
        Commands::Run(args) => run::execute(args).await,
        Commands::Status(args) => status::execute(args).await,
        Commands::Bars(cmd) => bars::execute(cmd).await,
        Commands::Db(cmd) => db::execute(cmd).await,
        Commands::Swarm(cmd) => swarm::execute(cmd).await,
    }
}

/// Map an error chain to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let is_input = err.chain().any(|cause| {
        cause.downcast_ref::<InputError>().is_some()
            || cause.downcast_ref::<BarSpecError>().is_some()
            || cause.downcast_ref::<SwarmPlanError>().is_some()
    });
    if is_input {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_both_date_forms() {
        let day = parse_date("2025-01-15").unwrap();
        assert_eq!(day.hour(), 0);
        assert_eq!(day.date_naive().to_string(), "2025-01-15");

        let instant = parse_date("2025-01-15T06:30:00").unwrap();
        assert_eq!(instant.hour(), 6);
        assert_eq!(instant.minute(), 30);
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("2025-13-01").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn input_errors_exit_2() {
        let err = anyhow::Error::new(InputError("bad date".into()));
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::new(InputError("bad".into())).context("while parsing");
        assert_eq!(exit_code(&err), 2);

        let spec_err = "xyz_1".parse::<arcana_common::bars::BarSpec>().unwrap_err();
        assert_eq!(exit_code(&anyhow::Error::new(spec_err)), 2);
    }

    #[test]
    fn operational_errors_exit_1() {
        let err = anyhow::anyhow!("connection refused");
        assert_eq!(exit_code(&err), 1);
    }
}
