//! Arcana CLI entry point.
//!
//! # Logging
//!
//! Configure via environment variables (`RUST_LOG`, `LOG_FORMAT`,
//! `LOG_TIMESTAMPS`) or the global `--log-level` flag.

use clap::Parser;
use tracing::error;

use arcana_common::logging::{init_logging, LogConfig};
use arcana_pipeline::cli::{self, Cli};
use arcana_pipeline::config::Settings;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Filter precedence: RUST_LOG > --log-level > LOG_LEVEL > config.
    let mut log_config = LogConfig::from_env();
    if std::env::var("LOG_LEVEL").is_err() {
        let level = Settings::load()
            .map(|s| s.log.level)
            .unwrap_or_else(|_| "info".to_string());
        log_config = log_config.with_default_level(format!("arcana={level},sqlx=warn"));
    }
    if let Some(level) = &cli.log_level {
        // CLI vocabulary says "warning"; tracing filters say "warn".
        let level = if level == "warning" { "warn" } else { level.as_str() };
        log_config = log_config.with_default_level(level);
    }
    if let Err(e) = init_logging(log_config) {
        eprintln!("failed to initialize logging: {e}");
    }

    if let Err(err) = cli::execute(cli).await {
        error!("{err:#}");
        std::process::exit(cli::exit_code(&err));
    }
}
