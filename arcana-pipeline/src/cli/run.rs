//! Run command — the ingestion daemon.

use anyhow::Result;
use chrono::Duration;
use clap::Args;
use tracing::info;

use crate::config::Settings;
use crate::pipeline::{run_daemon, ShutdownSignal};
use crate::source::coinbase::{CoinbaseSettings, CoinbaseSource};
use crate::storage::TradeStore;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Trading pair, e.g. ETH-USD
    pub pair: String,

    /// Poll interval in seconds (default from config: 900)
    #[arg(long)]
    pub interval: Option<u64>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let settings = Settings::load()?;
    let interval =
        std::time::Duration::from_secs(args.interval.unwrap_or(settings.daemon.interval_seconds));

    info!(
        "starting daemon for {} (poll every {}s). Ctrl+C to stop.",
        args.pair,
        interval.as_secs()
    );

    let shutdown = ShutdownSignal::install();
    let store = TradeStore::connect(&settings.database, settings.ingest.batch_size).await?;
    store.init_schema().await?;

    let source = CoinbaseSource::new(CoinbaseSettings::from_config(
        &settings.source,
        &settings.rate,
    ))
    .with_shutdown(shutdown.receiver());

    let window = Duration::seconds(settings.ingest.window_seconds as i64);
    run_daemon(
        &source,
        &store,
        &args.pair,
        interval,
        window,
        settings.ingest.batch_size,
        &shutdown,
    )
    .await?;

    info!("daemon stopped.");
    Ok(())
}
