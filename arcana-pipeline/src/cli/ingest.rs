//! Ingest command — bulk backfill for a trading pair.

use anyhow::Result;
use chrono::Duration;
use clap::Args;
use tracing::info;

use crate::config::Settings;
use crate::pipeline::{ingest_backfill, ShutdownSignal};
use crate::source::coinbase::{CoinbaseSettings, CoinbaseSource};
use crate::storage::TradeStore;

use super::parse_date;

/// Arguments for the ingest command.
#[derive(Args)]
pub struct IngestArgs {
    /// Trading pair, e.g. ETH-USD
    pub pair: String,

    /// Start date for the backfill (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long)]
    pub since: String,

    /// End date for the backfill (default: now)
    #[arg(long)]
    pub until: Option<String>,
}

pub async fn execute(args: IngestArgs) -> Result<()> {
    let since = parse_date(&args.since)?;
    let until = args.until.as_deref().map(parse_date).transpose()?;

    let settings = Settings::load()?;
    let shutdown = ShutdownSignal::install();

    let store = TradeStore::connect(&settings.database, settings.ingest.batch_size).await?;
    store.init_schema().await?;

    let source = CoinbaseSource::new(CoinbaseSettings::from_config(
        &settings.source,
        &settings.rate,
    ))
    .with_shutdown(shutdown.receiver());

    let window = Duration::seconds(settings.ingest.window_seconds as i64);
    let total = ingest_backfill(
        &source,
        &store,
        &args.pair,
        since,
        until,
        window,
        settings.ingest.batch_size,
        &shutdown,
    )
    .await?;

    info!("done. {} new trades ingested.", total);
    Ok(())
}
