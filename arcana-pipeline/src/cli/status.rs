//! Status command — trade counts and ingestion lag.

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use crate::config::Settings;
use crate::pipeline::format_eta;
use crate::storage::TradeStore;

use super::DEFAULT_SOURCE;

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Trading pair, e.g. ETH-USD (omit for all pairs)
    pub pair: Option<String>,
}

pub async fn execute(args: StatusArgs) -> Result<()> {
    let settings = Settings::load()?;
    let store = TradeStore::connect(&settings.database, settings.ingest.batch_size).await?;

    let total = store.trade_count(args.pair.as_deref()).await?;

    match &args.pair {
        Some(pair) => {
            println!("Pair: {pair}");
            println!("  Total trades: {total}");
            match store.max_trade_ts(DEFAULT_SOURCE, pair, None).await? {
                Some(last) => {
                    let gap = Utc::now() - last;
                    println!("  Last trade:   {last}");
                    println!("  Data gap:     {}", format_eta(gap.num_seconds().max(0) as f64));
                }
                None => println!("  No trades stored yet."),
            }
        }
        None => {
            println!("All pairs");
            println!("  Total trades: {total}");
        }
    }

    Ok(())
}
