//! Bar construction over the stored trade log.

use chrono::Duration;
use tracing::{debug, info};

use arcana_common::bars::BarBuilder;

use crate::pipeline::{PipelineError, ShutdownSignal};
use crate::storage::{TradeCursor, TradeStore};

/// Trades per page when streaming the log through a builder.
pub const TRADE_BATCH: i64 = 100_000;

/// Build bars for one family from the stored trade log.
///
/// Incremental by default: the most recent bar marks the resume point,
/// the builder's EWMA state is restored from its metadata, any stale
/// bars past it (leftovers of an interrupted build) are deleted, and
/// trades strictly after it are streamed through the builder in keyset-
/// paginated batches. With `rebuild` the family's bars are dropped first
/// and the build restarts from the first stored trade — deterministic,
/// so it regenerates an equivalent bar sequence and EWMA series.
///
/// The in-progress partial bar is flushed only at end of data (or on
/// graceful shutdown), never between batches.
///
/// Returns the number of bars written. An empty trade log yields zero
/// bars and succeeds.
pub async fn build_bars(
    builder: &mut dyn BarBuilder,
    store: &TradeStore,
    source: &str,
    pair: &str,
    rebuild: bool,
    shutdown: &ShutdownSignal,
) -> Result<u64, PipelineError> {
    let bar_type = builder.bar_type().to_string();

    if rebuild {
        let deleted = store.delete_all_bars(&bar_type, source, pair).await?;
        if deleted > 0 {
            info!("rebuild: deleted {} existing {} bars", deleted, bar_type);
        }
    }

    let mut cursor = match store.last_bar(&bar_type, source, pair).await? {
        Some(last) => {
            if let Some(metadata) = &last.metadata {
                builder.restore_state(metadata);
            }
            let stale = store
                .delete_bars_since(&bar_type, source, pair, last.time_end)
                .await?;
            if stale > 0 {
                debug!("deleted {} stale bars past the resume point", stale);
            }
            info!("resuming {} for {} from {}", bar_type, pair, last.time_end);
            TradeCursor::From(last.time_end + Duration::microseconds(1))
        }
        None => match store.first_trade_ts(source, pair).await? {
            Some(first) => TradeCursor::From(first),
            None => {
                info!("no trades stored for {} {}; nothing to build", source, pair);
                return Ok(0);
            }
        },
    };

    let mut total = 0u64;
    let mut processed = 0u64;

    loop {
        if shutdown.is_cancelled() {
            info!("shutdown requested — flushing partial bar...");
            break;
        }

        let trades = store.trades_since(source, pair, &cursor, TRADE_BATCH).await?;
        if trades.is_empty() {
            break;
        }

        let batch_len = trades.len();
        let next_cursor = trades
            .last()
            .map(|t| TradeCursor::After(t.timestamp, t.trade_id.clone()));

        let bars = builder.process_trades(&trades);
        processed += batch_len as u64;
        if !bars.is_empty() {
            total += store.insert_bars(&bars).await?;
        }
        debug!("processed {} trades -> {} bars", batch_len, bars.len());

        if (batch_len as i64) < TRADE_BATCH {
            break;
        }
        match next_cursor {
            Some(next) => cursor = next,
            None => break,
        }
    }

    if let Some(bar) = builder.flush() {
        total += store.insert_bars(&[bar]).await?;
    }

    info!(
        "built {} {} bars for {} from {} trades",
        total, bar_type, pair, processed
    );
    Ok(total)
}
