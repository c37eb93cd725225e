//! Bulk backfill and daemon mode.
//!
//! Both share the same shape: fetch a window, buffer, commit in batches.
//! A crash loses at most one uncommitted batch; the next run re-fetches
//! it and the store's dedup key absorbs the replay.

use chrono::{DateTime, Duration, Utc};
use std::time::Instant;
use tracing::{info, warn};

use crate::pipeline::{PipelineError, ShutdownSignal};
use crate::source::TradeSource;
use crate::storage::TradeStore;

use arcana_common::data::Trade;

/// The minimum representable timestamp increment on the store
/// (TIMESTAMPTZ has microsecond resolution). Resuming from
/// `max_trade_ts + EPSILON` never re-fetches the boundary trade.
fn epsilon() -> Duration {
    Duration::microseconds(1)
}

/// Bulk backfill trades from `since` to `until` (or now).
///
/// Walks forward through time in fixed windows, committing batches along
/// the way. Resumable: when the store already holds trades for this
/// range, the walk starts just past the newest one. The resume query is
/// bounded by `until` so a swarm worker only sees its own sub-range.
///
/// Returns the number of new trades inserted.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_backfill(
    source: &dyn TradeSource,
    store: &TradeStore,
    pair: &str,
    since: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
    window: Duration,
    batch_size: usize,
    shutdown: &ShutdownSignal,
) -> Result<u64, PipelineError> {
    let end = until.unwrap_or_else(Utc::now);

    let mut cursor = since;
    if let Some(last) = store.max_trade_ts(source.name(), pair, Some(end)).await? {
        let resume = last + epsilon();
        if resume > cursor {
            info!("resuming from {} (found existing data)", last);
            cursor = resume;
        }
    }

    if cursor >= end {
        info!("nothing to backfill for {} {} — range already covered", source.name(), pair);
        return Ok(0);
    }

    let window_secs = window.num_seconds().max(1);
    let total_windows =
        (((end - cursor).num_seconds() as f64) / window_secs as f64).ceil().max(1.0) as u64;

    info!(
        "starting backfill: {} {} from {} to {} (~{} windows)",
        source.name(),
        pair,
        cursor.format("%Y-%m-%d %H:%M"),
        end.format("%Y-%m-%d %H:%M"),
        total_windows
    );

    let started = Instant::now();
    let mut buffer: Vec<Trade> = Vec::new();
    let mut total_inserted = 0u64;
    let mut window_num = 0u64;

    while cursor < end {
        if shutdown.is_cancelled() {
            info!("shutdown requested — committing remaining buffer...");
            break;
        }

        let window_end = (cursor + window).min(end);
        window_num += 1;

        let trades = match source.fetch_window(pair, cursor, window_end).await {
            Ok(trades) => trades,
            Err(err) => {
                // Commit what we have before surfacing the failure; the
                // next run resumes from here.
                total_inserted += store.insert_trades(&buffer).await?;
                buffer.clear();
                return Err(err.into());
            }
        };

        let fetched = trades.len();
        buffer.extend(trades);

        // Checkpoint: commit once the buffer holds a full batch. Windows
        // with zero trades just advance the cursor.
        if buffer.len() >= batch_size {
            total_inserted += store.insert_trades(&buffer).await?;
            buffer.clear();
        }

        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            total_inserted as f64 / elapsed
        } else {
            0.0
        };
        let eta = if elapsed > 0.0 {
            total_windows.saturating_sub(window_num) as f64 * (elapsed / window_num as f64)
        } else {
            0.0
        };
        info!(
            "window {}/{} | {} -> {} | {} trades this window | total: {} stored | {:.1} trades/s | ETA: {}",
            window_num,
            total_windows,
            cursor.format("%Y-%m-%d %H:%M"),
            window_end.format("%Y-%m-%d %H:%M"),
            fetched,
            total_inserted + buffer.len() as u64,
            rate,
            format_eta(eta)
        );

        cursor = window_end;
    }

    total_inserted += store.insert_trades(&buffer).await?;

    info!(
        "backfill complete: {} new trades in {}",
        total_inserted,
        format_eta(started.elapsed().as_secs_f64())
    );
    Ok(total_inserted)
}

/// Run the ingestion daemon: poll for new trades on a timer.
///
/// Requires a backfill-established baseline — with no prior trades there
/// is no resume point and the daemon exits with an error. On startup any
/// gap since the last stored trade is closed with a mini-backfill, then
/// each cycle fetches `[last_ts, now)` and commits.
#[allow(clippy::too_many_arguments)]
pub async fn run_daemon(
    source: &dyn TradeSource,
    store: &TradeStore,
    pair: &str,
    interval: std::time::Duration,
    window: Duration,
    batch_size: usize,
    shutdown: &ShutdownSignal,
) -> Result<(), PipelineError> {
    let Some(mut last_ts) = store.max_trade_ts(source.name(), pair, None).await? else {
        return Err(PipelineError::NoBaseline {
            pair: pair.to_string(),
        });
    };

    info!(
        "daemon starting for {} {} | last trade: {} | poll interval: {}s",
        source.name(),
        pair,
        last_ts,
        interval.as_secs()
    );

    // Catch-up phase: close the gap from the last stored trade to now.
    let gap = Utc::now() - last_ts;
    if gap.num_seconds() > interval.as_secs() as i64 {
        info!("catching up: {} gap detected", format_eta(gap.num_seconds() as f64));
        ingest_backfill(
            source, store, pair, last_ts, None, window, batch_size, shutdown,
        )
        .await?;
        if let Some(ts) = store.max_trade_ts(source.name(), pair, None).await? {
            last_ts = ts;
        }
    }

    let mut cycle = 0u64;
    while !shutdown.is_cancelled() {
        cycle += 1;

        match poll_cycle(source, store, pair, last_ts).await {
            Ok(Some((fetched, inserted, new_last))) => {
                info!(
                    "cycle {} | {} trades fetched, {} new | last: {}",
                    cycle, fetched, inserted, new_last
                );
                last_ts = new_last;
            }
            Ok(None) => info!("cycle {} | no new trades", cycle),
            // A failed cycle is retried at the next interval; transient
            // upstream trouble should not kill a long-running daemon.
            Err(err) => warn!("cycle {} failed: {}. Will retry next cycle.", cycle, err),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait() => {}
        }
    }

    let total = store.trade_count(Some(pair)).await.unwrap_or(0);
    info!("daemon stopped. total trades for {}: {}", pair, total);
    Ok(())
}

/// One poll: fetch `[last_ts, now)`, insert, report the new high-water
/// mark. `None` when the window was empty.
async fn poll_cycle(
    source: &dyn TradeSource,
    store: &TradeStore,
    pair: &str,
    last_ts: DateTime<Utc>,
) -> Result<Option<(usize, u64, DateTime<Utc>)>, PipelineError> {
    let now = Utc::now();
    let trades = source.fetch_window(pair, last_ts + epsilon(), now).await?;
    if trades.is_empty() {
        return Ok(None);
    }

    let fetched = trades.len();
    let inserted = store.insert_trades(&trades).await?;
    let new_last = store
        .max_trade_ts(source.name(), pair, None)
        .await?
        .unwrap_or(last_ts);
    Ok(Some((fetched, inserted, new_last)))
}

/// Format seconds into a human-readable duration.
pub fn format_eta(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.0}s")
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else {
        let hours = (seconds / 3600.0).floor() as i64;
        let minutes = ((seconds % 3600.0) / 60.0).floor() as i64;
        format!("{hours}h {minutes}m")
    }
}
