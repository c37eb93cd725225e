//! Stream-level properties of the bar builders: every family over one
//! trade stream, batch-split independence, deterministic rebuilds, and
//! warm resume from persisted metadata.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use arcana_common::bars::{builder_for, Bar, BarSpec};
use arcana_common::data::{Trade, TradeSide};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap()
}

/// Deterministic mixed stream: drifting prices, uneven sizes, buys,
/// sells, and the occasional unreported side.
fn stream(count: usize) -> Vec<Trade> {
    (0..count)
        .map(|i| {
            let price = Decimal::from(2800 + ((i * 7) % 23) as i64 - 11);
            let size = Decimal::new(5 + ((i * 3) % 40) as i64, 1); // 0.5 .. 4.4
            let side = match i % 5 {
                0 | 3 => TradeSide::Buy,
                1 | 4 => TradeSide::Sell,
                _ => TradeSide::Unknown,
            };
            Trade {
                timestamp: base_time() + Duration::seconds(i as i64),
                trade_id: format!("t-{i:06}"),
                source: "coinbase".to_string(),
                pair: "ETH-USD".to_string(),
                price,
                size,
                side,
            }
        })
        .collect()
}

const ALL_SPECS: [&str; 10] = [
    "tick_10",
    "volume_25",
    "dollar_50000",
    "time_30s",
    "tib_8",
    "vib_8",
    "dib_8",
    "trb_8",
    "vrb_8",
    "drb_8",
];

fn build_all(spec: &str, trades: &[Trade], flush: bool) -> Vec<Bar> {
    let spec: BarSpec = spec.parse().unwrap();
    let mut builder = builder_for(&spec, "coinbase", "ETH-USD", None);
    let mut bars = builder.process_trades(trades);
    if flush {
        bars.extend(builder.flush());
    }
    bars
}

#[test]
fn every_family_upholds_bar_invariants() {
    let trades = stream(300);
    for spec in ALL_SPECS {
        let bars = build_all(spec, &trades, true);
        assert!(!bars.is_empty(), "{spec} produced no bars");

        let mut prev_end: Option<DateTime<Utc>> = None;
        for bar in &bars {
            assert!(bar.low <= bar.open && bar.open <= bar.high, "{spec}: open outside range");
            assert!(bar.low <= bar.close && bar.close <= bar.high, "{spec}: close outside range");
            assert!(bar.low <= bar.vwap && bar.vwap <= bar.high, "{spec}: vwap outside range");
            assert!(bar.tick_count > 0, "{spec}: empty bar emitted");
            assert!(bar.volume > Decimal::ZERO, "{spec}: zero volume");
            assert!(bar.time_start <= bar.time_end, "{spec}: inverted time span");
            if let Some(prev) = prev_end {
                assert!(bar.time_start >= prev, "{spec}: bars overlap");
            }
            prev_end = Some(bar.time_end);
        }

        // With flush, every trade lands in exactly one bar.
        let counted: i64 = bars.iter().map(|b| b.tick_count).sum();
        assert_eq!(counted, trades.len() as i64, "{spec}: trades lost or duplicated");
    }
}

#[test]
fn batch_splits_do_not_change_the_bars() {
    let trades = stream(250);
    for spec in ALL_SPECS {
        let whole = build_all(spec, &trades, true);

        let parsed: BarSpec = spec.parse().unwrap();
        let mut builder = builder_for(&parsed, "coinbase", "ETH-USD", None);
        let mut chunked = Vec::new();
        for chunk in trades.chunks(7) {
            chunked.extend(builder.process_trades(chunk));
        }
        chunked.extend(builder.flush());

        assert_eq!(whole, chunked, "{spec}: emission depends on batch boundaries");
    }
}

#[test]
fn rebuild_from_the_same_log_is_deterministic() {
    let trades = stream(300);
    for spec in ["tib_8", "vib_8", "dib_8", "trb_8", "vrb_8", "drb_8"] {
        let first = build_all(spec, &trades, true);
        let second = build_all(spec, &trades, true);
        assert_eq!(first, second, "{spec}: rebuild diverged");
        // Metadata (EWMA state) reproduces exactly as well.
        assert_eq!(
            first.last().unwrap().metadata,
            second.last().unwrap().metadata
        );
    }
}

#[test]
fn tick_bars_hold_exactly_n_trades_except_the_tail() {
    let trades = stream(305);
    let bars = build_all("tick_10", &trades, true);
    let (tail, full) = bars.split_last().unwrap();
    assert!(full.iter().all(|b| b.tick_count == 10));
    assert_eq!(tail.tick_count, 5);
}

#[test]
fn time_bars_align_to_epoch_buckets() {
    let trades = stream(300);
    let bars = build_all("time_30s", &trades, true);

    let mut buckets = std::collections::HashSet::new();
    for bar in &bars {
        // The stream is dense (one trade per second), so every bucket's
        // first trade sits on the bucket boundary.
        assert_eq!(bar.time_start.timestamp() % 30, 0);
        // time_start and time_end stay inside one 30s bucket.
        assert_eq!(
            bar.time_start.timestamp().div_euclid(30),
            bar.time_end.timestamp().div_euclid(30),
            "bar spans bucket boundary"
        );
        assert!(
            buckets.insert(bar.time_start.timestamp().div_euclid(30)),
            "two bars share one bucket"
        );
    }
}

#[test]
fn warm_resume_matches_the_uninterrupted_run() {
    // All sides reported: the persisted metadata then captures the full
    // builder state (EWMA + sign carry), making resume exact. Runs of
    // three keep the run builders honest.
    let trades: Vec<Trade> = stream(300)
        .into_iter()
        .enumerate()
        .map(|(i, mut t)| {
            t.side = if (i / 3) % 2 == 0 {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            };
            t
        })
        .collect();

    for spec in ["tib_8", "dib_8", "trb_8", "drb_8"] {
        let parsed: BarSpec = spec.parse().unwrap();

        // Uninterrupted run, no flush.
        let mut reference = builder_for(&parsed, "coinbase", "ETH-USD", None);
        let all_bars = reference.process_trades(&trades);
        assert!(all_bars.len() >= 4, "{spec}: stream too short for the scenario");

        // Cut at the end of an emitted bar mid-stream, as a restart
        // between batches would.
        let k = all_bars.len() / 2;
        let cut_bar = &all_bars[k];
        let cut_index = trades
            .iter()
            .position(|t| t.timestamp == cut_bar.time_end)
            .unwrap();

        let mut resumed = builder_for(&parsed, "coinbase", "ETH-USD", None);
        resumed.restore_state(cut_bar.metadata.as_ref().unwrap());
        let resumed_bars = resumed.process_trades(&trades[cut_index + 1..]);

        assert_eq!(resumed_bars, &all_bars[k + 1..], "{spec}: warm resume diverged");
    }
}
