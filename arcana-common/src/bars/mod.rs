//! Bar construction layer — transforms raw trades into sampling bars.
//!
//! Ten bar families share the same output schema (OHLCV + auxiliary info)
//! and the same running [`Accumulator`]; they differ only in what triggers
//! emission:
//!
//! - Fixed-threshold: tick, volume, dollar, time ([`standard`])
//! - Adaptive imbalance: tib, vib, dib ([`imbalance`])
//! - Adaptive run: trb, vrb, drb ([`runs`])
//!
//! Adaptive families estimate their emission threshold with an EWMA of
//! prior bar statistics ([`ewma`]) and persist that state inside the
//! emitted bar's metadata, which makes warm restarts lossless.

mod accumulator;
mod ewma;
mod imbalance;
mod runs;
mod spec;
mod standard;

pub use accumulator::Accumulator;
pub use ewma::{tick_rule, EwmaEstimator, SignTracker};
pub use imbalance::ImbalanceBarBuilder;
pub use runs::RunBarBuilder;
pub use spec::{BarSpec, BarSpecError, FlowKind};
pub use standard::{DollarBarBuilder, TickBarBuilder, TimeBarBuilder, VolumeBarBuilder};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Trade;

/// A single completed bar.
///
/// Uniqueness key for storage: `(bar_type, source, pair, time_start)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Timestamp of the first trade in the bar.
    pub time_start: DateTime<Utc>,
    /// Timestamp of the last trade in the bar.
    pub time_end: DateTime<Utc>,
    /// Bar type label, e.g. `tick_500`, `tib_10`. Drives table naming.
    pub bar_type: String,
    /// Data source, e.g. `coinbase`.
    pub source: String,
    /// Trading pair, e.g. `ETH-USD`.
    pub pair: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Volume-weighted average price, computed once at emission.
    pub vwap: Decimal,
    /// Total base-currency volume.
    pub volume: Decimal,
    /// Total quote-currency volume.
    pub dollar_volume: Decimal,
    /// Number of trades in the bar.
    pub tick_count: i64,
    /// Bar-specific extra info. Adaptive families carry their EWMA state
    /// here; `None` for fixed-threshold families.
    pub metadata: Option<serde_json::Value>,
}

impl Bar {
    /// Duration from first to last trade.
    pub fn time_span(&self) -> chrono::Duration {
        self.time_end - self.time_start
    }
}

/// Common interface for all bar builders.
///
/// Builders are stateful: they accumulate trades across `process_trades`
/// calls, which is essential for daemon mode where trades arrive in
/// batches. Trades must be fed in ascending timestamp order.
pub trait BarBuilder: Send {
    /// Label for this bar type, e.g. `tick_500`, `time_5m`.
    fn bar_type(&self) -> &str;

    /// Process one trade. Returns a completed bar when the emission
    /// predicate fires; the triggering trade is the last trade of the
    /// emitted bar (time bars emit the *previous* bucket instead).
    fn process_trade(&mut self, trade: &Trade) -> Option<Bar>;

    /// Process a batch of trades, collecting completed bars.
    fn process_trades(&mut self, trades: &[Trade]) -> Vec<Bar> {
        let mut bars = Vec::new();
        for trade in trades {
            if let Some(bar) = self.process_trade(trade) {
                bars.push(bar);
            }
        }
        bars
    }

    /// Emit the in-progress partial bar, if any.
    ///
    /// Only to be called at end of data or graceful shutdown — never
    /// between batches of the same logical stream. A premature flush
    /// yields a bar below threshold and corrupts the EWMA series of
    /// adaptive families.
    fn flush(&mut self) -> Option<Bar>;

    /// Restore builder state from a previously emitted bar's metadata.
    ///
    /// Adaptive families restore their EWMA estimator and tick-rule carry
    /// from here on warm resume. No-op for fixed-threshold families.
    fn restore_state(&mut self, _metadata: &serde_json::Value) {}
}

/// Construct the builder for a parsed bar spec.
///
/// `initial_expected` presets the EWMA threshold of adaptive families
/// (from calibration); it is ignored by fixed-threshold families.
pub fn builder_for(
    spec: &BarSpec,
    source: &str,
    pair: &str,
    initial_expected: Option<f64>,
) -> Box<dyn BarBuilder> {
    match spec {
        BarSpec::Tick { threshold } => Box::new(TickBarBuilder::new(source, pair, *threshold)),
        BarSpec::Volume { threshold } => {
            Box::new(VolumeBarBuilder::new(source, pair, *threshold))
        }
        BarSpec::Dollar { threshold } => {
            Box::new(DollarBarBuilder::new(source, pair, *threshold))
        }
        BarSpec::Time { interval_secs } => {
            Box::new(TimeBarBuilder::new(source, pair, *interval_secs))
        }
        BarSpec::Imbalance { kind, window } => {
            let mut builder = ImbalanceBarBuilder::new(source, pair, *kind, *window);
            if let Some(e0) = initial_expected {
                builder = builder.with_initial_expected(e0);
            }
            Box::new(builder)
        }
        BarSpec::Run { kind, window } => {
            let mut builder = RunBarBuilder::new(source, pair, *kind, *window);
            if let Some(e0) = initial_expected {
                builder = builder.with_initial_expected(e0);
            }
            Box::new(builder)
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    use crate::data::{Trade, TradeSide};

    /// A trade at a fixed base time + offset seconds.
    pub fn trade(ts_offset: i64, price: &str, size: &str, side: TradeSide) -> Trade {
        let base = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        Trade {
            timestamp: base + Duration::seconds(ts_offset),
            trade_id: format!("t-{ts_offset}"),
            source: "test".to_string(),
            pair: "ETH-USD".to_string(),
            price: Decimal::from_str(price).unwrap(),
            size: Decimal::from_str(size).unwrap(),
            side,
        }
    }

    pub fn buy(ts_offset: i64, price: &str, size: &str) -> Trade {
        trade(ts_offset, price, size, TradeSide::Buy)
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::trade;
    use super::*;
    use crate::data::TradeSide;

    #[test]
    fn factory_builds_every_family() {
        let specs = [
            "tick_500",
            "volume_100",
            "dollar_50000",
            "time_5m",
            "tib_10",
            "vib_10",
            "dib_10",
            "trb_10",
            "vrb_10",
            "drb_10",
        ];
        for raw in specs {
            let spec: BarSpec = raw.parse().unwrap();
            let builder = builder_for(&spec, "coinbase", "ETH-USD", None);
            assert_eq!(builder.bar_type(), raw);
        }
    }

    #[test]
    fn process_trades_collects_emissions() {
        let spec: BarSpec = "tick_2".parse().unwrap();
        let mut builder = builder_for(&spec, "test", "ETH-USD", None);
        let trades: Vec<_> = (0..5)
            .map(|i| trade(i, "100", "1", TradeSide::Buy))
            .collect();
        let bars = builder.process_trades(&trades);
        assert_eq!(bars.len(), 2);
        assert!(builder.flush().is_some());
        assert!(builder.flush().is_none());
    }
}
