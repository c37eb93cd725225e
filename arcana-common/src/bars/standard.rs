//! Fixed-threshold bar builders: tick, volume, dollar, time.
//!
//! All four sample on a constant threshold of activity; they differ only
//! in which accumulated quantity triggers a new bar.

use rust_decimal::Decimal;

use crate::bars::{Accumulator, Bar, BarBuilder};
use crate::data::Trade;

/// Emit a bar every N trades.
///
/// Removes time-dependent oversampling of quiet periods — each bar holds
/// the same number of ticks regardless of wall-clock time.
pub struct TickBarBuilder {
    bar_type: String,
    source: String,
    pair: String,
    threshold: u64,
    acc: Accumulator,
}

impl TickBarBuilder {
    pub fn new(source: &str, pair: &str, threshold: u64) -> Self {
        Self {
            bar_type: format!("tick_{threshold}"),
            source: source.to_string(),
            pair: pair.to_string(),
            threshold,
            acc: Accumulator::new(),
        }
    }
}

impl BarBuilder for TickBarBuilder {
    fn bar_type(&self) -> &str {
        &self.bar_type
    }

    fn process_trade(&mut self, trade: &Trade) -> Option<Bar> {
        self.acc.add(trade);
        if self.acc.tick_count() as u64 >= self.threshold {
            let bar = self
                .acc
                .to_bar(&self.bar_type, &self.source, &self.pair, None);
            self.acc.reset();
            return bar;
        }
        None
    }

    fn flush(&mut self) -> Option<Bar> {
        let bar = self
            .acc
            .to_bar(&self.bar_type, &self.source, &self.pair, None);
        self.acc.reset();
        bar
    }
}

/// Emit a bar every V units of base-currency volume.
pub struct VolumeBarBuilder {
    bar_type: String,
    source: String,
    pair: String,
    threshold: Decimal,
    acc: Accumulator,
}

impl VolumeBarBuilder {
    pub fn new(source: &str, pair: &str, threshold: Decimal) -> Self {
        Self {
            bar_type: format!("volume_{}", threshold.normalize()),
            source: source.to_string(),
            pair: pair.to_string(),
            threshold,
            acc: Accumulator::new(),
        }
    }
}

impl BarBuilder for VolumeBarBuilder {
    fn bar_type(&self) -> &str {
        &self.bar_type
    }

    fn process_trade(&mut self, trade: &Trade) -> Option<Bar> {
        self.acc.add(trade);
        if self.acc.volume() >= self.threshold {
            let bar = self
                .acc
                .to_bar(&self.bar_type, &self.source, &self.pair, None);
            self.acc.reset();
            return bar;
        }
        None
    }

    fn flush(&mut self) -> Option<Bar> {
        let bar = self
            .acc
            .to_bar(&self.bar_type, &self.source, &self.pair, None);
        self.acc.reset();
        bar
    }
}

/// Emit a bar every D dollars of notional volume.
///
/// Normalizes for price drift over time, so the economic significance of
/// each bar stays constant.
pub struct DollarBarBuilder {
    bar_type: String,
    source: String,
    pair: String,
    threshold: Decimal,
    acc: Accumulator,
}

impl DollarBarBuilder {
    pub fn new(source: &str, pair: &str, threshold: Decimal) -> Self {
        Self {
            bar_type: format!("dollar_{}", threshold.normalize()),
            source: source.to_string(),
            pair: pair.to_string(),
            threshold,
            acc: Accumulator::new(),
        }
    }
}

impl BarBuilder for DollarBarBuilder {
    fn bar_type(&self) -> &str {
        &self.bar_type
    }

    fn process_trade(&mut self, trade: &Trade) -> Option<Bar> {
        self.acc.add(trade);
        if self.acc.dollar_volume() >= self.threshold {
            let bar = self
                .acc
                .to_bar(&self.bar_type, &self.source, &self.pair, None);
            self.acc.reset();
            return bar;
        }
        None
    }

    fn flush(&mut self) -> Option<Bar> {
        let bar = self
            .acc
            .to_bar(&self.bar_type, &self.source, &self.pair, None);
        self.acc.reset();
        bar
    }
}

/// Emit a bar at fixed clock intervals.
///
/// Buckets are anchored at the Unix epoch: a 5m bar covers :00–:05,
/// :05–:10, and so on. A trade landing in a new bucket emits the previous
/// bucket first and then opens the new one — the triggering trade belongs
/// to the *new* bar. Empty clock intervals produce no bars.
pub struct TimeBarBuilder {
    bar_type: String,
    source: String,
    pair: String,
    interval_secs: i64,
    current_bucket: Option<i64>,
    acc: Accumulator,
}

impl TimeBarBuilder {
    pub fn new(source: &str, pair: &str, interval_secs: i64) -> Self {
        Self {
            bar_type: format!("time_{}", crate::bars::spec::format_interval(interval_secs)),
            source: source.to_string(),
            pair: pair.to_string(),
            interval_secs,
            current_bucket: None,
            acc: Accumulator::new(),
        }
    }

    /// Epoch-anchored bucket index containing `ts`.
    fn bucket_of(&self, ts: chrono::DateTime<chrono::Utc>) -> i64 {
        ts.timestamp().div_euclid(self.interval_secs)
    }
}

impl BarBuilder for TimeBarBuilder {
    fn bar_type(&self) -> &str {
        &self.bar_type
    }

    fn process_trade(&mut self, trade: &Trade) -> Option<Bar> {
        let bucket = self.bucket_of(trade.timestamp);
        let mut emitted = None;

        if let Some(current) = self.current_bucket {
            if bucket != current && !self.acc.is_empty() {
                emitted = self
                    .acc
                    .to_bar(&self.bar_type, &self.source, &self.pair, None);
                self.acc.reset();
            }
        }

        self.current_bucket = Some(bucket);
        self.acc.add(trade);
        emitted
    }

    fn flush(&mut self) -> Option<Bar> {
        let bar = self
            .acc
            .to_bar(&self.bar_type, &self.source, &self.pair, None);
        self.acc.reset();
        self.current_bucket = None;
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::testutil::{buy, trade};
    use crate::data::TradeSide;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn tick_bars_emit_every_n_trades() {
        // Seven trades, threshold 3: two full bars, the seventh trade
        // stays in the accumulator until flush.
        let mut builder = TickBarBuilder::new("test", "ETH-USD", 3);
        let mut bars = Vec::new();
        for (i, price) in ["10", "11", "12", "13", "14", "15", "16"].iter().enumerate() {
            if let Some(bar) = builder.process_trade(&buy(i as i64, price, "1")) {
                bars.push(bar);
            }
        }

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, dec!(10));
        assert_eq!(bars[0].close, dec!(12));
        assert_eq!(bars[1].open, dec!(13));
        assert_eq!(bars[1].close, dec!(15));

        let tail = builder.flush().unwrap();
        assert_eq!(tail.tick_count, 1);
        assert_eq!(tail.open, dec!(16));
    }

    #[test]
    fn volume_bar_vwap() {
        // (10,2), (11,2), (12,2) with V=5 emits at the third trade:
        // volume 6, vwap (20+22+24)/6 = 11.
        let mut builder = VolumeBarBuilder::new("test", "ETH-USD", dec!(5));
        assert!(builder.process_trade(&buy(0, "10", "2")).is_none());
        assert!(builder.process_trade(&buy(1, "11", "2")).is_none());
        let bar = builder.process_trade(&buy(2, "12", "2")).unwrap();
        assert_eq!(bar.volume, dec!(6));
        assert_eq!(bar.vwap, dec!(11));
        assert_eq!(bar.tick_count, 3);
    }

    #[test]
    fn dollar_bar_emits_on_crossing_trade() {
        // Cumulative dollars 50, 110: the second trade crosses D=100 and
        // closes the bar; the third opens the next one.
        let mut builder = DollarBarBuilder::new("test", "ETH-USD", dec!(100));
        assert!(builder.process_trade(&buy(0, "10", "5")).is_none());
        let bar = builder.process_trade(&buy(1, "20", "3")).unwrap();
        assert_eq!(bar.dollar_volume, dec!(110));
        assert_eq!(bar.tick_count, 2);

        assert!(builder.process_trade(&buy(2, "50", "2")).is_none());
        let tail = builder.flush().unwrap();
        assert_eq!(tail.tick_count, 1);
        assert_eq!(tail.dollar_volume, dec!(100));
    }

    #[test]
    fn time_bars_emit_on_bucket_change() {
        // 60s buckets, trades at t=0,30,90,120 (testutil base is 12:00:00,
        // which is bucket-aligned). The t=90 trade emits [0,60) with two
        // trades; the t=120 trade emits [60,120) with one; flush emits the
        // final partial.
        let mut builder = TimeBarBuilder::new("test", "ETH-USD", 60);
        assert!(builder.process_trade(&buy(0, "100", "1")).is_none());
        assert!(builder.process_trade(&buy(30, "101", "1")).is_none());

        let first = builder.process_trade(&buy(90, "102", "1")).unwrap();
        assert_eq!(first.tick_count, 2);
        assert_eq!(first.open, dec!(100));
        assert_eq!(first.close, dec!(101));

        let second = builder.process_trade(&buy(120, "103", "1")).unwrap();
        assert_eq!(second.tick_count, 1);
        assert_eq!(second.open, dec!(102));

        let tail = builder.flush().unwrap();
        assert_eq!(tail.tick_count, 1);
        assert_eq!(tail.close, dec!(103));
    }

    #[test]
    fn time_bar_first_trade_anchors_its_bucket() {
        let mut builder = TimeBarBuilder::new("test", "ETH-USD", 300);
        // First trade never emits, even when it lands mid-bucket.
        assert!(builder
            .process_trade(&trade(42, "100", "1", TradeSide::Sell))
            .is_none());
        // Next trade in the same bucket: still nothing.
        assert!(builder
            .process_trade(&trade(200, "101", "1", TradeSide::Sell))
            .is_none());
    }

    #[test]
    fn time_bars_are_epoch_aligned() {
        let mut builder = TimeBarBuilder::new("test", "ETH-USD", 300);
        builder.process_trade(&buy(0, "100", "1"));
        let bar = builder.process_trade(&buy(600, "101", "1")).unwrap();
        // Emitted time_start falls on a multiple of the interval.
        assert_eq!(bar.time_start.timestamp() % 300, 0);
        assert_eq!(
            bar.time_start,
            Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn empty_intervals_produce_no_bars() {
        let mut builder = TimeBarBuilder::new("test", "ETH-USD", 60);
        builder.process_trade(&buy(0, "100", "1"));
        // Jump four buckets ahead: exactly one bar comes out, not four.
        let bar = builder.process_trade(&buy(250, "101", "1"));
        assert!(bar.is_some());
        assert!(builder.process_trade(&buy(260, "102", "1")).is_none());
    }

    #[test]
    fn label_formatting() {
        assert_eq!(TimeBarBuilder::new("t", "E-U", 30).bar_type(), "time_30s");
        assert_eq!(TimeBarBuilder::new("t", "E-U", 300).bar_type(), "time_5m");
        assert_eq!(TimeBarBuilder::new("t", "E-U", 3600).bar_type(), "time_1h");
        assert_eq!(TimeBarBuilder::new("t", "E-U", 86400).bar_type(), "time_1d");
    }
}
