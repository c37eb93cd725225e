//! Adaptive run bar builders: trb, vrb, drb.
//!
//! A run bar samples when the largest same-direction run seen within the
//! candidate bar exceeds an EWMA-estimated expectation — sustained
//! one-sided pressure closes the bar. Variants weight the run by trade
//! count, size, or quote value via [`FlowKind`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::bars::{Accumulator, Bar, BarBuilder, EwmaEstimator, FlowKind, SignTracker};
use crate::data::Trade;

/// Run bar builder over any [`FlowKind`] weighting.
pub struct RunBarBuilder {
    bar_type: String,
    source: String,
    pair: String,
    kind: FlowKind,
    acc: Accumulator,
    ewma: EwmaEstimator,
    signs: SignTracker,
    /// Sign of the current run; 0 before the first trade of a bar.
    run_sign: i8,
    /// Magnitude of the current run.
    run_magnitude: Decimal,
    /// Largest run magnitude seen in this bar.
    max_run: Decimal,
}

impl RunBarBuilder {
    pub fn new(source: &str, pair: &str, kind: FlowKind, window: u32) -> Self {
        Self {
            bar_type: format!("{}_{window}", kind.run_code()),
            source: source.to_string(),
            pair: pair.to_string(),
            kind,
            acc: Accumulator::new(),
            ewma: EwmaEstimator::new(window),
            signs: SignTracker::new(),
            run_sign: 0,
            run_magnitude: Decimal::ZERO,
            max_run: Decimal::ZERO,
        }
    }

    /// Preset the EWMA threshold from calibration.
    pub fn with_initial_expected(mut self, initial: f64) -> Self {
        self.ewma = EwmaEstimator::with_initial(self.ewma.window(), initial);
        self
    }

    fn emit(&mut self) -> Option<Bar> {
        let metadata = self.ewma.to_metadata(self.signs.last_sign());
        let bar = self
            .acc
            .to_bar(&self.bar_type, &self.source, &self.pair, Some(metadata));
        self.acc.reset();
        self.run_sign = 0;
        self.run_magnitude = Decimal::ZERO;
        self.max_run = Decimal::ZERO;
        bar
    }
}

impl BarBuilder for RunBarBuilder {
    fn bar_type(&self) -> &str {
        &self.bar_type
    }

    fn process_trade(&mut self, trade: &Trade) -> Option<Bar> {
        let sign = self.signs.resolve(trade);
        self.acc.add(trade);

        let unit = self.kind.unit(trade);
        if sign == self.run_sign {
            self.run_magnitude += unit;
        } else {
            self.run_sign = sign;
            self.run_magnitude = unit;
        }
        self.max_run = self.max_run.max(self.run_magnitude);

        let fires = if self.ewma.is_bootstrapping() {
            self.max_run > Decimal::ZERO
        } else {
            self.max_run.to_f64().unwrap_or(f64::MAX) >= self.ewma.expected()
        };

        if fires {
            self.ewma
                .update(self.max_run.to_f64().unwrap_or(0.0));
            return self.emit();
        }
        None
    }

    fn flush(&mut self) -> Option<Bar> {
        // Below-threshold partial: persist state without updating it.
        self.emit()
    }

    fn restore_state(&mut self, metadata: &serde_json::Value) {
        if let Some((ewma, last_sign)) = EwmaEstimator::from_metadata(metadata) {
            self.ewma = ewma;
            self.signs.set_last_sign(last_sign);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::testutil::{buy, trade};
    use crate::data::TradeSide;
    use rust_decimal_macros::dec;

    fn sell(ts: i64, price: &str, size: &str) -> Trade {
        trade(ts, price, size, TradeSide::Sell)
    }

    #[test]
    fn bootstrap_emits_on_first_trade() {
        let mut builder = RunBarBuilder::new("test", "ETH-USD", FlowKind::Tick, 3);
        let bar = builder.process_trade(&buy(0, "100", "1")).unwrap();
        assert_eq!(bar.tick_count, 1);
        let meta = bar.metadata.unwrap();
        assert_eq!(meta["ewma_expected"], 1.0);
    }

    #[test]
    fn run_resets_on_sign_change() {
        let mut builder =
            RunBarBuilder::new("test", "ETH-USD", FlowKind::Tick, 5).with_initial_expected(3.0);

        // buy, sell, buy, sell: the run never exceeds 1.
        assert!(builder.process_trade(&buy(0, "100", "1")).is_none());
        assert!(builder.process_trade(&sell(1, "100", "1")).is_none());
        assert!(builder.process_trade(&buy(2, "100", "1")).is_none());
        assert!(builder.process_trade(&sell(3, "100", "1")).is_none());

        // Three sells in a row: run reaches 3 on the second extra sell
        // (the sell at t=3 already started the run).
        assert!(builder.process_trade(&sell(4, "100", "1")).is_none());
        let bar = builder.process_trade(&sell(5, "100", "1")).unwrap();
        assert_eq!(bar.tick_count, 6);
    }

    #[test]
    fn max_run_is_sticky_within_bar() {
        let mut builder =
            RunBarBuilder::new("test", "ETH-USD", FlowKind::Volume, 5).with_initial_expected(10.0);

        // A 6-unit buy run, then a sign flip: max stays 6.
        assert!(builder.process_trade(&buy(0, "100", "6")).is_none());
        assert!(builder.process_trade(&sell(1, "100", "1")).is_none());
        // A 4-unit buy starts a fresh run; 6 + 4 is NOT a run of 10,
        // so no emission...
        assert!(builder.process_trade(&buy(2, "100", "4")).is_none());
        // ...but extending it to 10 within one run fires.
        let bar = builder.process_trade(&buy(3, "100", "6")).unwrap();
        assert_eq!(bar.volume, dec!(17));
    }

    #[test]
    fn dollar_kind_weights_by_notional() {
        let mut builder =
            RunBarBuilder::new("test", "ETH-USD", FlowKind::Dollar, 5).with_initial_expected(1000.0);
        assert!(builder.process_trade(&buy(0, "100", "4")).is_none());
        let bar = builder.process_trade(&buy(1, "100", "6")).unwrap();
        assert_eq!(bar.dollar_volume, dec!(1000));
    }

    #[test]
    fn ewma_adapts_after_each_emission() {
        let mut builder = RunBarBuilder::new("test", "ETH-USD", FlowKind::Tick, 1);
        // window 1 -> alpha 1: expected tracks the last realized run.
        builder.process_trade(&buy(0, "100", "1")); // seeds E=1
        builder.process_trade(&buy(1, "100", "1")); // run 1 >= 1, E stays 1
        let bar = builder.process_trade(&buy(2, "100", "1")).unwrap();
        assert_eq!(bar.metadata.unwrap()["ewma_expected"], 1.0);
    }

    #[test]
    fn restore_state_applies_persisted_threshold() {
        let meta = serde_json::json!({
            "ewma_expected": 2.0,
            "ewma_window": 5,
            "ewma_bar_count": 3,
            "last_trade_sign": 1,
        });
        let mut builder = RunBarBuilder::new("test", "ETH-USD", FlowKind::Tick, 5);
        builder.restore_state(&meta);

        assert!(builder.process_trade(&buy(0, "100", "1")).is_none());
        let bar = builder.process_trade(&buy(1, "100", "1")).unwrap();
        assert_eq!(bar.tick_count, 2);
    }
}
