//! Adaptive imbalance bar builders: tib, vib, dib.
//!
//! An imbalance bar samples when the cumulative signed order flow within
//! the candidate bar exceeds an EWMA-estimated expectation. Bars "speed
//! up" during directional flow and stretch out in balanced markets.
//!
//! The three variants weight each trade differently — by count (tib), by
//! size (vib), or by quote value (dib) — selected via [`FlowKind`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::bars::{Accumulator, Bar, BarBuilder, EwmaEstimator, FlowKind, SignTracker};
use crate::data::Trade;

/// Imbalance bar builder over any [`FlowKind`] weighting.
///
/// Maintains the running signed imbalance `theta` in exact decimal; only
/// the threshold comparison and the EWMA feedback convert to float.
pub struct ImbalanceBarBuilder {
    bar_type: String,
    source: String,
    pair: String,
    kind: FlowKind,
    acc: Accumulator,
    ewma: EwmaEstimator,
    signs: SignTracker,
    theta: Decimal,
}

impl ImbalanceBarBuilder {
    pub fn new(source: &str, pair: &str, kind: FlowKind, window: u32) -> Self {
        Self {
            bar_type: format!("{}_{window}", kind.imbalance_code()),
            source: source.to_string(),
            pair: pair.to_string(),
            kind,
            acc: Accumulator::new(),
            ewma: EwmaEstimator::new(window),
            signs: SignTracker::new(),
            theta: Decimal::ZERO,
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
        self.theta = Decimal::ZERO;
        bar
    }
}

impl BarBuilder for ImbalanceBarBuilder {
    fn bar_type(&self) -> &str {
        &self.bar_type
    }

    fn process_trade(&mut self, trade: &Trade) -> Option<Bar> {
        let sign = self.signs.resolve(trade);
        self.acc.add(trade);

        let unit = self.kind.unit(trade);
        self.theta += if sign >= 0 { unit } else { -unit };

        let magnitude = self.theta.abs();
        let fires = if self.ewma.is_bootstrapping() {
            // Cold start: emit on any nonzero flow so the seed forms.
            magnitude > Decimal::ZERO
        } else {
            magnitude.to_f64().unwrap_or(f64::MAX) >= self.ewma.expected()
        };

        if fires {
            self.ewma.update(magnitude.to_f64().unwrap_or(0.0));
            return self.emit();
        }
        None
    }

    fn flush(&mut self) -> Option<Bar> {
        // The partial bar did not cross the threshold, so the estimator
        // is not updated; its current state is still persisted.
        self.emit()
    }

    fn restore_state(&mut self, metadata: &serde_json::Value) {
        if let Some((ewma, last_sign)) = EwmaEstimator::from_metadata(metadata) {
            self.ewma = ewma;
            self.signs.set_last_sign(last_sign);
        }
    }
}
