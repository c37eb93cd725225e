//! Adaptive-threshold building blocks for information-driven bars:
//! the EWMA estimator, the tick rule, and trade-sign tracking.

use rust_decimal::Decimal;
use serde_json::json;

/// Exponentially weighted moving average of realized bar statistics.
///
/// Imbalance and run builders use the estimate as their emission
/// threshold: a bar is emitted when the accumulated imbalance (or max
/// run) reaches the expected value, and the realized magnitude is then
/// folded back in with decay `alpha = 2 / (window + 1)`.
///
/// The estimate is a float — it is a statistical quantity, not part of
/// the exact trade→bar accumulation path.
#[derive(Debug, Clone)]
pub struct EwmaEstimator {
    window: u32,
    alpha: f64,
    expected: f64,
    bar_count: u64,
}

impl EwmaEstimator {
    pub fn new(window: u32) -> Self {
        Self::with_initial(window, 0.0)
    }

    /// Start from a calibrated initial estimate instead of the bootstrap.
    pub fn with_initial(window: u32, initial: f64) -> Self {
        debug_assert!(window >= 1, "EWMA window must be >= 1");
        Self {
            window,
            alpha: 2.0 / (window as f64 + 1.0),
            expected: initial,
            bar_count: 0,
        }
    }

    /// Current threshold estimate.
    pub fn expected(&self) -> f64 {
        self.expected
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Number of observations folded in so far.
    pub fn bar_count(&self) -> u64 {
        self.bar_count
    }

    /// True while no usable estimate exists yet. In this state the
    /// builders emit on any nonzero flow so a seed observation forms.
    pub fn is_bootstrapping(&self) -> bool {
        self.expected == 0.0
    }

    /// Incorporate a realized observation and return the new estimate.
    ///
    /// The first observation seeds the estimate outright; with a
    /// calibrated initial value present it is blended instead.
    pub fn update(&mut self, value: f64) -> f64 {
        if self.bar_count == 0 && self.expected == 0.0 {
            self.expected = value;
        } else {
            self.expected = self.alpha * value + (1.0 - self.alpha) * self.expected;
        }
        self.bar_count += 1;
        self.expected
    }

    /// Serialize for storage in the emitted bar's metadata.
    ///
    /// `last_trade_sign` is the tick-rule carry at emission time; storing
    /// it alongside the estimator makes warm resume exact.
    pub fn to_metadata(&self, last_trade_sign: i8) -> serde_json::Value {
        json!({
            "ewma_expected": self.expected,
            "ewma_window": self.window,
            "ewma_bar_count": self.bar_count,
            "last_trade_sign": last_trade_sign,
        })
    }

    /// Restore from bar metadata. Returns the estimator and the persisted
    /// tick-rule carry, or `None` when the metadata is not EWMA state.
    pub fn from_metadata(metadata: &serde_json::Value) -> Option<(Self, i8)> {
        let window = metadata.get("ewma_window")?.as_u64()? as u32;
        if window == 0 {
            return None;
        }
        let expected = metadata.get("ewma_expected")?.as_f64()?;
        let bar_count = metadata
            .get("ewma_bar_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let last_sign = metadata
            .get("last_trade_sign")
            .and_then(|v| v.as_i64())
            .unwrap_or(1);
        let mut estimator = Self::with_initial(window, expected);
        estimator.bar_count = bar_count;
        Some((estimator, if last_sign < 0 { -1 } else { 1 }))
    }
}

/// Infer trade direction from price movement.
///
/// `+1` on an uptick, `-1` on a downtick, the previous sign when the
/// price is unchanged.
pub fn tick_rule(price: Decimal, prev_price: Decimal, prev_sign: i8) -> i8 {
    if price > prev_price {
        1
    } else if price < prev_price {
        -1
    } else {
        prev_sign
    }
}

/// Resolves a trade sign for every trade, falling back to the tick rule
/// when the exchange did not report a side. Initial carry is `+1`.
#[derive(Debug, Clone)]
pub struct SignTracker {
    prev_price: Option<Decimal>,
    prev_sign: i8,
}

impl Default for SignTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SignTracker {
    pub fn new() -> Self {
        Self {
            prev_price: None,
            prev_sign: 1,
        }
    }

    /// Resolve the sign of a trade. Never returns zero.
    pub fn resolve(&mut self, trade: &crate::data::Trade) -> i8 {
        let mut sign = trade.sign();
        if sign == 0 {
            sign = match self.prev_price {
                Some(prev) => tick_rule(trade.price, prev, self.prev_sign),
                None => self.prev_sign,
            };
        }
        self.prev_price = Some(trade.price);
        self.prev_sign = sign;
        sign
    }

    /// The most recently resolved sign.
    pub fn last_sign(&self) -> i8 {
        self.prev_sign
    }

    /// Restore the carry from persisted state.
    pub fn set_last_sign(&mut self, sign: i8) {
        self.prev_sign = if sign < 0 { -1 } else { 1 };
    }
}
