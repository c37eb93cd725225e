use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::bars::Bar;
use crate::data::Trade;

/// OHLC state that only exists once the first trade has arrived.
#[derive(Debug, Clone)]
struct OhlcState {
    time_start: DateTime<Utc>,
    time_end: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
}

/// Tracks running OHLCV state while building a single bar.
///
/// Feed trades in via [`add`](Accumulator::add); when the bar is complete,
/// [`to_bar`](Accumulator::to_bar) produces the immutable [`Bar`] and
/// [`reset`](Accumulator::reset) starts the next one.
///
/// Invariant while non-empty: `low <= open, close <= high`,
/// `time_start <= time_end`, `volume > 0`.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    ohlc: Option<OhlcState>,
    volume: Decimal,
    dollar_volume: Decimal,
    vwap_numerator: Decimal,
    tick_count: i64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first trade is added.
    pub fn is_empty(&self) -> bool {
        self.tick_count == 0
    }

    pub fn tick_count(&self) -> i64 {
        self.tick_count
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn dollar_volume(&self) -> Decimal {
        self.dollar_volume
    }

    /// Timestamp of the first accumulated trade, if any.
    pub fn time_start(&self) -> Option<DateTime<Utc>> {
        self.ohlc.as_ref().map(|s| s.time_start)
    }

    /// Incorporate a trade into the running accumulation.
    pub fn add(&mut self, trade: &Trade) {
        match &mut self.ohlc {
            None => {
                self.ohlc = Some(OhlcState {
                    time_start: trade.timestamp,
                    time_end: trade.timestamp,
                    open: trade.price,
                    high: trade.price,
                    low: trade.price,
                    close: trade.price,
                });
            }
            Some(state) => {
                state.high = state.high.max(trade.price);
                state.low = state.low.min(trade.price);
                state.close = trade.price;
                state.time_end = trade.timestamp;
            }
        }

        self.volume += trade.size;
        self.dollar_volume += trade.dollar_volume();
        self.vwap_numerator += trade.price * trade.size;
        self.tick_count += 1;
    }

    /// Produce a completed bar from the accumulated state.
    ///
    /// Returns `None` when the accumulator is empty. VWAP is computed
    /// here, exactly once, as `vwap_numerator / volume`.
    pub fn to_bar(
        &self,
        bar_type: &str,
        source: &str,
        pair: &str,
        metadata: Option<serde_json::Value>,
    ) -> Option<Bar> {
        let state = self.ohlc.as_ref()?;
        let vwap = if self.volume > Decimal::ZERO {
            self.vwap_numerator / self.volume
        } else {
            state.close
        };

        Some(Bar {
            time_start: state.time_start,
            time_end: state.time_end,
            bar_type: bar_type.to_string(),
            source: source.to_string(),
            pair: pair.to_string(),
            open: state.open,
            high: state.high,
            low: state.low,
            close: state.close,
            vwap,
            volume: self.volume,
            dollar_volume: self.dollar_volume,
            tick_count: self.tick_count,
            metadata,
        })
    }

    /// Clear to empty.
    pub fn reset(&mut self) {
        *self = Accumulator::new();
    }
}
