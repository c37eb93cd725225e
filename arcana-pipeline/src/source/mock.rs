//! Mock trade source for tests and development.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use arcana_common::data::{Trade, TradeSide};

use crate::source::{SourceResult, TradeSource};

/// A deterministic in-memory trade source.
///
/// Holds a preloaded trade list and serves `[start, end)` slices of it,
/// which is exactly the contract the ingester depends on.
pub struct MockSource {
    trades: Vec<Trade>,
    pairs: Vec<String>,
}

impl MockSource {
    pub fn new(trades: Vec<Trade>) -> Self {
        let mut pairs: Vec<String> = trades.iter().map(|t| t.pair.clone()).collect();
        pairs.sort();
        pairs.dedup();
        Self { trades, pairs }
    }

    /// Generate `count` trades one second apart with a simple alternating
    /// price walk, starting at `start`.
    pub fn generate(pair: &str, start: DateTime<Utc>, count: usize) -> Self {
        let base_price = Decimal::from(100);
        let trades = (0..count)
            .map(|i| {
                let delta = Decimal::from((i % 5) as i64);
                Trade {
                    timestamp: start + Duration::seconds(i as i64),
                    trade_id: format!("mock-{i:06}"),
                    source: "mock".to_string(),
                    pair: pair.to_string(),
                    price: base_price + delta,
                    size: Decimal::ONE,
                    side: if i % 2 == 0 {
                        TradeSide::Buy
                    } else {
                        TradeSide::Sell
                    },
                }
            })
            .collect();
        Self::new(trades)
    }
}

#[async_trait]
impl TradeSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_window(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<Trade>> {
        Ok(self
            .trades
            .iter()
            .filter(|t| t.pair == pair && t.timestamp >= start && t.timestamp < end)
            .cloned()
            .collect())
    }

    async fn supported_pairs(&self) -> SourceResult<Vec<String>> {
        Ok(self.pairs.clone())
    }
}
