use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Taker side of a trade.
///
/// `Unknown` signals that the exchange did not report an aggressor side;
/// downstream consumers (the imbalance and run bar builders) fall back to
/// the tick rule to infer direction from price movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
    Unknown,
}

impl TradeSide {
    /// Database string representation (`buy`, `sell`, `unknown`).
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
            TradeSide::Unknown => "unknown",
        }
    }

    /// Parse from a database or API string. Unrecognized values map to
    /// `Unknown` — exchange data is trusted as-is, not rejected.
    pub fn from_db_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "buy" => TradeSide::Buy,
            "sell" => TradeSide::Sell,
            _ => TradeSide::Unknown,
        }
    }
}

/// A single executed trade from an exchange.
///
/// Prices and sizes are exact decimals end to end — the trade→bar path
/// never touches floating point.
///
/// `(source, trade_id)` is globally unique and is the dedup key for the
/// append-only trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Execution time in UTC, sub-second precision.
    pub timestamp: DateTime<Utc>,
    /// Exchange-specific trade identifier, unique per source.
    pub trade_id: String,
    /// Data source tag, e.g. `"coinbase"`.
    pub source: String,
    /// Trading pair, e.g. `"ETH-USD"`.
    pub pair: String,
    /// Execution price in quote currency. Strictly positive.
    pub price: Decimal,
    /// Execution size in base currency. Strictly positive.
    pub size: Decimal,
    /// Taker side.
    pub side: TradeSide,
}

impl Trade {
    /// `price * size` — the quote-currency value of this trade.
    pub fn dollar_volume(&self) -> Decimal {
        self.price * self.size
    }

    /// Trade sign: `+1` for buy, `-1` for sell, `0` for unknown.
    ///
    /// A zero tells the caller to apply the tick rule.
    pub fn sign(&self) -> i8 {
        match self.side {
            TradeSide::Buy => 1,
            TradeSide::Sell => -1,
            TradeSide::Unknown => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn trade(side: TradeSide) -> Trade {
        Trade {
            timestamp: Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap(),
            trade_id: "t-1".to_string(),
            source: "coinbase".to_string(),
            pair: "ETH-USD".to_string(),
            price: dec!(2845.50),
            size: dec!(0.25),
            side,
        }
    }

    #[test]
    fn dollar_volume_is_price_times_size() {
        assert_eq!(trade(TradeSide::Buy).dollar_volume(), dec!(711.375));
    }

    #[test]
    fn sign_maps_sides() {
        assert_eq!(trade(TradeSide::Buy).sign(), 1);
        assert_eq!(trade(TradeSide::Sell).sign(), -1);
        assert_eq!(trade(TradeSide::Unknown).sign(), 0);
    }

    #[test]
    fn side_db_round_trip() {
        assert_eq!(TradeSide::from_db_str("buy"), TradeSide::Buy);
        assert_eq!(TradeSide::from_db_str("SELL"), TradeSide::Sell);
        assert_eq!(TradeSide::from_db_str("???"), TradeSide::Unknown);
        assert_eq!(TradeSide::Sell.as_db_str(), "sell");
    }
}
