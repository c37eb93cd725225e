//! Wire types for the Coinbase Advanced Trade market endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use arcana_common::data::{Trade, TradeSide};

use crate::source::SourceError;

/// Response of `GET /products/{product_id}/ticker`.
#[derive(Debug, Deserialize)]
pub struct TickerResponse {
    #[serde(default)]
    pub trades: Vec<RawTrade>,
}

/// One trade as reported by the API. All numeric fields arrive as
/// strings and are parsed into exact decimals — never through floats.
#[derive(Debug, Deserialize)]
pub struct RawTrade {
    pub trade_id: String,
    pub price: String,
    pub size: String,
    pub time: String,
    #[serde(default)]
    pub side: String,
}

impl RawTrade {
    /// Convert into the domain [`Trade`] model.
    pub fn into_trade(self, source: &str, pair: &str) -> Result<Trade, SourceError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.time)
            .map_err(|e| SourceError::Parse(format!("bad trade time '{}': {e}", self.time)))?
            .with_timezone(&Utc);
        let price = Decimal::from_str(&self.price)
            .map_err(|e| SourceError::Parse(format!("bad trade price '{}': {e}", self.price)))?;
        let size = Decimal::from_str(&self.size)
            .map_err(|e| SourceError::Parse(format!("bad trade size '{}': {e}", self.size)))?;

        Ok(Trade {
            timestamp,
            trade_id: self.trade_id,
            source: source.to_string(),
            pair: pair.to_string(),
            price,
            size,
            // API reports "BUY"/"SELL"; anything else is unknown.
            side: TradeSide::from_db_str(&self.side),
        })
    }
}

/// Response of `GET /products`.
#[derive(Debug, Deserialize)]
pub struct ProductsResponse {
    #[serde(default)]
    pub products: Vec<RawProduct>,
}

#[derive(Debug, Deserialize)]
pub struct RawProduct {
    pub product_id: String,
    #[serde(default)]
    pub is_disabled: bool,
}
