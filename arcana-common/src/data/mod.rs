//! Core market data types.

mod types;

pub use types::{Trade, TradeSide};
