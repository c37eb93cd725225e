//! Coinbase Advanced Trade API source.
//!
//! Uses the public `/api/v3/brokerage/market/` endpoints — no API key
//! required. Trades are queried by UNIX-second time windows, which makes
//! both backfill and incremental ingestion straightforward, and the
//! reported `side` is the taker side, the convention the tick rule needs.

mod client;
mod types;

pub use client::{CoinbaseSettings, CoinbaseSource};
