//! Trade source abstraction.
//!
//! A [`TradeSource`] produces complete, deduplicated, ascending trade
//! lists for `[start, end)` windows. The ingester is parameterized on the
//! trait, so exchanges can be added without touching the pipeline.

pub mod coinbase;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use arcana_common::data::Trade;
use arcana_common::error::{ErrorCategory, ErrorClassification};

/// Trade source error types.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SourceError {
    /// Connection-level failure (DNS, reset, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response did not match the expected shape.
    #[error("unparseable response: {0}")]
    Parse(String),

    /// A single instant holds at least a full page of trades, so the
    /// backward page cursor cannot advance. Not retryable.
    #[error("window ending {end} for {pair} holds >= {limit} trades at one instant")]
    WindowTooBusy {
        pair: String,
        end: DateTime<Utc>,
        limit: usize,
    },

    /// Cooperative cancellation observed mid-fetch.
    #[error("fetch cancelled")]
    Cancelled,
}

impl ErrorClassification for SourceError {
    fn category(&self) -> ErrorCategory {
        match self {
            SourceError::Request(_) => ErrorCategory::Transient,
            SourceError::Status { status, .. } => match status {
                429 => ErrorCategory::ResourceExhausted,
                500..=599 => ErrorCategory::Transient,
                _ => ErrorCategory::Permanent,
            },
            SourceError::Parse(_) => ErrorCategory::Permanent,
            SourceError::WindowTooBusy { .. } => ErrorCategory::Permanent,
            SourceError::Cancelled => ErrorCategory::Permanent,
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// A provider of historical trade data for one exchange.
#[async_trait]
pub trait TradeSource: Send + Sync {
    /// Short identifier for this source, e.g. `"coinbase"`. Written into
    /// every trade row and used as half of the dedup key.
    fn name(&self) -> &str;

    /// Fetch every trade with `start <= timestamp < end`, deduplicated by
    /// trade id and sorted ascending. Implementations page internally and
    /// retry transient failures before surfacing an error.
    async fn fetch_window(
        &self,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SourceResult<Vec<Trade>>;

    /// Trading pairs available from this source.
    async fn supported_pairs(&self) -> SourceResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses_are_retryable() {
        let err = SourceError::Status {
            status: 503,
            body: "unavailable".into(),
        };
        assert!(err.is_transient());

        let err = SourceError::Status {
            status: 429,
            body: "slow down".into(),
        };
        assert!(err.is_transient());

        let err = SourceError::Status {
            status: 404,
            body: "no such product".into(),
        };
        assert!(err.is_permanent());
    }

    #[test]
    fn window_too_busy_is_fatal() {
        let err = SourceError::WindowTooBusy {
            pair: "ETH-USD".into(),
            end: Utc::now(),
            limit: 1000,
        };
        assert!(err.is_permanent());
    }
}
