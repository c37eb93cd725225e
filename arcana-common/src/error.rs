//! Error classification for retry logic.
//!
//! Every fallible subsystem (trade source, store, pipeline) defines its own
//! `thiserror` enum and implements [`ErrorClassification`] so that callers
//! can make retry decisions without matching on concrete error types.

use std::time::Duration;

/// Classification of error types for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// May resolve on retry (network issues, timeouts, 5xx).
    Transient,
    /// Will not resolve on retry (bad input, unparseable response).
    Permanent,
    /// Rate limits and pool exhaustion; retry after a longer pause.
    ResourceExhausted,
    /// Missing or invalid configuration.
    Configuration,
    /// Bugs and unexpected state.
    Internal,
}

/// Trait for errors that can classify themselves for retry logic.
pub trait ErrorClassification {
    /// Returns the category of this error.
    fn category(&self) -> ErrorCategory;

    /// Returns true if a retry may succeed.
    fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::ResourceExhausted
        )
    }

    /// Returns true if retrying is pointless.
    fn is_permanent(&self) -> bool {
        matches!(self.category(), ErrorCategory::Permanent)
    }

    /// Suggests a delay before retrying, if applicable.
    fn suggested_retry_delay(&self) -> Option<Duration> {
        match self.category() {
            ErrorCategory::Transient => Some(Duration::from_millis(500)),
            ErrorCategory::ResourceExhausted => Some(Duration::from_secs(2)),
            _ => None,
        }
    }
}
