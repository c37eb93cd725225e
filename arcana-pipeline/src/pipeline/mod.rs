//! The ingestion pipeline: backfill, daemon, and bar building.
//!
//! One ingester process is single-threaded and cooperative — fetches,
//! retries, and commits run serially, and the only concurrency is the
//! signal watcher flipping the shutdown flag that the loops observe
//! between windows and batches.

mod build;
mod calibrate;
mod ingest;
mod shutdown;

pub use build::{build_bars, TRADE_BATCH};
pub use calibrate::{
    calibrate_dollar_threshold, calibrate_initial_expected, calibrate_tick_threshold,
    calibrate_volume_threshold, dollar_threshold_from, initial_expected_from,
    round_to_two_significant, tick_threshold_from, volume_threshold_from, AdaptiveFamily,
};
pub use ingest::{format_eta, ingest_backfill, run_daemon};
pub use shutdown::ShutdownSignal;

use thiserror::Error;

use arcana_common::error::{ErrorCategory, ErrorClassification};

use crate::source::SourceError;
use crate::storage::StoreError;

/// Pipeline errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The daemon needs a backfill-established baseline to know where to
    /// resume from.
    #[error("no trades found for {pair}; run 'arcana ingest {pair} --since <date>' first")]
    NoBaseline { pair: String },

    /// An operation's data prerequisites are not met (e.g. calibration
    /// over an empty trade log).
    #[error("{0}")]
    Precondition(String),
}

impl ErrorClassification for PipelineError {
    fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Source(e) => e.category(),
            PipelineError::Store(e) => e.category(),
            PipelineError::NoBaseline { .. } => ErrorCategory::Permanent,
            PipelineError::Precondition(_) => ErrorCategory::Permanent,
        }
    }
}
