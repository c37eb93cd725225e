//! Shared domain library for the Arcana data pipeline.
//!
//! This crate holds everything that is independent of any particular
//! exchange or storage backend:
//!
//! - The [`data::Trade`] model with exact-decimal arithmetic
//! - The bar construction layer ([`bars`]): accumulator, the ten bar
//!   builder families, the EWMA threshold estimator and the bar-spec
//!   grammar
//! - Error classification traits used for retry decisions ([`error`])
//! - Logging bootstrap shared by all binaries ([`logging`])

pub mod bars;
pub mod data;
pub mod error;
pub mod logging;
