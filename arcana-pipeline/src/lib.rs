//! Arcana pipeline service crate.
//!
//! Wires the domain library (`arcana-common`) to the outside world:
//! the Coinbase trade source, the TimescaleDB store, the ingestion
//! pipeline (backfill, daemon, bar building), the swarm planner, and
//! the command-line surface.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod swarm;
