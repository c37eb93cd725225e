//! TimescaleDB-backed trade and bar storage.

mod repository;
mod timescale;

pub use repository::{
    bar_table_name, DayCount, ImbalanceStats, LastBar, MonthStat, StoreError, StoreResult,
    TradeCursor, TradeStore, TradeVolumeStats,
};
pub use timescale::TimescaleOperations;
