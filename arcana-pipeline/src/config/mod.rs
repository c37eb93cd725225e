//! Application configuration.

mod settings;

pub use settings::{
    DaemonSettings, DatabaseSettings, IngestSettings, LogSettings, RateSettings, Settings,
    SourceSettings,
};
