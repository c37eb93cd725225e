//! Standardized logging configuration.
//!
//! All Arcana binaries initialize `tracing` through here so log output is
//! consistent across the ingester, the daemon, and swarm workers.
//!
//! # Environment variables
//!
//! - `RUST_LOG`: standard tracing filter (e.g. `arcana=debug,sqlx=warn`)
//! - `LOG_LEVEL`: default level when `RUST_LOG` is unset
//! - `LOG_FORMAT`: `pretty` (default), `compact`, or `json`
//! - `LOG_TIMESTAMPS`: `utc` (default), `local`, or `none`

use std::env;

use tracing_subscriber::fmt::time::{ChronoLocal, ChronoUtc, FormatTime};
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output with colors.
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON for machine parsing and log aggregation.
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Timestamp format for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// UTC, RFC 3339. The pipeline is UTC-native, so this is the default.
    #[default]
    Utc,
    /// Local time with offset.
    Local,
    /// No timestamps.
    None,
}

impl TimestampFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "local" => TimestampFormat::Local,
            "none" | "off" => TimestampFormat::None,
            _ => TimestampFormat::Utc,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub timestamps: TimestampFormat,
    /// Filter used when `RUST_LOG` is not set.
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            timestamps: TimestampFormat::Utc,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Build a config from `LOG_FORMAT` / `LOG_TIMESTAMPS` / `LOG_LEVEL`.
    pub fn from_env() -> Self {
        Self {
            format: env::var("LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
            timestamps: env::var("LOG_TIMESTAMPS")
                .map(|s| TimestampFormat::parse(&s))
                .unwrap_or_default(),
            default_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Override the default filter (used when `RUST_LOG` is unset).
    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }
}

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

/// Initialize the global tracing subscriber.
///
/// Returns an error if a subscriber is already installed.
pub fn init_logging(config: LogConfig) -> InitResult {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    match config.timestamps {
        TimestampFormat::Utc => init_with_timer(config.format, filter, ChronoUtc::rfc_3339()),
        TimestampFormat::Local => {
            init_with_timer(config.format, filter, ChronoLocal::rfc_3339())
        }
        TimestampFormat::None => {
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .without_time();
            match config.format {
                LogFormat::Pretty => builder.try_init(),
                LogFormat::Compact => builder.compact().try_init(),
                LogFormat::Json => builder.json().try_init(),
            }
        }
    }
}

fn init_with_timer<T>(format: LogFormat, filter: EnvFilter, timer: T) -> InitResult
where
    T: FormatTime + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer);
    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }

    #[test]
    fn timestamp_parsing() {
        assert_eq!(TimestampFormat::parse("local"), TimestampFormat::Local);
        assert_eq!(TimestampFormat::parse("off"), TimestampFormat::None);
        assert_eq!(TimestampFormat::parse("utc"), TimestampFormat::Utc);
    }
}
