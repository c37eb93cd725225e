//! Application settings.
//!
//! Layered the same way across every Arcana binary:
//! `config/default.toml` → `config/{RUN_MODE}.toml` → `config/local.toml`
//! → environment variables with the `ARCANA` prefix and `__` separator
//! (e.g. `ARCANA__DATABASE__HOST`). Every field has a default, so the
//! pipeline runs with no config file at all.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// TimescaleDB connection.
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Trade source tuning.
    #[serde(default)]
    pub source: SourceSettings,
    /// HTTP rate limiting.
    #[serde(default)]
    pub rate: RateSettings,
    /// Backfill loop tuning.
    #[serde(default)]
    pub ingest: IngestSettings,
    /// Daemon loop tuning.
    #[serde(default)]
    pub daemon: DaemonSettings,
    /// Logging defaults.
    #[serde(default)]
    pub log: LogSettings,
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "arcana".to_string()
}

fn default_db_user() -> String {
    "arcana".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl DatabaseSettings {
    /// PostgreSQL connection URL assembled from the parts, so each piece
    /// stays individually overridable through the environment.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!(
                "postgresql://{}@{}:{}/{}",
                self.user, self.host, self.port, self.name
            )
        } else {
            format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.name
            )
        }
    }
}

/// Trade source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Base URL of the Coinbase Advanced Trade API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Trades per page. The upstream cap is undocumented; 1000 works,
    /// 2500+ returns server errors.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

fn default_base_url() -> String {
    "https://api.coinbase.com".to_string()
}

fn default_page_limit() -> usize {
    1000
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_limit: default_page_limit(),
        }
    }
}

/// HTTP rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSettings {
    /// Minimum delay between requests in seconds. 0.12 keeps us at
    /// ~8 req/s against the public 10 req/s limit.
    #[serde(default = "default_min_delay")]
    pub min_delay_seconds: f64,
}

fn default_min_delay() -> f64 {
    0.12
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            min_delay_seconds: default_min_delay(),
        }
    }
}

/// Backfill loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Fetch window size in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Trades per database commit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_window_seconds() -> u64 {
    900
}

fn default_batch_size() -> usize {
    1000
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            batch_size: default_batch_size(),
        }
    }
}

/// Daemon loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Poll period in seconds.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_interval_seconds() -> u64 {
    900
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Default level when neither `RUST_LOG` nor `--log-level` is given.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("ARCANA")
    }

    /// Load settings with a custom environment variable prefix.
    pub fn load_with_prefix(env_prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir =
            std::env::var("ARCANA_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let s = Config::builder()
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            .add_source(File::with_name(&format!("{config_dir}/{run_mode}")).required(false))
            .add_source(File::with_name(&format!("{config_dir}/local")).required(false))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
