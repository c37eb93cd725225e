//! TimescaleDB schema management.
//!
//! Creates the `raw_trades` hypertable and the lazily materialized
//! per-`(bar_type, pair)` bar hypertables. Everything is idempotent, so
//! every worker in a swarm can run it unconditionally at startup. When
//! the TimescaleDB extension is missing, tables stay plain PostgreSQL —
//! the pipeline still works, just without time partitioning.

use sqlx::PgPool;
use tracing::{debug, info, warn};

use super::StoreResult;

const RAW_TRADES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS raw_trades (
    timestamp    TIMESTAMPTZ   NOT NULL,
    trade_id     TEXT          NOT NULL,
    source       TEXT          NOT NULL,
    pair         TEXT          NOT NULL,
    price        NUMERIC       NOT NULL,
    size         NUMERIC       NOT NULL,
    side         TEXT          NOT NULL,
    UNIQUE (source, trade_id, timestamp)
)
"#;

const RAW_TRADES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_raw_trades_pair_ts
    ON raw_trades (pair, timestamp)
"#;

/// TimescaleDB schema operations.
pub struct TimescaleOperations {
    pool: PgPool,
}

impl TimescaleOperations {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the trade log schema. Safe to call repeatedly.
    pub async fn init_schema(&self) -> StoreResult<()> {
        // The extension needs superuser on some installs; failing here is
        // not fatal because create_hypertable has its own fallback.
        if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS timescaledb CASCADE")
            .execute(&self.pool)
            .await
        {
            warn!("could not create timescaledb extension: {}", e);
        }

        sqlx::query(RAW_TRADES_SCHEMA).execute(&self.pool).await?;
        self.create_hypertable("raw_trades", "timestamp").await;
        sqlx::query(RAW_TRADES_INDEX).execute(&self.pool).await?;

        info!("database schema initialized");
        Ok(())
    }

    /// Create one per-`(bar_type, pair)` bar table if it does not exist.
    ///
    /// `table` must come from [`super::bar_table_name`], which validates
    /// the identifier before it is interpolated into DDL.
    pub async fn ensure_bar_table(&self, table: &str) -> StoreResult<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                time_start    TIMESTAMPTZ   NOT NULL,
                time_end      TIMESTAMPTZ   NOT NULL,
                bar_type      TEXT          NOT NULL,
                source        TEXT          NOT NULL,
                pair          TEXT          NOT NULL,
                open          NUMERIC       NOT NULL,
                high          NUMERIC       NOT NULL,
                low           NUMERIC       NOT NULL,
                close         NUMERIC       NOT NULL,
                vwap          NUMERIC       NOT NULL,
                volume        NUMERIC       NOT NULL,
                dollar_volume NUMERIC       NOT NULL,
                tick_count    BIGINT        NOT NULL,
                time_span     INTERVAL      NOT NULL,
                metadata      JSONB,
                UNIQUE (bar_type, source, pair, time_start)
            )
            "#
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        self.create_hypertable(table, "time_start").await;
        Ok(())
    }

    /// Convert a table to a hypertable, tolerating a missing extension
    /// and already-converted tables.
    async fn create_hypertable(&self, table: &str, time_column: &str) {
        let query = format!(
            "SELECT create_hypertable('{table}', '{time_column}', if_not_exists => TRUE, migrate_data => TRUE)"
        );
        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => debug!("hypertable {} ready", table),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("already a hypertable") {
                    debug!("{} is already a hypertable", table);
                } else {
                    warn!(
                        "create_hypertable failed for {} ({}); continuing with a plain table",
                        table, msg
                    );
                }
            }
        }
    }
}
