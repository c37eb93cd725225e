//! Market data repository.
//!
//! High-level access to the trade log and the bar tables. All writes are
//! idempotent upserts: trades conflict-ignore on `(source, trade_id,
//! timestamp)`, bars conflict-update on `(bar_type, source, pair,
//! time_start)` so rebuilds refresh every column including the EWMA
//! metadata.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use arcana_common::bars::Bar;
use arcana_common::data::{Trade, TradeSide};
use arcana_common::error::{ErrorCategory, ErrorClassification};

use crate::config::DatabaseSettings;

use super::TimescaleOperations;

/// Repository errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl ErrorClassification for StoreError {
    fn category(&self) -> ErrorCategory {
        match self {
            StoreError::Database(_) => ErrorCategory::Transient,
            StoreError::InvalidIdentifier(_) => ErrorCategory::Permanent,
        }
    }

    fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            StoreError::Database(_) => Some(Duration::from_millis(500)),
            _ => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Physical table name for a `(bar_type, pair)` bar family.
///
/// `tick_500` + `ETH-USD` → `bars_tick_500_eth_usd`. Both parts are
/// validated before being interpolated into SQL: bar types are lowercase
/// `[a-z0-9_.]`, pairs are `BASE-QUOTE` with alphanumeric halves.
pub fn bar_table_name(bar_type: &str, pair: &str) -> StoreResult<String> {
    if bar_type.is_empty()
        || !bar_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
    {
        return Err(StoreError::InvalidIdentifier(format!(
            "bar_type '{bar_type}' must be non-empty lowercase [a-z0-9_.]"
        )));
    }

    let valid_pair = match pair.split_once('-') {
        Some((base, quote)) => {
            !base.is_empty()
                && !quote.is_empty()
                && base.chars().all(|c| c.is_ascii_alphanumeric())
                && quote.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    };
    if !valid_pair {
        return Err(StoreError::InvalidIdentifier(format!(
            "pair '{pair}' must look like BASE-QUOTE"
        )));
    }

    Ok(format!(
        "bars_{}_{}",
        bar_type.replace('.', "_"),
        pair.to_ascii_lowercase().replace('-', "_")
    ))
}

/// Cursor into the trade log for ascending keyset pagination.
#[derive(Debug, Clone)]
pub enum TradeCursor {
    /// Every trade with `timestamp >= ts`.
    From(DateTime<Utc>),
    /// Every trade strictly after `(ts, trade_id)` in log order.
    After(DateTime<Utc>, String),
}

/// The most recent bar of a family, as needed for resume.
#[derive(Debug, Clone)]
pub struct LastBar {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Per-UTC-day trade count, for gap detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DayCount {
    pub day: DateTime<Utc>,
    pub count: i64,
}

/// Per-month ingestion summary, for swarm progress reporting.
#[derive(Debug, Clone)]
pub struct MonthStat {
    pub month: DateTime<Utc>,
    pub count: i64,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

/// Aggregates used by fixed-threshold calibration.
#[derive(Debug, Clone, Copy)]
pub struct TradeVolumeStats {
    pub total_trades: f64,
    pub total_volume: f64,
    pub total_dollar_volume: f64,
    pub span_days: f64,
}

/// Aggregates used by adaptive-threshold calibration.
#[derive(Debug, Clone, Copy)]
pub struct ImbalanceStats {
    pub avg_size: f64,
    pub avg_dollar: f64,
    /// Share of buys among trades with a known side.
    pub buy_fraction: f64,
}

/// Trade and bar storage over a PostgreSQL/TimescaleDB pool.
pub struct TradeStore {
    pool: PgPool,
    batch_size: usize,
}

impl TradeStore {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self { pool, batch_size }
    }

    /// Connect a pool from settings.
    pub async fn connect(settings: &DatabaseSettings, batch_size: usize) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&settings.url())
            .await?;
        Ok(Self::new(pool, batch_size))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and hypertables. Idempotent.
    pub async fn init_schema(&self) -> StoreResult<()> {
        TimescaleOperations::new(self.pool.clone()).init_schema().await
    }

    /// Batched trade upsert. Duplicates are silently ignored; each batch
    /// commits independently, so a crash loses at most one batch.
    ///
    /// Returns the number of rows actually inserted.
    pub async fn insert_trades(&self, trades: &[Trade]) -> StoreResult<u64> {
        if trades.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        for chunk in trades.chunks(self.batch_size) {
            inserted += self.insert_trade_chunk(chunk).await?;
        }
        debug!("inserted {} new trades (batch of {})", inserted, trades.len());
        Ok(inserted)
    }

    async fn insert_trade_chunk(&self, trades: &[Trade]) -> StoreResult<u64> {
        let mut query = String::from(
            "INSERT INTO raw_trades (timestamp, trade_id, source, pair, price, size, side) VALUES ",
        );
        for i in 0..trades.len() {
            if i > 0 {
                query.push_str(", ");
            }
            let base = i * 7;
            query.push_str(&format!(
                "(${}, ${}, ${}, ${}, ${}, ${}, ${})",
                base + 1,
                base + 2,
                base + 3,
                base + 4,
                base + 5,
                base + 6,
                base + 7,
            ));
        }
        query.push_str(" ON CONFLICT DO NOTHING");

        let mut sqlx_query = sqlx::query(&query);
        for trade in trades {
            sqlx_query = sqlx_query
                .bind(trade.timestamp)
                .bind(&trade.trade_id)
                .bind(&trade.source)
                .bind(&trade.pair)
                .bind(trade.price)
                .bind(trade.size)
                .bind(trade.side.as_db_str());
        }

        let result = sqlx_query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Batched bar upsert into the per-`(bar_type, pair)` table, created
    /// lazily on first use. Conflicts refresh every column — rebuilds
    /// must overwrite stale EWMA metadata.
    pub async fn insert_bars(&self, bars: &[Bar]) -> StoreResult<u64> {
        if bars.is_empty() {
            return Ok(0);
        }

        let timescale = TimescaleOperations::new(self.pool.clone());
        let mut upserted = 0u64;

        // Bars almost always arrive for a single family; grouping keeps
        // the contract correct when they do not.
        let mut groups: Vec<(&str, &str, Vec<&Bar>)> = Vec::new();
        for bar in bars {
            let found = groups
                .iter()
                .position(|(t, p, _)| *t == bar.bar_type && *p == bar.pair);
            match found {
                Some(idx) => groups[idx].2.push(bar),
                None => groups.push((&bar.bar_type, &bar.pair, vec![bar])),
            }
        }

        for (bar_type, pair, group) in groups {
            let table = bar_table_name(bar_type, pair)?;
            timescale.ensure_bar_table(&table).await?;
            for chunk in group.chunks(self.batch_size) {
                upserted += self.insert_bar_chunk(&table, chunk).await?;
            }
        }

        debug!("upserted {} bars", upserted);
        Ok(upserted)
    }

    async fn insert_bar_chunk(&self, table: &str, bars: &[&Bar]) -> StoreResult<u64> {
        let mut query = format!(
            "INSERT INTO {table} (time_start, time_end, bar_type, source, pair, \
             open, high, low, close, vwap, volume, dollar_volume, tick_count, \
             time_span, metadata) VALUES "
        );
        for i in 0..bars.len() {
            if i > 0 {
                query.push_str(", ");
            }
            let base = i * 15;
            let params: Vec<String> = (1..=15).map(|j| format!("${}", base + j)).collect();
            query.push('(');
            query.push_str(&params.join(", "));
            query.push(')');
        }
        query.push_str(
            " ON CONFLICT (bar_type, source, pair, time_start) DO UPDATE SET \
             time_end = EXCLUDED.time_end, open = EXCLUDED.open, high = EXCLUDED.high, \
             low = EXCLUDED.low, close = EXCLUDED.close, vwap = EXCLUDED.vwap, \
             volume = EXCLUDED.volume, dollar_volume = EXCLUDED.dollar_volume, \
             tick_count = EXCLUDED.tick_count, time_span = EXCLUDED.time_span, \
             metadata = EXCLUDED.metadata",
        );

        let mut sqlx_query = sqlx::query(&query);
        for bar in bars {
            let span = PgInterval {
                months: 0,
                days: 0,
                microseconds: bar.time_span().num_microseconds().unwrap_or(i64::MAX),
            };
            sqlx_query = sqlx_query
                .bind(bar.time_start)
                .bind(bar.time_end)
                .bind(&bar.bar_type)
                .bind(&bar.source)
                .bind(&bar.pair)
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.vwap)
                .bind(bar.volume)
                .bind(bar.dollar_volume)
                .bind(bar.tick_count)
                .bind(span)
                .bind(bar.metadata.clone());
        }

        let result = sqlx_query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Latest stored trade timestamp, optionally bounded by `before` so a
    /// swarm worker only sees its own range.
    pub async fn max_trade_ts(
        &self,
        source: &str,
        pair: &str,
        before: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(timestamp) AS ts
            FROM raw_trades
            WHERE source = $1 AND pair = $2
              AND ($3::timestamptz IS NULL OR timestamp < $3)
            "#,
        )
        .bind(source)
        .bind(pair)
        .bind(before)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("ts"))
    }

    /// Earliest stored trade timestamp.
    pub async fn first_trade_ts(
        &self,
        source: &str,
        pair: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MIN(timestamp) AS ts FROM raw_trades WHERE source = $1 AND pair = $2",
        )
        .bind(source)
        .bind(pair)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("ts"))
    }

    /// Ascending page of trades from the cursor, at most `limit` rows.
    pub async fn trades_since(
        &self,
        source: &str,
        pair: &str,
        cursor: &TradeCursor,
        limit: i64,
    ) -> StoreResult<Vec<Trade>> {
        let rows = match cursor {
            TradeCursor::From(ts) => {
                sqlx::query(
                    r#"
                    SELECT timestamp, trade_id, source, pair, price, size, side
                    FROM raw_trades
                    WHERE source = $1 AND pair = $2 AND timestamp >= $3
                    ORDER BY timestamp ASC, trade_id ASC
                    LIMIT $4
                    "#,
                )
                .bind(source)
                .bind(pair)
                .bind(ts)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            TradeCursor::After(ts, trade_id) => {
                sqlx::query(
                    r#"
                    SELECT timestamp, trade_id, source, pair, price, size, side
                    FROM raw_trades
                    WHERE source = $1 AND pair = $2 AND (timestamp, trade_id) > ($3, $4)
                    ORDER BY timestamp ASC, trade_id ASC
                    LIMIT $5
                    "#,
                )
                .bind(source)
                .bind(pair)
                .bind(ts)
                .bind(trade_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| {
                let side: String = row.get("side");
                Trade {
                    timestamp: row.get("timestamp"),
                    trade_id: row.get("trade_id"),
                    source: row.get("source"),
                    pair: row.get("pair"),
                    price: row.get::<Decimal, _>("price"),
                    size: row.get::<Decimal, _>("size"),
                    side: TradeSide::from_db_str(&side),
                }
            })
            .collect())
    }

    /// Total trade count, optionally per pair.
    pub async fn trade_count(&self, pair: Option<&str>) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM raw_trades WHERE ($1::text IS NULL OR pair = $1)",
        )
        .bind(pair)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    /// Most recent bar of a family, or `None` when the family's table
    /// does not exist yet.
    pub async fn last_bar(
        &self,
        bar_type: &str,
        source: &str,
        pair: &str,
    ) -> StoreResult<Option<LastBar>> {
        let table = bar_table_name(bar_type, pair)?;
        let query = format!(
            "SELECT time_start, time_end, metadata FROM {table} \
             WHERE bar_type = $1 AND source = $2 AND pair = $3 \
             ORDER BY time_end DESC LIMIT 1"
        );

        let result = sqlx::query(&query)
            .bind(bar_type)
            .bind(source)
            .bind(pair)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(row.map(|row| LastBar {
                time_start: row.get("time_start"),
                time_end: row.get("time_end"),
                metadata: row.get("metadata"),
            })),
            Err(e) if is_undefined_table(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Bar count for a family. Missing table counts as zero.
    pub async fn bar_count(&self, bar_type: &str, source: &str, pair: &str) -> StoreResult<i64> {
        let table = bar_table_name(bar_type, pair)?;
        let query = format!(
            "SELECT COUNT(*) AS n FROM {table} \
             WHERE bar_type = $1 AND source = $2 AND pair = $3"
        );
        match sqlx::query(&query)
            .bind(bar_type)
            .bind(source)
            .bind(pair)
            .fetch_one(&self.pool)
            .await
        {
            Ok(row) => Ok(row.get("n")),
            Err(e) if is_undefined_table(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete bars starting strictly after `since` — stale remainders of
    /// an interrupted build. Missing table deletes nothing.
    pub async fn delete_bars_since(
        &self,
        bar_type: &str,
        source: &str,
        pair: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let table = bar_table_name(bar_type, pair)?;
        let query = format!(
            "DELETE FROM {table} \
             WHERE bar_type = $1 AND source = $2 AND pair = $3 AND time_start > $4"
        );
        match sqlx::query(&query)
            .bind(bar_type)
            .bind(source)
            .bind(pair)
            .bind(since)
            .execute(&self.pool)
            .await
        {
            Ok(result) => Ok(result.rows_affected()),
            Err(e) if is_undefined_table(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every bar of a family (full rebuild).
    pub async fn delete_all_bars(
        &self,
        bar_type: &str,
        source: &str,
        pair: &str,
    ) -> StoreResult<u64> {
        let table = bar_table_name(bar_type, pair)?;
        let query = format!(
            "DELETE FROM {table} WHERE bar_type = $1 AND source = $2 AND pair = $3"
        );
        match sqlx::query(&query)
            .bind(bar_type)
            .bind(source)
            .bind(pair)
            .execute(&self.pool)
            .await
        {
            Ok(result) => Ok(result.rows_affected()),
            Err(e) if is_undefined_table(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Per-UTC-day trade counts inside `[start, end)`. Days with no
    /// trades have no row — gap detection happens in the caller.
    pub async fn count_by_day(
        &self,
        source: &str,
        pair: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<DayCount>> {
        let rows = sqlx::query(
            r#"
            SELECT date_trunc('day', timestamp) AS day, COUNT(*) AS trade_count
            FROM raw_trades
            WHERE source = $1 AND pair = $2 AND timestamp >= $3 AND timestamp < $4
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(source)
        .bind(pair)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DayCount {
                day: row.get("day"),
                count: row.get("trade_count"),
            })
            .collect())
    }

    /// Per-month summary of the trade log for a pair.
    pub async fn month_summary(&self, source: &str, pair: &str) -> StoreResult<Vec<MonthStat>> {
        let rows = sqlx::query(
            r#"
            SELECT date_trunc('month', timestamp) AS month,
                   COUNT(*) AS trade_count,
                   MIN(timestamp) AS first_trade,
                   MAX(timestamp) AS last_trade
            FROM raw_trades
            WHERE source = $1 AND pair = $2
            GROUP BY month
            ORDER BY month
            "#,
        )
        .bind(source)
        .bind(pair)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MonthStat {
                month: row.get("month"),
                count: row.get("trade_count"),
                first: row.get("first_trade"),
                last: row.get("last_trade"),
            })
            .collect())
    }

    /// Aggregates for fixed-threshold calibration, or `None` for an
    /// empty log.
    pub async fn trade_volume_stats(
        &self,
        source: &str,
        pair: &str,
    ) -> StoreResult<Option<TradeVolumeStats>> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)::FLOAT8 AS total_trades,
                   COALESCE(SUM(size), 0)::FLOAT8 AS total_volume,
                   COALESCE(SUM(price * size), 0)::FLOAT8 AS total_dollar_volume,
                   (EXTRACT(EPOCH FROM (MAX(timestamp) - MIN(timestamp))) / 86400.0)::FLOAT8
                       AS span_days
            FROM raw_trades
            WHERE source = $1 AND pair = $2
            "#,
        )
        .bind(source)
        .bind(pair)
        .fetch_one(&self.pool)
        .await?;

        let total_trades: f64 = row.get("total_trades");
        let span_days: Option<f64> = row.get("span_days");
        match span_days {
            Some(span_days) if total_trades > 0.0 => Ok(Some(TradeVolumeStats {
                total_trades,
                total_volume: row.get("total_volume"),
                total_dollar_volume: row.get("total_dollar_volume"),
                span_days,
            })),
            _ => Ok(None),
        }
    }

    /// Aggregates for adaptive-threshold calibration, or `None` for an
    /// empty log or one with no side information at all.
    pub async fn imbalance_stats(
        &self,
        source: &str,
        pair: &str,
    ) -> StoreResult<Option<ImbalanceStats>> {
        let row = sqlx::query(
            r#"
            SELECT AVG(size)::FLOAT8 AS avg_size,
                   AVG(price * size)::FLOAT8 AS avg_dollar,
                   (SUM(CASE WHEN side = 'buy' THEN 1 ELSE 0 END)::FLOAT8
                    / NULLIF(SUM(CASE WHEN side IN ('buy', 'sell') THEN 1 ELSE 0 END), 0)::FLOAT8)
                       AS buy_fraction
            FROM raw_trades
            WHERE source = $1 AND pair = $2
            "#,
        )
        .bind(source)
        .bind(pair)
        .fetch_one(&self.pool)
        .await?;

        let avg_size: Option<f64> = row.get("avg_size");
        let avg_dollar: Option<f64> = row.get("avg_dollar");
        let buy_fraction: Option<f64> = row.get("buy_fraction");
        match (avg_size, avg_dollar, buy_fraction) {
            (Some(avg_size), Some(avg_dollar), Some(buy_fraction)) => Ok(Some(ImbalanceStats {
                avg_size,
                avg_dollar,
                buy_fraction,
            })),
            _ => Ok(None),
        }
    }
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("42P01"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_for_standard_families() {
        assert_eq!(
            bar_table_name("tick_500", "ETH-USD").unwrap(),
            "bars_tick_500_eth_usd"
        );
        assert_eq!(
            bar_table_name("volume_100", "ETH-USD").unwrap(),
            "bars_volume_100_eth_usd"
        );
        assert_eq!(
            bar_table_name("dollar_50000", "BTC-USD").unwrap(),
            "bars_dollar_50000_btc_usd"
        );
        assert_eq!(
            bar_table_name("time_5m", "ETH-USD").unwrap(),
            "bars_time_5m_eth_usd"
        );
        assert_eq!(
            bar_table_name("time_30s", "ETH-USD").unwrap(),
            "bars_time_30s_eth_usd"
        );
        assert_eq!(
            bar_table_name("time_1d", "SOL-USD").unwrap(),
            "bars_time_1d_sol_usd"
        );
    }

    #[test]
    fn table_names_for_adaptive_families() {
        assert_eq!(
            bar_table_name("tib_20", "ETH-USD").unwrap(),
            "bars_tib_20_eth_usd"
        );
        assert_eq!(
            bar_table_name("trb_10", "BTC-USD").unwrap(),
            "bars_trb_10_btc_usd"
        );
    }

    #[test]
    fn decimal_threshold_dots_become_underscores() {
        assert_eq!(
            bar_table_name("volume_10.5", "ETH-USD").unwrap(),
            "bars_volume_10_5_eth_usd"
        );
    }

    #[test]
    fn pairs_are_case_insensitive() {
        assert_eq!(
            bar_table_name("tick_500", "Eth-Usd").unwrap(),
            "bars_tick_500_eth_usd"
        );
        assert_eq!(
            bar_table_name("tick_500", "ETH-USD").unwrap(),
            bar_table_name("tick_500", "eth-usd").unwrap()
        );
    }

    #[test]
    fn different_pairs_get_different_tables() {
        assert_ne!(
            bar_table_name("tick_500", "ETH-USD").unwrap(),
            bar_table_name("tick_500", "BTC-USD").unwrap()
        );
    }

    #[test]
    fn rejects_hostile_bar_types() {
        for bad in ["tick_500; DROP TABLE", "tick-500", "TICK_500", "tick 500", ""] {
            assert!(
                matches!(
                    bar_table_name(bad, "ETH-USD"),
                    Err(StoreError::InvalidIdentifier(ref m)) if m.contains("bar_type")
                ),
                "should reject bar_type {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_hostile_pairs() {
        for bad in ["ETHUSD", "ETH USD", "ETH-USD; DROP TABLE", ""] {
            assert!(
                matches!(
                    bar_table_name("tick_500", bad),
                    Err(StoreError::InvalidIdentifier(ref m)) if m.contains("pair")
                ),
                "should reject pair {bad:?}"
            );
        }
    }

    #[test]
    fn store_errors_classify_for_retry() {
        let err = StoreError::InvalidIdentifier("x".into());
        assert!(err.is_permanent());
        let err = StoreError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(err.suggested_retry_delay().is_some());
    }
}
