//! Parallel backfill orchestration.
//!
//! Splits a historical range into disjoint sub-ranges and emits a
//! docker-compose manifest with one ingester container per chunk, all
//! writing to one shared TimescaleDB. No cross-process coordination
//! exists: disjoint ranges avoid write races in the common case and the
//! store's `(source, trade_id, timestamp)` uniqueness absorbs boundary
//! overlap, so restarts and seam re-fetches are harmless.

use std::fmt::Write as _;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use thiserror::Error;

use crate::storage::DayCount;

/// Input error from swarm planning (bad worker count or range).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SwarmPlanError(pub String);

/// Split `[since, until]` into `workers` roughly equal, non-overlapping
/// chunks. Adjacent chunks share a boundary — `chunk[i].1 ==
/// chunk[i+1].0` — so there is no gap, and the last chunk always ends
/// exactly at `until` to avoid rounding gaps.
pub fn split_range(
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    workers: usize,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, SwarmPlanError> {
    if workers < 1 {
        return Err(SwarmPlanError(format!("workers must be >= 1, got {workers}")));
    }
    if since >= until {
        return Err(SwarmPlanError(format!(
            "since ({since}) must be before until ({until})"
        )));
    }

    let total_secs = (until - since).num_seconds();
    let chunk_secs = total_secs as f64 / workers as f64;

    let mut chunks = Vec::with_capacity(workers);
    for i in 0..workers {
        let chunk_start = since + Duration::seconds((chunk_secs * i as f64) as i64);
        let chunk_end = if i == workers - 1 {
            until
        } else {
            since + Duration::seconds((chunk_secs * (i + 1) as f64) as i64)
        };
        chunks.push((chunk_start, chunk_end));
    }
    Ok(chunks)
}

/// Split `[since, until]` on calendar month boundaries — the default
/// partition when no worker count is given. The first and last chunks
/// may be partial months.
pub fn split_months(
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, SwarmPlanError> {
    if since >= until {
        return Err(SwarmPlanError(format!(
            "since ({since}) must be before until ({until})"
        )));
    }

    let mut chunks = Vec::new();
    let mut cursor = since;
    while cursor < until {
        let end = next_month_start(cursor).min(until);
        chunks.push((cursor, end));
        cursor = end;
    }
    Ok(chunks)
}

fn next_month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = (ts.year(), ts.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .unwrap_or(ts + Duration::days(31))
}

/// Database coordinates written into each worker's environment.
#[derive(Debug, Clone)]
pub struct ComposeDb {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for ComposeDb {
    fn default() -> Self {
        Self {
            host: "db".to_string(),
            port: 5432,
            name: "arcana".to_string(),
            user: "arcana".to_string(),
            password: "arcana".to_string(),
        }
    }
}

fn worker_label(index: usize, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "worker-{index:02}-{}-{}",
        start.format("%Y%m%d"),
        end.format("%Y%m%d")
    )
}

/// Render the docker-compose manifest for a planned swarm: one
/// TimescaleDB service plus one ingester per chunk.
pub fn render_compose(
    pair: &str,
    chunks: &[(DateTime<Utc>, DateTime<Utc>)],
    db: &ComposeDb,
    image: &str,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "services:");
    let _ = writeln!(out, "  db:");
    let _ = writeln!(out, "    image: timescale/timescaledb:latest-pg16");
    let _ = writeln!(out, "    ports:");
    let _ = writeln!(out, "      - \"{}:5432\"", db.port);
    let _ = writeln!(out, "    environment:");
    let _ = writeln!(out, "      POSTGRES_DB: {}", db.name);
    let _ = writeln!(out, "      POSTGRES_USER: {}", db.user);
    let _ = writeln!(out, "      POSTGRES_PASSWORD: {}", db.password);
    let _ = writeln!(out, "    volumes:");
    let _ = writeln!(out, "      - arcana_data:/var/lib/postgresql/data");
    let _ = writeln!(out, "    healthcheck:");
    let _ = writeln!(
        out,
        "      test: [\"CMD-SHELL\", \"pg_isready -U {} -d {}\"]",
        db.user, db.name
    );
    let _ = writeln!(out, "      interval: 5s");
    let _ = writeln!(out, "      timeout: 5s");
    let _ = writeln!(out, "      retries: 10");

    for (i, (start, end)) in chunks.iter().enumerate() {
        let label = worker_label(i, *start, *end);
        let _ = writeln!(out, "  {label}:");
        let _ = writeln!(out, "    image: {image}");
        let _ = writeln!(out, "    command:");
        let _ = writeln!(out, "      - ingest");
        let _ = writeln!(out, "      - {pair}");
        let _ = writeln!(out, "      - --since");
        let _ = writeln!(out, "      - \"{}\"", start.format("%Y-%m-%dT%H:%M:%S"));
        let _ = writeln!(out, "      - --until");
        let _ = writeln!(out, "      - \"{}\"", end.format("%Y-%m-%dT%H:%M:%S"));
        let _ = writeln!(out, "    environment:");
        let _ = writeln!(out, "      ARCANA__DATABASE__HOST: {}", db.host);
        let _ = writeln!(out, "      ARCANA__DATABASE__PORT: \"{}\"", db.port);
        let _ = writeln!(out, "      ARCANA__DATABASE__NAME: {}", db.name);
        let _ = writeln!(out, "      ARCANA__DATABASE__USER: {}", db.user);
        let _ = writeln!(out, "      ARCANA__DATABASE__PASSWORD: {}", db.password);
        let _ = writeln!(out, "    depends_on:");
        let _ = writeln!(out, "      db:");
        let _ = writeln!(out, "        condition: service_healthy");
        let _ = writeln!(out, "    restart: on-failure");
    }

    let _ = writeln!(out, "volumes:");
    let _ = writeln!(out, "  arcana_data:");

    out
}

/// Human-readable summary of a planned swarm.
pub fn worker_summary(
    pair: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    chunks: &[(DateTime<Utc>, DateTime<Utc>)],
) -> String {
    let total_days = (until - since).num_days();
    let days_per_worker = total_days as f64 / chunks.len().max(1) as f64;

    let mut lines = vec![
        format!(
            "Swarm plan: {pair} | {} -> {} ({total_days} days)",
            since.date_naive(),
            until.date_naive()
        ),
        format!(
            "Workers: {} (~{days_per_worker:.1} days each)",
            chunks.len()
        ),
        String::new(),
        format!("  {:>3}  {:>12}  {:>12}  {:>5}", "#", "start", "end", "days"),
    ];

    for (i, (start, end)) in chunks.iter().enumerate() {
        let chunk_days = (*end - *start).num_seconds() as f64 / 86_400.0;
        lines.push(format!(
            "  {i:>3}  {:>12}  {:>12}  {chunk_days:>5.1}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ));
    }

    lines.join("\n")
}

/// UTC days inside `[since, until)` with zero stored trades — the
/// user-visible gap report.
pub fn missing_days(
    counts: &[DayCount],
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<NaiveDate> {
    let mut covered: Vec<NaiveDate> = counts
        .iter()
        .filter(|c| c.count > 0)
        .map(|c| c.day.date_naive())
        .collect();
    covered.sort();

    let mut missing = Vec::new();
    let mut day = since.date_naive();
    let last = (until - Duration::microseconds(1)).date_naive();
    while day <= last {
        if covered.binary_search(&day).is_err() {
            missing.push(day);
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    missing
}
