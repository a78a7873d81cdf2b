//! Durable history of test runs, backed by SQLite.
//!
//! The store is pure data access: the at-most-one-running invariant is the
//! coordinator's job, while the conditional update in [`RunStore::finalize`]
//! is the safety net against a double-finalize race.
use rusqlite::types::Type;
use rusqlite::OptionalExtension;
use std::path::Path;
use swarmdash_core::{Run, RunAggregates, RunConfig, RunStatus};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database call failed: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("timestamp encoding failed: {0}")]
    Timestamp(#[from] time::error::Format),
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'stopped', 'failed')),
    start_time TEXT NOT NULL,
    end_time TEXT,
    target_url TEXT NOT NULL,
    users INTEGER NOT NULL,
    spawn_rate REAL NOT NULL,
    duration INTEGER NOT NULL,
    avg_response_time REAL,
    requests_per_second REAL,
    error_rate REAL,
    total_requests INTEGER,
    total_failures INTEGER
)";

const RUN_COLUMNS: &str = "id, name, status, start_time, end_time, target_url, users, \
     spawn_rate, duration, avg_response_time, requests_per_second, error_rate, \
     total_requests, total_failures";

/// Handle to the run-history database. Cheap to clone; all calls run on
/// the connection's background thread.
#[derive(Clone)]
pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref().to_owned()).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute(SCHEMA, [])?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Insert a new run in `running` state and return its identifier.
    /// Identifiers are assigned by SQLite and never reused.
    pub async fn create(
        &self,
        config: &RunConfig,
        start_time: OffsetDateTime,
    ) -> Result<i64, StoreError> {
        let config = config.clone();
        let start_time = start_time.format(&Rfc3339)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO runs (name, status, start_time, target_url, users, spawn_rate, duration)
                     VALUES (?1, 'running', ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        config.name,
                        start_time,
                        config.target_url,
                        i64::from(config.users),
                        config.spawn_rate,
                        clamp_i64(config.duration),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// One-shot transition out of `running`: set the terminal status, the
    /// end time, and the aggregates in a single conditional update.
    /// Returns whether a row changed; `false` means another finalize won.
    pub async fn finalize(
        &self,
        id: i64,
        status: RunStatus,
        end_time: OffsetDateTime,
        aggregates: Option<RunAggregates>,
    ) -> Result<bool, StoreError> {
        let end_time = end_time.format(&Rfc3339)?;
        let applied = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE runs
                     SET status = ?1, end_time = ?2, avg_response_time = ?3,
                         requests_per_second = ?4, error_rate = ?5,
                         total_requests = ?6, total_failures = ?7
                     WHERE id = ?8 AND status = 'running'",
                    rusqlite::params![
                        status.as_str(),
                        end_time,
                        aggregates.map(|a| a.avg_response_time),
                        aggregates.map(|a| a.requests_per_second),
                        aggregates.map(|a| a.error_rate),
                        aggregates.map(|a| clamp_i64(a.total_requests)),
                        aggregates.map(|a| clamp_i64(a.total_failures)),
                        id,
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(applied)
    }

    /// The run currently in `running` state, if any. At most one exists by
    /// coordinator invariant.
    pub async fn get_active(&self) -> Result<Option<Run>, StoreError> {
        let run = self
            .conn
            .call(move |conn| {
                let run = conn
                    .query_row(
                        &format!(
                            "SELECT {RUN_COLUMNS} FROM runs WHERE status = 'running'
                             ORDER BY start_time DESC LIMIT 1"
                        ),
                        [],
                        run_from_row,
                    )
                    .optional()?;
                Ok(run)
            })
            .await?;
        Ok(run)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Run>, StoreError> {
        let run = self
            .conn
            .call(move |conn| {
                let run = conn
                    .query_row(
                        &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                        [id],
                        run_from_row,
                    )
                    .optional()?;
                Ok(run)
            })
            .await?;
        Ok(run)
    }

    /// Full history, most recent start first.
    pub async fn list_all(&self) -> Result<Vec<Run>, StoreError> {
        let runs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RUN_COLUMNS} FROM runs ORDER BY start_time DESC, id DESC"
                ))?;
                let runs = stmt
                    .query_map([], run_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(runs)
            })
            .await?;
        Ok(runs)
    }
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    let status: String = row.get(2)?;
    let status = status
        .parse::<RunStatus>()
        .map_err(|err| conversion_error(2, err))?;

    let start_time: String = row.get(3)?;
    let start_time = OffsetDateTime::parse(&start_time, &Rfc3339)
        .map_err(|err| conversion_error(3, err))?;
    let end_time: Option<String> = row.get(4)?;
    let end_time = end_time
        .map(|raw| OffsetDateTime::parse(&raw, &Rfc3339))
        .transpose()
        .map_err(|err| conversion_error(4, err))?;

    let avg_response_time: Option<f64> = row.get(9)?;
    let requests_per_second: Option<f64> = row.get(10)?;
    let error_rate: Option<f64> = row.get(11)?;
    let total_requests: Option<i64> = row.get(12)?;
    let total_failures: Option<i64> = row.get(13)?;
    let aggregates = match (
        avg_response_time,
        requests_per_second,
        error_rate,
        total_requests,
        total_failures,
    ) {
        (Some(avg), Some(rps), Some(err), Some(total), Some(failures)) => Some(RunAggregates {
            avg_response_time: avg,
            requests_per_second: rps,
            error_rate: err,
            total_requests: total.max(0) as u64,
            total_failures: failures.max(0) as u64,
        }),
        _ => None,
    };

    let users: i64 = row.get(6)?;
    let duration: i64 = row.get(8)?;

    Ok(Run {
        id: row.get(0)?,
        config: RunConfig {
            name: row.get(1)?,
            target_url: row.get(5)?,
            users: users.clamp(0, i64::from(u32::MAX)) as u32,
            spawn_rate: row.get(7)?,
            duration: duration.max(0) as u64,
        },
        status,
        start_time,
        end_time,
        aggregates,
    })
}

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
