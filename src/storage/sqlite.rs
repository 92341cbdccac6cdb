//! SQLite-backed interval store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{Local, NaiveDate, SecondsFormat};
use rusqlite::{params, Connection};

use super::{week_ending, DayStats, IntervalStore, StorageError};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
    CREATE TABLE IF NOT EXISTS intervals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        completed_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_intervals_date ON intervals(date);
";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Interval store kept in a single SQLite file.
///
/// The connection sits behind a mutex; every call is a single short
/// statement, so contention is negligible.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and applies migrations.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!("failed to enable WAL mode: {err}");
        }
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StorageError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }
}

fn run_migrations(conn: &mut Connection) -> Result<(), StorageError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

fn to_count(value: i64) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| StorageError::CountOutOfRange(value))
}

impl IntervalStore for SqliteStore {
    fn record_interval_completed(&self, date: NaiveDate) -> Result<(), StorageError> {
        let completed_at = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO intervals (date, completed_at) VALUES (?1, ?2)",
                params![date.format(DATE_FORMAT).to_string(), completed_at],
            )?;
            Ok(())
        })
    }

    fn count_for_date(&self, date: NaiveDate) -> Result<u32, StorageError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM intervals WHERE date = ?1",
                params![date.format(DATE_FORMAT).to_string()],
                |row| row.get(0),
            )?;
            to_count(count)
        })
    }

    fn counts_for_week_ending(&self, end: NaiveDate) -> Result<Vec<DayStats>, StorageError> {
        let days = week_ending(end);
        let first = days[0].format(DATE_FORMAT).to_string();
        let last = end.format(DATE_FORMAT).to_string();

        let counts = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date, COUNT(*) FROM intervals
                 WHERE date BETWEEN ?1 AND ?2
                 GROUP BY date",
            )?;
            let rows = stmt.query_map(params![first, last], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;

            let mut counts = HashMap::new();
            for row in rows {
                let (date, count) = row?;
                counts.insert(date, to_count(count)?);
            }
            Ok(counts)
        })?;

        Ok(days
            .into_iter()
            .map(|date| DayStats {
                date,
                intervals: counts
                    .get(&date.format(DATE_FORMAT).to_string())
                    .copied()
                    .unwrap_or(0),
            })
            .collect())
    }

    fn close(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, err)| StorageError::Database(err))?;
        }
        Ok(())
    }
}
