//! Durable history of completed work intervals.
//!
//! The daemon only needs an append-only "one interval completed on date D"
//! writer plus two reads: today's count (to seed the timer at startup) and
//! the trailing seven days (for the status payload).
//!
//! - `sqlite`: the on-disk store used by the daemon
//! - `MemoryStore`: in-process store for tests and ephemeral daemons

pub mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SqliteStore;

/// Number of days reported by `counts_for_trailing_7_days`.
pub const WEEK_DAYS: usize = 7;

// ============================================================================
// StorageError
// ============================================================================

/// Errors from the interval store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database directory could not be prepared.
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    /// A stored count does not fit the reported type.
    #[error("stored count out of range: {0}")]
    CountOutOfRange(i64),

    /// The store was closed.
    #[error("store is closed")]
    Closed,
}

// ============================================================================
// DayStats
// ============================================================================

/// Completed intervals on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub intervals: u32,
}

/// Today's date in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// The seven calendar days ending with `end`, oldest first.
pub fn week_ending(end: NaiveDate) -> Vec<NaiveDate> {
    (0..WEEK_DAYS as u64)
        .rev()
        .map(|offset| end.checked_sub_days(Days::new(offset)).unwrap_or(NaiveDate::MIN))
        .collect()
}

// ============================================================================
// IntervalStore
// ============================================================================

/// Read/write contract the daemon requires from persistence.
pub trait IntervalStore: Send + Sync {
    /// Appends one completed work interval on `date`.
    fn record_interval_completed(&self, date: NaiveDate) -> Result<(), StorageError>;

    /// Number of intervals completed on `date`.
    fn count_for_date(&self, date: NaiveDate) -> Result<u32, StorageError>;

    /// Per-day counts for the seven days ending with `end`, oldest first.
    fn counts_for_week_ending(&self, end: NaiveDate) -> Result<Vec<DayStats>, StorageError> {
        week_ending(end)
            .into_iter()
            .map(|date| {
                Ok(DayStats {
                    date,
                    intervals: self.count_for_date(date)?,
                })
            })
            .collect()
    }

    /// Releases the underlying resource. Safe to call more than once.
    fn close(&self) -> Result<(), StorageError>;

    /// Number of intervals completed today.
    fn count_for_today(&self) -> Result<u32, StorageError> {
        self.count_for_date(today())
    }

    /// Per-day counts for the trailing seven days, ending with today.
    fn counts_for_trailing_7_days(&self) -> Result<Vec<DayStats>, StorageError> {
        self.counts_for_week_ending(today())
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Non-durable store keeping counts in a map.
#[derive(Debug)]
pub struct MemoryStore {
    counts: Mutex<Option<HashMap<NaiveDate, u32>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Creates a store pre-filled with `(date, count)` pairs.
    pub fn with_counts(counts: impl IntoIterator<Item = (NaiveDate, u32)>) -> Self {
        Self {
            counts: Mutex::new(Some(counts.into_iter().collect())),
        }
    }

    fn with_map<T>(
        &self,
        f: impl FnOnce(&mut HashMap<NaiveDate, u32>) -> T,
    ) -> Result<T, StorageError> {
        let mut guard = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_mut().map(f).ok_or(StorageError::Closed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalStore for MemoryStore {
    fn record_interval_completed(&self, date: NaiveDate) -> Result<(), StorageError> {
        self.with_map(|counts| *counts.entry(date).or_insert(0) += 1)
    }

    fn count_for_date(&self, date: NaiveDate) -> Result<u32, StorageError> {
        self.with_map(|counts| counts.get(&date).copied().unwrap_or(0))
    }

    fn close(&self) -> Result<(), StorageError> {
        self.counts.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
