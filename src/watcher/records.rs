//! Per-path processing records.
//!
//! The record table is the single authority on whether a path has already
//! been handled. Lookup-or-create and the claim transition happen under one
//! lock, so two events for the same path can never both start processing.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Processing state of one input path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Seen but not yet claimed.
    Pending,
    /// Claimed by a processing task.
    InFlight,
    /// Artifact written.
    Done,
    /// Last attempt failed.
    Failed,
}

impl RecordState {
    /// Whether a new event for the path should start processing.
    #[must_use]
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Whether the state is final for the current attempt.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Bookkeeping for one input path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingRecord {
    /// Input path.
    pub path: PathBuf,
    /// Current state.
    pub state: RecordState,
    /// Number of times processing has been started.
    pub attempts: u32,
    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Time of the last state change.
    pub updated_at: DateTime<Utc>,
}

impl ProcessingRecord {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: RecordState::Pending,
            attempts: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    fn set_state(&mut self, state: RecordState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Result of trying to claim a path for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns attempt number `attempt`.
    Acquired { attempt: u32 },
    /// The path is already in flight or done.
    Busy(RecordState),
}

/// Counts of records by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub done: usize,
    pub failed: usize,
}

impl RecordCounts {
    /// Total number of records.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.in_flight + self.done + self.failed
    }
}

/// Thread-safe map from path to processing record.
#[derive(Debug, Default)]
pub struct RecordTable {
    records: Mutex<HashMap<PathBuf, ProcessingRecord>>,
}

impl RecordTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the record for `path` and claim it if it is
    /// Pending or Failed.
    pub fn claim(&self, path: &Path) -> Claim {
        let mut records = self.records.lock();
        let record = records
            .entry(path.to_path_buf())
            .or_insert_with(|| ProcessingRecord::new(path.to_path_buf()));

        if !record.state.is_claimable() {
            return Claim::Busy(record.state);
        }

        record.attempts += 1;
        record.last_error = None;
        record.set_state(RecordState::InFlight);
        Claim::Acquired {
            attempt: record.attempts,
        }
    }

    /// Mark attempt `attempt` of `path` as done.
    ///
    /// Returns false if the record is no longer in flight for that attempt.
    pub fn complete(&self, path: &Path, attempt: u32) -> bool {
        self.finish(path, attempt, RecordState::Done, None)
    }

    /// Mark attempt `attempt` of `path` as failed with `error`.
    ///
    /// Returns false if the record is no longer in flight for that attempt.
    pub fn fail(&self, path: &Path, attempt: u32, error: impl Into<String>) -> bool {
        self.finish(path, attempt, RecordState::Failed, Some(error.into()))
    }

    fn finish(&self, path: &Path, attempt: u32, state: RecordState, error: Option<String>) -> bool {
        let mut records = self.records.lock();
        match records.get_mut(path) {
            Some(record) if record.state == RecordState::InFlight && record.attempts == attempt => {
                record.last_error = error;
                record.set_state(state);
                true
            }
            _ => false,
        }
    }

    /// Fail every in-flight record with `reason`, returning their paths.
    pub fn abandon_in_flight(&self, reason: &str) -> Vec<PathBuf> {
        let mut records = self.records.lock();
        let mut abandoned: Vec<PathBuf> = records
            .values_mut()
            .filter(|r| r.state == RecordState::InFlight)
            .map(|r| {
                r.last_error = Some(reason.to_string());
                r.set_state(RecordState::Failed);
                r.path.clone()
            })
            .collect();
        abandoned.sort();
        abandoned
    }

    /// Snapshot of the record for `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<ProcessingRecord> {
        self.records.lock().get(path).cloned()
    }

    /// State of the record for `path`.
    #[must_use]
    pub fn state(&self, path: &Path) -> Option<RecordState> {
        self.records.lock().get(path).map(|r| r.state)
    }

    /// Snapshot of all records, sorted by path.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProcessingRecord> {
        let mut all: Vec<_> = self.records.lock().values().cloned().collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Count records by state.
    #[must_use]
    pub fn counts(&self) -> RecordCounts {
        self.records
            .lock()
            .values()
            .fold(RecordCounts::default(), |mut c, r| {
                match r.state {
                    RecordState::Pending => c.pending += 1,
                    RecordState::InFlight => c.in_flight += 1,
                    RecordState::Done => c.done += 1,
                    RecordState::Failed => c.failed += 1,
                }
                c
            })
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_claim_acquires() {
        let table = RecordTable::new();
        let path = Path::new("/inbox/a.txt");

        assert_eq!(table.claim(path), Claim::Acquired { attempt: 1 });
        assert_eq!(table.state(path), Some(RecordState::InFlight));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_duplicate_claims_are_busy() {
        let table = RecordTable::new();
        let path = Path::new("/inbox/a.txt");

        table.claim(path);
        assert_eq!(table.claim(path), Claim::Busy(RecordState::InFlight));

        assert!(table.complete(path, 1));
        assert_eq!(table.claim(path), Claim::Busy(RecordState::Done));
        assert_eq!(table.get(path).unwrap().attempts, 1);
    }

    #[test]
    fn test_failed_can_be_reclaimed() {
        let table = RecordTable::new();
        let path = Path::new("/inbox/a.txt");

        table.claim(path);
        assert!(table.fail(path, 1, "read error"));
        let record = table.get(path).unwrap();
        assert_eq!(record.state, RecordState::Failed);
        assert_eq!(record.last_error.as_deref(), Some("read error"));

        assert_eq!(table.claim(path), Claim::Acquired { attempt: 2 });
        assert!(table.get(path).unwrap().last_error.is_none());
    }

    #[test]
    fn test_stale_attempt_cannot_finish() {
        let table = RecordTable::new();
        let path = Path::new("/inbox/a.txt");

        table.claim(path);
        assert!(table.fail(path, 1, "boom"));
        table.claim(path);

        assert!(!table.complete(path, 1));
        assert_eq!(table.state(path), Some(RecordState::InFlight));
        assert!(table.complete(path, 2));
    }

    #[test]
    fn test_finish_unknown_path() {
        let table = RecordTable::new();
        assert!(!table.complete(Path::new("/nope.txt"), 1));
    }

    #[test]
    fn test_abandon_in_flight() {
        let table = RecordTable::new();
        let a = Path::new("/inbox/a.txt");
        let b = Path::new("/inbox/b.txt");
        table.claim(a);
        table.claim(b);
        table.complete(b, 1);

        let abandoned = table.abandon_in_flight("abandoned at shutdown");
        assert_eq!(abandoned, vec![a.to_path_buf()]);
        assert_eq!(table.state(a), Some(RecordState::Failed));
        assert!(!table.complete(a, 1));
        assert_eq!(table.state(a), Some(RecordState::Failed));
    }

    #[test]
    fn test_counts_and_snapshot() {
        let table = RecordTable::new();
        assert!(table.is_empty());

        for name in ["c.txt", "a.txt", "b.txt"] {
            table.claim(&Path::new("/inbox").join(name));
        }
        table.complete(Path::new("/inbox/a.txt"), 1);
        table.fail(Path::new("/inbox/b.txt"), 1, "x");

        let counts = table.counts();
        assert_eq!(counts.in_flight, 1);
        assert_eq!(counts.done, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 3);

        let paths: Vec<_> = table.snapshot().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/inbox/a.txt"),
                PathBuf::from("/inbox/b.txt"),
                PathBuf::from("/inbox/c.txt"),
            ]
        );
    }

    #[test]
    fn test_concurrent_claims_acquire_once() {
        let table = Arc::new(RecordTable::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || table.claim(Path::new("/inbox/race.txt")))
            })
            .collect();

        let acquired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| matches!(c, Claim::Acquired { .. }))
            .count();
        assert_eq!(acquired, 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RecordState::InFlight.to_string(), "in_flight");
        assert!(RecordState::Failed.is_claimable());
        assert!(!RecordState::Done.is_claimable());
        assert!(RecordState::Done.is_terminal());
    }
}
