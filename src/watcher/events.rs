//! File system event types.

#![allow(clippy::missing_const_for_fn)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Kind of raw change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An entry appeared in the directory (created or moved in).
    Created,
    /// An entry's content or metadata changed.
    Modified,
    /// The OS dropped notifications; the directory state is uncertain.
    Overflow,
}

/// A change notification for one entry of the watch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// What happened.
    pub kind: EventKind,
    /// Entry name relative to the watch directory. Empty for overflow.
    pub name: PathBuf,
}

impl RawEvent {
    /// A creation event for `name`.
    pub fn created(name: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Created,
            name: name.into(),
        }
    }

    /// A modification event for `name`.
    pub fn modified(name: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Modified,
            name: name.into(),
        }
    }

    /// An overflow notification.
    #[must_use]
    pub fn overflow() -> Self {
        Self {
            kind: EventKind::Overflow,
            name: PathBuf::new(),
        }
    }

    /// Whether this event signals dropped notifications.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        self.kind == EventKind::Overflow
    }
}

/// A file accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute path of the input file.
    pub path: PathBuf,
    /// When the filter accepted the event.
    pub discovered_at: DateTime<Utc>,
}

impl CandidateFile {
    /// A candidate discovered now.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            discovered_at: Utc::now(),
        }
    }

    /// Path of the input file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
