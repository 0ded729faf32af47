//! Directory watching and dispatch.
//!
//! This module provides:
//! - A non-recursive directory event source using notify-rs
//! - Filtering of raw events into candidate input files
//! - Per-path deduplicated dispatch to the annotator
//! - The watcher service that owns startup and shutdown

mod dispatcher;
mod events;
mod filter;
mod records;
mod scanner;
mod service;
mod source;
mod stats;

pub use dispatcher::{
    DispatcherConfig, DrainReport, ProcessingDispatcher, SubmitOutcome, ABANDONED_REASON,
};
pub use events::{CandidateFile, EventKind, RawEvent};
pub use filter::EventFilter;
pub use records::{Claim, ProcessingRecord, RecordCounts, RecordState, RecordTable};
pub use scanner::{scan_directory, scan_directory_async};
pub use service::{shutdown_signal, ServiceHandle, ServiceReport, ServiceState, WatcherService};
pub use source::{FileSystemEventSource, WatchTarget};
pub use stats::{WatcherStats, WatcherStatsSnapshot};
