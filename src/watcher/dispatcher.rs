//! Candidate dispatch and per-file processing.
//!
//! Each claimed candidate runs on its own task: wait for a worker permit,
//! optionally wait for the file size to settle, read, annotate on the
//! blocking pool, write the artifact. Every failure is recorded against the
//! file's record and logged; none escapes to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::events::CandidateFile;
use super::records::{Claim, RecordCounts, RecordState, RecordTable};
use super::stats::WatcherStats;
use crate::annotator::{Annotator, Artifact};
use crate::config::{artifact_path, Config, DEFAULT_OUTPUT_SUFFIX};
use crate::error::WatcherError;
use crate::observability::spans;
use crate::{Error, Result};

/// Upper bound on size checks while waiting for a file to settle.
const MAX_SETTLE_CHECKS: u32 = 40;

/// Reason recorded for work still running when the drain timeout expires.
pub const ABANDONED_REASON: &str = "abandoned at shutdown";

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Suffix appended to input paths for artifacts.
    pub output_suffix: String,
    /// Maximum number of files processed at once.
    pub max_workers: usize,
    /// Size-stability window before reading. Zero disables it.
    pub settle_window: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            max_workers: 4,
            settle_window: Duration::ZERO,
        }
    }
}

impl From<&Config> for DispatcherConfig {
    fn from(config: &Config) -> Self {
        Self {
            output_suffix: config.output_suffix.clone(),
            max_workers: config.max_workers,
            settle_window: config.settle_window,
        }
    }
}

/// What `submit` did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Processing started as attempt `attempt`.
    Started { attempt: u32 },
    /// The path is already in flight or done; nothing was started.
    Duplicate(RecordState),
    /// The dispatcher is draining and accepts no new work.
    Closed,
}

/// Outcome of `drain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Whether every task finished before the timeout.
    pub completed: bool,
    /// Paths that were still in flight at the timeout, now recorded as failed.
    pub abandoned: Vec<PathBuf>,
    /// Record counts after draining.
    pub counts: RecordCounts,
    /// Time spent draining.
    pub elapsed: Duration,
}

struct Shared {
    records: Arc<RecordTable>,
    annotator: Arc<dyn Annotator>,
    permits: Arc<Semaphore>,
    stats: Arc<WatcherStats>,
    output_suffix: String,
    settle_window: Duration,
}

/// Schedules at most one processing run per path.
pub struct ProcessingDispatcher {
    shared: Arc<Shared>,
    tracker: TaskTracker,
}

impl ProcessingDispatcher {
    /// Create a dispatcher using `annotator`.
    #[must_use]
    pub fn new(
        config: &DispatcherConfig,
        annotator: Arc<dyn Annotator>,
        stats: Arc<WatcherStats>,
    ) -> Self {
        let shared = Shared {
            records: Arc::new(RecordTable::new()),
            annotator,
            permits: Arc::new(Semaphore::new(config.max_workers.max(1))),
            stats,
            output_suffix: config.output_suffix.clone(),
            settle_window: config.settle_window,
        };

        Self {
            shared: Arc::new(shared),
            tracker: TaskTracker::new(),
        }
    }

    /// Submit a candidate for processing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, candidate: CandidateFile) -> SubmitOutcome {
        if self.tracker.is_closed() {
            tracing::debug!(
                path = %candidate.path.display(),
                "Dispatcher closed, dropping candidate"
            );
            return SubmitOutcome::Closed;
        }

        match self.shared.records.claim(&candidate.path) {
            Claim::Busy(state) => {
                WatcherStats::bump(&self.shared.stats.duplicates);
                tracing::debug!(
                    path = %candidate.path.display(),
                    %state,
                    "Ignoring duplicate event"
                );
                SubmitOutcome::Duplicate(state)
            }
            Claim::Acquired { attempt } => {
                WatcherStats::bump(&self.shared.stats.started);
                let span = spans::file_span(&candidate.path, attempt);
                let shared = Arc::clone(&self.shared);
                self.tracker
                    .spawn(process(shared, candidate, attempt).instrument(span));
                SubmitOutcome::Started { attempt }
            }
        }
    }

    /// Retry a path whose last attempt failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no record, is not failed, or the
    /// dispatcher is draining.
    pub fn resubmit(&self, path: &Path) -> Result<u32> {
        let refuse = |reason: String| -> Error {
            WatcherError::Resubmit {
                path: path.display().to_string(),
                reason,
            }
            .into()
        };

        match self.shared.records.state(path) {
            None => return Err(refuse("no record for path".to_string())),
            Some(RecordState::Failed) => {}
            Some(state) => return Err(refuse(format!("record is {state}"))),
        }

        tracing::info!(path = %path.display(), "Resubmitting failed file");
        match self.submit(CandidateFile::new(path)) {
            SubmitOutcome::Started { attempt } => Ok(attempt),
            SubmitOutcome::Duplicate(state) => Err(refuse(format!("record is {state}"))),
            SubmitOutcome::Closed => Err(refuse("dispatcher is draining".to_string())),
        }
    }

    /// Stop accepting work and wait up to `timeout` for in-flight files.
    ///
    /// Files still in flight afterwards are recorded as failed.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        let started = Instant::now();
        self.tracker.close();

        let in_flight = self.tracker.len();
        if in_flight > 0 {
            tracing::info!(
                in_flight,
                timeout_ms = timeout.as_millis(),
                "Draining in-flight files"
            );
        }

        let completed = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();

        let abandoned = if completed {
            Vec::new()
        } else {
            self.shared.permits.close();
            let abandoned = self.shared.records.abandon_in_flight(ABANDONED_REASON);
            self.shared.annotator.cancel();
            for path in &abandoned {
                WatcherStats::bump(&self.shared.stats.failed);
                tracing::warn!(path = %path.display(), "Abandoned in-flight file at shutdown");
            }
            abandoned
        };

        DrainReport {
            completed,
            abandoned,
            counts: self.shared.records.counts(),
            elapsed: started.elapsed(),
        }
    }

    /// Number of processing tasks not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Whether `drain` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// The record table.
    #[must_use]
    pub fn records(&self) -> Arc<RecordTable> {
        Arc::clone(&self.shared.records)
    }

    /// The shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.shared.stats)
    }
}

async fn process(shared: Arc<Shared>, candidate: CandidateFile, attempt: u32) {
    let CandidateFile {
        path,
        discovered_at,
    } = candidate;

    let Ok(_permit) = Arc::clone(&shared.permits).acquire_owned().await else {
        if shared.records.fail(&path, attempt, "worker pool closed") {
            WatcherStats::bump(&shared.stats.failed);
        }
        return;
    };

    let started = Instant::now();
    match run(&shared, &path).await {
        Ok((out, artifact)) => {
            if shared.records.complete(&path, attempt) {
                WatcherStats::bump(&shared.stats.completed);
                tracing::info!(
                    artifact = %out.display(),
                    tokens = ?artifact.tokens,
                    sentences = ?artifact.sentences,
                    elapsed_ms = started.elapsed().as_millis(),
                    since_discovery_ms = (Utc::now() - discovered_at).num_milliseconds(),
                    "Annotated file"
                );
            } else {
                // The record was abandoned while this attempt ran.
                if let Err(e) = tokio::fs::remove_file(&out).await {
                    tracing::warn!(
                        artifact = %out.display(),
                        error = %e,
                        "Failed to remove late artifact"
                    );
                }
                tracing::warn!(
                    artifact = %out.display(),
                    "Discarded artifact finished after the record was abandoned"
                );
            }
        }
        Err(e) => {
            if shared.records.fail(&path, attempt, e.to_string()) {
                WatcherStats::bump(&shared.stats.failed);
            }
            tracing::error!(error = %e, "Processing failed");
        }
    }
}

/// Read, annotate and write one file.
async fn run(shared: &Shared, path: &Path) -> Result<(PathBuf, Artifact)> {
    if !shared.settle_window.is_zero() {
        wait_until_settled(path, shared.settle_window).await?;
    }

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| read_error(path, &e))?;
    tracing::debug!(chars = text.chars().count(), "Read input");

    let annotator = Arc::clone(&shared.annotator);
    let artifact = tokio::task::spawn_blocking(move || annotator.process(&text))
        .await
        .map_err(|e| Error::internal(format!("annotator task failed: {e}")))??;

    let out = artifact_path(path, &shared.output_suffix);
    tokio::fs::write(&out, artifact.body.as_bytes())
        .await
        .map_err(|e| WatcherError::Write {
            path: out.display().to_string(),
            reason: e.to_string(),
        })?;

    Ok((out, artifact))
}

/// Wait until the file size is unchanged across one `window`.
async fn wait_until_settled(path: &Path, window: Duration) -> Result<()> {
    let mut last = file_len(path).await?;
    for _ in 0..MAX_SETTLE_CHECKS {
        tokio::time::sleep(window).await;
        let current = file_len(path).await?;
        if current == last {
            return Ok(());
        }
        last = current;
    }
    tracing::warn!(size = last, "File still growing, reading anyway");
    Ok(())
}

async fn file_len(path: &Path) -> Result<u64> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| read_error(path, &e))
}

fn read_error(path: &Path, e: &std::io::Error) -> Error {
    WatcherError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
    .into()
}
