//! Watcher service lifecycle.
//!
//! Owns startup ordering (target, event source, annotator, event loop) and
//! shutdown (close the source, drain in-flight work, report).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::dispatcher::{DispatcherConfig, DrainReport, ProcessingDispatcher, SubmitOutcome};
use super::events::RawEvent;
use super::filter::EventFilter;
use super::records::RecordTable;
use super::scanner::scan_directory_async;
use super::source::{FileSystemEventSource, WatchTarget};
use super::stats::{WatcherStats, WatcherStatsSnapshot};
use crate::annotator::Annotator;
use crate::config::Config;
use crate::error::AnnotationError;
use crate::observability::spans;
use crate::Result;

/// Lifecycle state of a watcher service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Initializing,
    Watching,
    ShuttingDown,
    Stopped,
}

/// Summary returned by `WatcherService::run`.
#[derive(Debug, Clone)]
pub struct ServiceReport {
    /// Outcome of draining in-flight work.
    pub drain: DrainReport,
    /// Final counters.
    pub stats: WatcherStatsSnapshot,
}

/// Cloneable view of a running service.
#[derive(Clone)]
pub struct ServiceHandle {
    watch_dir: PathBuf,
    dispatcher: Arc<ProcessingDispatcher>,
    state_rx: watch::Receiver<ServiceState>,
    injector: Option<mpsc::Sender<RawEvent>>,
}

impl ServiceHandle {
    /// Canonical watch directory.
    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    /// Wait until the service reaches `state`.
    ///
    /// Returns false if the service went away first.
    pub async fn wait_for_state(&mut self, state: ServiceState) -> bool {
        self.state_rx.wait_for(|s| *s == state).await.is_ok()
    }

    /// Processing records.
    #[must_use]
    pub fn records(&self) -> Arc<RecordTable> {
        self.dispatcher.records()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.dispatcher.stats().snapshot()
    }

    /// Retry a failed path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not in the failed state.
    pub fn resubmit(&self, path: &Path) -> Result<u32> {
        self.dispatcher.resubmit(path)
    }

    /// Feed a synthetic event into the event loop.
    ///
    /// Returns false once the event source is closed.
    pub async fn inject(&self, event: RawEvent) -> bool {
        match &self.injector {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

/// One watch directory, its event source, filter and dispatcher.
pub struct WatcherService {
    config: Config,
    source: FileSystemEventSource,
    filter: EventFilter,
    dispatcher: Arc<ProcessingDispatcher>,
    stats: Arc<WatcherStats>,
    state_tx: watch::Sender<ServiceState>,
}

impl WatcherService {
    /// Build the service: validate config, register the watch, then build
    /// the annotator with `build_annotator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the directory
    /// cannot be watched, or the annotator cannot be built.
    pub fn new<F>(config: Config, build_annotator: F) -> Result<Self>
    where
        F: FnOnce(&Config) -> std::result::Result<Arc<dyn Annotator>, AnnotationError>,
    {
        let (state_tx, _) = watch::channel(ServiceState::Initializing);
        config.validate()?;

        let target = WatchTarget::new(&config.watch_dir)?;
        let source = FileSystemEventSource::open(target, config.event_buffer)?;
        let filter = EventFilter::from_config(source.target().dir(), &config)?;

        tracing::info!("Creating annotator...");
        let annotator = build_annotator(&config)?;
        tracing::info!(annotator = annotator.name(), "Annotator ready");

        let stats = WatcherStats::new();
        let dispatcher = Arc::new(ProcessingDispatcher::new(
            &DispatcherConfig::from(&config),
            annotator,
            Arc::clone(&stats),
        ));

        Ok(Self {
            config,
            source,
            filter,
            dispatcher,
            stats,
            state_tx,
        })
    }

    /// A handle for observing and poking the service.
    #[must_use]
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            watch_dir: self.source.target().dir().to_path_buf(),
            dispatcher: Arc::clone(&self.dispatcher),
            state_rx: self.state_tx.subscribe(),
            injector: self.source.injector(),
        }
    }

    /// Run the event loop until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the event source closes without a shutdown
    /// request. In-flight work is still drained first.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ServiceReport> {
        if self.config.scan_on_start {
            self.rescan("startup").await;
        }

        self.set_state(ServiceState::Watching);
        tracing::info!(path = %self.source.target().dir().display(), "Watching for new files");

        let outcome = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested");
                    break Ok(());
                }
                event = self.source.next() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(e) => {
                        tracing::error!(error = %e, "Event source closed unexpectedly");
                        break Err(e);
                    }
                },
            }
        };

        self.set_state(ServiceState::ShuttingDown);
        self.source.close();

        let drain = self.dispatcher.drain(self.config.drain_timeout).await;
        let stats = self.stats.snapshot();
        tracing::info!(
            drained = drain.completed,
            abandoned = drain.abandoned.len(),
            done = drain.counts.done,
            failed = drain.counts.failed,
            events = stats.events_seen,
            overflows = stats.overflows,
            "Watcher stopped"
        );
        self.set_state(ServiceState::Stopped);

        outcome.map(|()| ServiceReport { drain, stats })
    }

    async fn handle_event(&self, event: RawEvent) {
        WatcherStats::bump(&self.stats.events_seen);

        if event.is_overflow() {
            WatcherStats::bump(&self.stats.overflows);
            tracing::warn!("Notification overflow, some events may have been lost");
            if self.config.rescan_on_overflow {
                self.rescan("overflow").await;
            }
            return;
        }

        match self.filter.accept(&event) {
            Some(candidate) => {
                tracing::debug!(
                    path = %candidate.path.display(),
                    kind = ?event.kind,
                    "New input file"
                );
                self.dispatcher.submit(candidate);
            }
            None => WatcherStats::bump(&self.stats.events_filtered),
        }
    }

    /// Feed every current directory entry through the filter and dispatcher.
    async fn rescan(&self, reason: &'static str) {
        WatcherStats::bump(&self.stats.rescans);
        let dir = self.source.target().dir();

        async {
            match scan_directory_async(dir).await {
                Ok(events) => {
                    let started = events
                        .iter()
                        .filter_map(|e| self.filter.accept(e))
                        .map(|c| self.dispatcher.submit(c))
                        .filter(|o| matches!(o, SubmitOutcome::Started { .. }))
                        .count();
                    tracing::info!(entries = events.len(), started, "Rescan complete");
                }
                Err(e) => tracing::warn!(error = %e, "Rescan failed"),
            }
        }
        .instrument(spans::scan_span(reason))
        .await;
    }

    fn set_state(&self, state: ServiceState) {
        self.state_tx.send_replace(state);
        tracing::debug!(?state, "Service state changed");
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
