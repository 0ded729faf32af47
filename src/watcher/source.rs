//! Directory event source using notify-rs.

use std::path::{Component, Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::events::{EventKind, RawEvent};
use crate::error::WatcherError;
use crate::Result;

/// The directory being watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    dir: PathBuf,
}

impl WatchTarget {
    /// Resolve and validate a watch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist or is not a directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dir = path
            .canonicalize()
            .map_err(|e| WatcherError::unwatchable(path, e.to_string()))?;

        if !dir.is_dir() {
            return Err(WatcherError::unwatchable(path, "not a directory").into());
        }

        Ok(Self { dir })
    }

    /// Canonical path of the directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Message from the notify callback thread.
#[derive(Debug)]
enum Notice {
    Event(RawEvent),
    DirectoryLost,
}

/// Non-recursive stream of raw events for one directory.
///
/// OS notifications and injected events arrive on separate channels. Only
/// the OS channel decides whether the source is still alive.
pub struct FileSystemEventSource {
    target: WatchTarget,
    watcher: Option<RecommendedWatcher>,
    notice_rx: mpsc::Receiver<Notice>,
    inject_tx: Option<mpsc::Sender<RawEvent>>,
    inject_rx: mpsc::Receiver<RawEvent>,
    closed: bool,
}

impl FileSystemEventSource {
    /// Start watching `target`.
    ///
    /// `buffer` bounds the number of events queued between the OS watcher
    /// thread and the consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS watcher cannot be created or registered.
    pub fn open(target: WatchTarget, buffer: usize) -> Result<Self> {
        let (notice_tx, notice_rx) = mpsc::channel(buffer.max(1));
        let (inject_tx, inject_rx) = mpsc::channel(buffer.max(1));
        let dir = target.dir().to_path_buf();

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| {
                let notices = match result {
                    Ok(event) if is_directory_lost(&dir, &event) => vec![Notice::DirectoryLost],
                    Ok(event) => translate(&dir, &event)
                        .into_iter()
                        .map(Notice::Event)
                        .collect(),
                    Err(e) => {
                        tracing::error!(error = %e, "Watch error, treating as overflow");
                        vec![Notice::Event(RawEvent::overflow())]
                    }
                };
                for notice in notices {
                    if notice_tx.blocking_send(notice).is_err() {
                        return;
                    }
                }
            },
        )
        .map_err(|e| WatcherError::unwatchable(target.dir(), e.to_string()))?;

        watcher
            .watch(target.dir(), RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::unwatchable(target.dir(), e.to_string()))?;

        tracing::info!(path = %target.dir().display(), "Watching directory");

        Ok(Self {
            target,
            watcher: Some(watcher),
            notice_rx,
            inject_tx: Some(inject_tx),
            inject_rx,
            closed: false,
        })
    }

    /// Wait for the next event.
    ///
    /// Cancel-safe: dropping the future loses no events.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryLost` when the watch directory disappears, and
    /// `SourceClosed` once the source has been closed or the watcher has
    /// gone away.
    pub async fn next(&mut self) -> Result<RawEvent> {
        if self.closed {
            return Err(WatcherError::SourceClosed.into());
        }

        let notice = tokio::select! {
            biased;
            notice = self.notice_rx.recv() => notice,
            Some(event) = self.inject_rx.recv() => Some(Notice::Event(event)),
        };

        match notice {
            Some(Notice::Event(event)) => Ok(event),
            Some(Notice::DirectoryLost) => {
                tracing::error!(path = %self.target.dir().display(), "Watch directory is gone");
                self.close();
                Err(WatcherError::DirectoryLost {
                    path: self.target.dir().display().to_string(),
                }
                .into())
            }
            None => {
                self.close();
                Err(WatcherError::SourceClosed.into())
            }
        }
    }

    /// Stop watching. Buffered and later events are discarded.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.watcher = None;
        self.inject_tx = None;
        self.notice_rx.close();
        self.inject_rx.close();
        tracing::info!(path = %self.target.dir().display(), "Event source closed");
    }

    /// Whether `close` has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sender that feeds synthetic events into this source.
    ///
    /// Returns `None` after the source is closed. Holding a sender does not
    /// keep the source alive.
    #[must_use]
    pub fn injector(&self) -> Option<mpsc::Sender<RawEvent>> {
        self.inject_tx.clone()
    }

    /// The watched directory.
    #[must_use]
    pub const fn target(&self) -> &WatchTarget {
        &self.target
    }
}

/// Whether `event` reports that `dir` itself was removed or moved away.
fn is_directory_lost(dir: &Path, event: &notify::Event) -> bool {
    let about_dir = event.paths.iter().any(|p| p == dir);
    let removal = matches!(
        event.kind,
        notify::EventKind::Remove(_) | notify::EventKind::Modify(ModifyKind::Name(_))
    );
    about_dir && removal && !dir.is_dir()
}

/// Map a notify event to raw events for direct children of `dir`.
fn translate(dir: &Path, event: &notify::Event) -> Vec<RawEvent> {
    if event.need_rescan() {
        return vec![RawEvent::overflow()];
    }

    let (kind, paths) = match event.kind {
        notify::EventKind::Create(_)
        | notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            (EventKind::Created, event.paths.as_slice())
        }
        // Paths are [from, to]; only the destination is new.
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            (EventKind::Created, event.paths.get(1..).unwrap_or(&[]))
        }
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => return Vec::new(),
        notify::EventKind::Modify(_) => (EventKind::Modified, event.paths.as_slice()),
        _ => return Vec::new(),
    };

    paths
        .iter()
        .filter_map(|p| direct_child(dir, p))
        .map(|name| RawEvent { kind, name })
        .collect()
}

/// Name of `path` relative to `dir` if it is an immediate child.
fn direct_child(dir: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(dir).ok()?;
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Some(PathBuf::from(name)),
        _ => None,
    }
}
