//! Error types and Result aliases for annowatch.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using annowatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for annowatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching or per-file processing error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Annotator construction or invocation error.
    #[error("annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// File watcher and dispatcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The watch directory is missing or cannot be registered.
    #[error("cannot watch directory '{path}': {reason}")]
    DirectoryUnwatchable { path: String, reason: String },

    /// The event source was closed.
    #[error("event source closed")]
    SourceClosed,

    /// The watch directory was removed or moved away.
    #[error("watch directory '{path}' is gone")]
    DirectoryLost { path: String },

    /// Input file could not be read.
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Artifact could not be written.
    #[error("failed to write '{path}': {reason}")]
    Write { path: String, reason: String },

    /// Administrative resubmit was refused.
    #[error("cannot resubmit '{path}': {reason}")]
    Resubmit { path: String, reason: String },
}

/// Annotator errors.
#[derive(Error, Debug)]
pub enum AnnotationError {
    /// The annotator could not be constructed.
    #[error("failed to initialize annotator: {0}")]
    Init(String),

    /// The annotator failed on a particular input.
    #[error("annotation failed: {0}")]
    Process(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl WatcherError {
    /// Create a directory-unwatchable error.
    pub fn unwatchable(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::DirectoryUnwatchable {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests;
