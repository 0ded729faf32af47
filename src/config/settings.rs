//! Configuration settings and validation.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default input extension (matched case-insensitively).
pub const DEFAULT_INPUT_EXTENSION: &str = "txt";

/// Default suffix appended to an input path to name its artifact.
pub const DEFAULT_OUTPUT_SUFFIX: &str = ".xml";

/// Main configuration for the watcher daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory to watch (non-recursively).
    pub watch_dir: PathBuf,

    /// Input file extension, without the leading dot.
    pub input_extension: String,

    /// Suffix appended to the input path to form the artifact path.
    pub output_suffix: String,

    /// Maximum number of files processed concurrently.
    pub max_workers: usize,

    /// Capacity of the channel between the OS watcher and the event loop.
    pub event_buffer: usize,

    /// How long shutdown waits for in-flight files.
    pub drain_timeout: Duration,

    /// Size-stability window before reading a file. Zero disables it.
    pub settle_window: Duration,

    /// Rescan the directory after an overflow notification.
    pub rescan_on_overflow: bool,

    /// Process files already present when the daemon starts.
    pub scan_on_start: bool,

    /// Extra gitignore-style patterns for names that are never processed.
    pub ignore_patterns: Vec<String>,

    /// External annotator command line. Empty selects the built-in XML annotator.
    pub annotator_command: Vec<String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("."),
            input_extension: DEFAULT_INPUT_EXTENSION.to_string(),
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(4),
            event_buffer: 1024,
            drain_timeout: Duration::from_secs(30),
            settle_window: Duration::ZERO,
            rescan_on_overflow: true,
            scan_on_start: false,
            ignore_patterns: Vec::new(),
            annotator_command: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create a configuration for `watch_dir` with defaults for everything else.
    #[must_use]
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            ..Self::default()
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.watch_dir.as_os_str().is_empty() {
            return Err(Error::config("watch directory cannot be empty"));
        }

        let ext = self.normalized_extension();
        if ext.is_empty() {
            return Err(Error::config("input extension cannot be empty"));
        }
        if ext.contains(std::path::is_separator) {
            return Err(Error::config(format!(
                "input extension '{}' cannot contain a path separator",
                self.input_extension
            )));
        }
        if ext.contains('.') {
            return Err(Error::config(format!(
                "input extension '{}' must be a single extension without inner dots",
                self.input_extension
            )));
        }

        if self.output_suffix.is_empty() {
            return Err(Error::config("output suffix cannot be empty"));
        }
        if self.output_suffix.contains(std::path::is_separator) {
            return Err(Error::config(format!(
                "output suffix '{}' cannot contain a path separator",
                self.output_suffix
            )));
        }

        if self.max_workers == 0 {
            return Err(Error::config("max_workers cannot be 0"));
        }
        if self.max_workers > 64 {
            return Err(Error::config("max_workers cannot exceed 64"));
        }

        if self.event_buffer == 0 {
            return Err(Error::config("event_buffer cannot be 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Input extension in lowercase with any leading dot removed.
    #[must_use]
    pub fn normalized_extension(&self) -> String {
        self.input_extension
            .trim_start_matches('.')
            .to_lowercase()
    }

    /// Artifact path for an input file.
    #[must_use]
    pub fn artifact_path(&self, input: &Path) -> PathBuf {
        artifact_path(input, &self.output_suffix)
    }
}

/// Append `suffix` to the file name of `input`.
#[must_use]
pub fn artifact_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
