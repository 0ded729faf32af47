//! Directory scanner for existing files and overflow recovery.
//!
//! Lists the direct children of the watch directory as synthetic creation
//! events, so files whose notifications were lost still reach the filter.

use std::path::Path;

use walkdir::WalkDir;

use super::events::RawEvent;
use crate::Result;

/// List direct children of `dir` as creation events.
///
/// Unreadable entries are logged and skipped.
///
/// # Errors
///
/// Returns an error if the directory itself cannot be read.
pub fn scan_directory(dir: &Path) -> Result<Vec<RawEvent>> {
    std::fs::read_dir(dir)?;

    let mut events = Vec::new();
    let mut errors = 0u64;

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_dir() {
                    continue;
                }
                events.push(RawEvent::created(entry.file_name()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error reading directory entry");
                errors += 1;
            }
        }
    }

    tracing::debug!(
        path = %dir.display(),
        entries = events.len(),
        errors,
        "Directory scan complete"
    );

    Ok(events)
}

/// Async version of directory scan.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or the scan task fails.
pub async fn scan_directory_async(dir: &Path) -> Result<Vec<RawEvent>> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || scan_directory(&dir))
        .await
        .map_err(|e| crate::Error::internal(format!("Scan task failed: {e}")))?
}
