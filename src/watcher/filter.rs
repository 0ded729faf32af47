//! Event filtering: which raw events denote a new input file.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use super::events::{CandidateFile, RawEvent};
use crate::config::Config;
use crate::Result;

/// Decides whether a raw event is a candidate for processing.
#[derive(Debug)]
pub struct EventFilter {
    dir: PathBuf,
    extension: String,
    output_suffix: String,
    ignore: Option<Gitignore>,
}

impl EventFilter {
    /// Create a filter for files in `dir` with the given input extension.
    ///
    /// `extension` is matched case-insensitively; a leading dot is optional.
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: &str,
        output_suffix: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_lowercase(),
            output_suffix: output_suffix.into(),
            ignore: None,
        }
    }

    /// Create a filter from daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an ignore pattern is invalid.
    pub fn from_config(dir: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let patterns: Vec<&str> = config.ignore_patterns.iter().map(String::as_str).collect();
        let filter = Self::new(dir, &config.input_extension, config.output_suffix.clone());
        if patterns.is_empty() {
            Ok(filter)
        } else {
            filter.with_patterns(&patterns)
        }
    }

    /// Add gitignore-style patterns for names that are never processed.
    ///
    /// # Errors
    ///
    /// Returns an error if patterns are invalid.
    pub fn with_patterns(mut self, patterns: &[&str]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(&self.dir);

        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| crate::Error::config(format!("invalid ignore pattern: {e}")))?;
        }

        let gitignore = builder
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build ignore set: {e}")))?;

        self.ignore = Some(gitignore);
        Ok(self)
    }

    /// Accept `event` as a candidate, or reject it.
    #[must_use]
    pub fn accept(&self, event: &RawEvent) -> Option<CandidateFile> {
        if event.is_overflow() {
            return None;
        }

        let name = event.name.as_path();
        if !is_plain_name(name) {
            return None;
        }

        if !self.matches_name(name) {
            tracing::trace!(name = %name.display(), "Ignoring non-input name");
            return None;
        }

        let path = self.dir.join(name);
        if !is_readable_file(&path) {
            tracing::debug!(path = %path.display(), "Ignoring entry that is not a readable file");
            return None;
        }

        Some(CandidateFile::new(path))
    }

    /// Name-only checks: extension, own artifacts, ignore patterns, scratch files.
    #[must_use]
    pub fn matches_name(&self, name: &Path) -> bool {
        if !self.has_input_extension(name) {
            return false;
        }

        let Some(file_name) = name.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if file_name.ends_with(&self.output_suffix) {
            return false;
        }

        if is_scratch_file(file_name) {
            return false;
        }

        if let Some(ref gi) = self.ignore {
            if gi.matched(name, false).is_ignore() {
                return false;
            }
        }

        true
    }

    /// Check the lowercase extension against the configured one.
    #[must_use]
    pub fn has_input_extension(&self, name: &Path) -> bool {
        name.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.to_lowercase() == self.extension)
    }

    /// Directory the filter resolves names against.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_plain_name(name: &Path) -> bool {
    let mut components = name.components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Hidden files and editor lock/backup files.
fn is_scratch_file(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~') || name.starts_with("~$")
}

/// Advisory check; the file may still vanish before it is read.
fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn filter(dir: &Path) -> EventFilter {
        EventFilter::new(dir, "txt", ".xml")
    }

    #[test]
    fn test_accepts_matching_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "Hello").unwrap();

        let candidate = filter(tmp.path())
            .accept(&RawEvent::created("a.txt"))
            .unwrap();
        assert_eq!(candidate.path, tmp.path().join("a.txt"));
    }

    #[test]
    fn test_modified_events_are_accepted_too() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "Hello").unwrap();
        assert!(filter(tmp.path()).accept(&RawEvent::modified("a.txt")).is_some());
    }

    #[test]
    fn test_rejects_overflow() {
        let tmp = TempDir::new().unwrap();
        assert!(filter(tmp.path()).accept(&RawEvent::overflow()).is_none());
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("REPORT.TXT"), "Hello").unwrap();
        assert!(filter(tmp.path()).accept(&RawEvent::created("REPORT.TXT")).is_some());

        let dotted = EventFilter::new(tmp.path(), ".Txt", ".xml");
        assert!(dotted.accept(&RawEvent::created("REPORT.TXT")).is_some());
    }

    #[test]
    fn test_rejects_other_extensions() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("image.png"), [0u8; 8]).unwrap();
        fs::write(tmp.path().join("a.txt.xml"), "<root/>").unwrap();

        let f = filter(tmp.path());
        assert!(f.accept(&RawEvent::created("image.png")).is_none());
        assert!(f.accept(&RawEvent::created("a.txt.xml")).is_none());
    }

    #[test]
    fn test_rejects_own_artifacts_when_suffix_matches_extension() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt.out.txt"), "x").unwrap();

        let f = EventFilter::new(tmp.path(), "txt", ".out.txt");
        assert!(f.accept(&RawEvent::created("a.txt.out.txt")).is_none());
    }

    #[test]
    fn test_rejects_missing_and_directory_entries() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("folder.txt")).unwrap();

        let f = filter(tmp.path());
        assert!(f.accept(&RawEvent::created("gone.txt")).is_none());
        assert!(f.accept(&RawEvent::created("folder.txt")).is_none());
    }

    #[test]
    fn test_rejects_nested_names() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("a.txt"), "x").unwrap();

        assert!(filter(tmp.path()).accept(&RawEvent::created("sub/a.txt")).is_none());
        assert!(filter(tmp.path()).accept(&RawEvent::created("../a.txt")).is_none());
    }

    #[test]
    fn test_rejects_scratch_files() {
        let f = filter(Path::new("/inbox"));
        assert!(!f.matches_name(Path::new(".hidden.txt")));
        assert!(!f.matches_name(Path::new("notes.txt~")));
        assert!(!f.matches_name(Path::new("~$draft.txt")));
        assert!(f.matches_name(Path::new("notes.txt")));
    }

    #[test]
    fn test_ignore_patterns() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("draft-1.txt"), "x").unwrap();
        fs::write(tmp.path().join("final.txt"), "x").unwrap();

        let f = filter(tmp.path()).with_patterns(&["draft-*"]).unwrap();
        assert!(f.accept(&RawEvent::created("draft-1.txt")).is_none());
        assert!(f.accept(&RawEvent::created("final.txt")).is_some());
    }

    #[test]
    fn test_from_config() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            input_extension: "md".to_string(),
            ignore_patterns: vec!["skip*".to_string()],
            ..Config::new(tmp.path())
        };
        let f = EventFilter::from_config(tmp.path(), &config).unwrap();
        assert!(f.matches_name(Path::new("notes.md")));
        assert!(!f.matches_name(Path::new("skip.md")));
        assert!(!f.matches_name(Path::new("notes.txt")));
    }
}
