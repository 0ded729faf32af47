//! Text annotation capability.
//!
//! This module provides:
//! - The `Annotator` trait invoked once per candidate file
//! - A built-in tokenizing XML annotator
//! - An annotator that pipes text through an external command

mod command;
mod xml;

pub use command::CommandAnnotator;
pub use xml::XmlAnnotator;

use std::sync::Arc;

use crate::config::Config;
use crate::error::AnnotationError;

/// Output produced by an annotator for one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Rendered artifact body, written verbatim to disk.
    pub body: String,
    /// Number of tokens found, if the annotator counts them.
    pub tokens: Option<usize>,
    /// Number of sentences found, if the annotator counts them.
    pub sentences: Option<usize>,
}

impl Artifact {
    /// Create an artifact with no token or sentence counts.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            tokens: None,
            sentences: None,
        }
    }
}

/// A text-processing step applied to each new input file.
///
/// Implementations may be slow; the dispatcher runs them on the blocking
/// thread pool.
pub trait Annotator: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Annotate `text` and return the artifact to persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be annotated.
    fn process(&self, text: &str) -> Result<Artifact, AnnotationError>;

    /// Abort any `process` calls still running.
    ///
    /// Called when in-flight files are abandoned at shutdown. Interrupted
    /// calls return an error.
    fn cancel(&self) {}
}

/// Build the annotator selected by `config`.
///
/// # Errors
///
/// Returns an error if the configured annotator cannot be constructed.
pub fn from_config(config: &Config) -> Result<Arc<dyn Annotator>, AnnotationError> {
    if config.annotator_command.is_empty() {
        return Ok(Arc::new(XmlAnnotator::new()));
    }

    let (program, args) = config
        .annotator_command
        .split_first()
        .ok_or_else(|| AnnotationError::Init("empty annotator command".to_string()))?;
    Ok(Arc::new(CommandAnnotator::new(program, args)?))
}
