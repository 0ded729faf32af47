//! Configuration management for annowatch.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - Built-in defaults

mod settings;

pub use settings::{artifact_path, Config, DEFAULT_INPUT_EXTENSION, DEFAULT_OUTPUT_SUFFIX};
