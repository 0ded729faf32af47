//! annowatch library
//!
//! Watches a directory for new text files and runs each one through an
//! annotator, writing the artifact next to the input.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod annotator;
pub mod config;
pub mod error;
pub mod observability;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
