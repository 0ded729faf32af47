//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - Configurable log levels, overridable with `RUST_LOG`
//! - Spans attributing log lines to a file or scan

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Panics
///
/// Panics if tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .with_span_list(false);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Spans used by the watch loop and processing tasks.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    /// Span for one processing attempt of one input file.
    #[must_use]
    pub fn file_span(path: &Path, attempt: u32) -> Span {
        info_span!(
            "file",
            path = %path.display(),
            attempt,
        )
    }

    /// Span for a directory rescan.
    #[must_use]
    pub fn scan_span(reason: &'static str) -> Span {
        info_span!("rescan", reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_file_span() {
        let span = spans::file_span(Path::new("/inbox/a.txt"), 1);
        let _guard = span.enter();
    }

    #[test]
    fn test_scan_span() {
        let span = spans::scan_span("overflow");
        let _guard = span.enter();
    }
}
