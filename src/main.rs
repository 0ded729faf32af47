//! annowatch - annotate new text files as they land in a directory
//!
//! Entry point for the watcher daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use annowatch::observability::init_tracing;
use annowatch::watcher::{shutdown_signal, WatcherService};
use annowatch::{annotator, Config};

/// How long runtime shutdown waits for abandoned blocking work.
const BLOCKING_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Watch a directory and annotate each new text file.
#[derive(Parser, Debug)]
#[command(name = "annowatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to watch
    #[arg(env = "ANNOWATCH_DIR")]
    dir: std::path::PathBuf,

    /// Input file extension (case-insensitive)
    #[arg(long, env = "ANNOWATCH_EXTENSION", default_value = "txt")]
    extension: String,

    /// Suffix appended to the input path for the output artifact
    #[arg(long, env = "ANNOWATCH_SUFFIX", default_value = ".xml")]
    suffix: String,

    /// Maximum number of files processed concurrently
    #[arg(short, long, env = "ANNOWATCH_WORKERS")]
    workers: Option<usize>,

    /// Capacity of the OS event queue
    #[arg(long, default_value = "1024")]
    event_buffer: usize,

    /// Seconds to wait for in-flight files at shutdown
    #[arg(long, default_value = "30")]
    drain_timeout_secs: u64,

    /// Wait until a file's size is stable for this many milliseconds before reading
    #[arg(long, env = "ANNOWATCH_SETTLE_MS", default_value = "0")]
    settle_ms: u64,

    /// Do not rescan the directory after an overflow notification
    #[arg(long)]
    no_rescan: bool,

    /// Process files already present at startup
    #[arg(long)]
    scan_existing: bool,

    /// Gitignore-style patterns for names to skip
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ANNOWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "ANNOWATCH_LOG_JSON")]
    log_json: bool,

    /// External annotator command, given after `--`
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("annowatch v{} starting...", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(run(cli));

    // Dropping the runtime would wait for every blocking annotator call.
    runtime.shutdown_timeout(BLOCKING_SHUTDOWN_GRACE);

    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let defaults = Config::default();
    let config = Config {
        watch_dir: cli.dir,
        input_extension: cli.extension,
        output_suffix: cli.suffix,
        max_workers: cli.workers.unwrap_or(defaults.max_workers),
        event_buffer: cli.event_buffer,
        drain_timeout: Duration::from_secs(cli.drain_timeout_secs),
        settle_window: Duration::from_millis(cli.settle_ms),
        rescan_on_overflow: !cli.no_rescan,
        scan_on_start: cli.scan_existing,
        ignore_patterns: cli.ignore,
        annotator_command: cli.command,
        log_level: cli.log_level,
    };

    tracing::debug!(?config, "Configuration loaded");

    let service = WatcherService::new(config, annotator::from_config)
        .context("failed to start watcher")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let report = service.run(shutdown).await.context("watcher failed")?;

    if !report.drain.abandoned.is_empty() {
        tracing::warn!(
            abandoned = report.drain.abandoned.len(),
            "Some files were still in flight at shutdown"
        );
    }
    tracing::info!(
        done = report.drain.counts.done,
        failed = report.drain.counts.failed,
        "Shut down cleanly"
    );

    Ok(())
}
