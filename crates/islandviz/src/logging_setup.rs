//! Subscriber setup for the demo binary
//!
//! stdout carries the bar display, so console logs go to stderr. Capture runs
//! on the `islandviz-capture` thread; thread names are printed so its lines
//! can be told apart from the render loop.

use anyhow::{Context, Result};
use islandviz_core::LogConfig;
use std::fs::File;
use std::path::PathBuf;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Keeps the file writer thread alive; logs are flushed when dropped
pub struct LogGuard {
    _writer: WorkerGuard,
    /// File receiving this run's log
    pub path: PathBuf,
}

/// Install the global subscriber described by `config`
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::builder()
        .with_default_directive(config.parse_level().into())
        .from_env_lossy();

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(true)
            .with_filter(filter.clone())
    });

    let (file_layer, guard) = if config.file_output {
        let (writer, guard, removed) = open_log_file(config)?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_names(true)
            .with_filter(filter);
        (Some(layer), Some((guard, removed)))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard.map(|(guard, removed)| {
        tracing::info!("Writing log to {:?}", guard.path);
        if removed > 0 {
            tracing::debug!("Removed {} old log files", removed);
        }
        guard
    }))
}

/// Create this run's log file, pruning old ones first.
///
/// Returns the writer, its guard and how many old files were removed.
fn open_log_file(config: &LogConfig) -> Result<(NonBlocking, LogGuard, usize)> {
    config
        .ensure_log_directory()
        .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;

    // Subscriber is not up yet, so report straight to stderr
    let removed = config.cleanup_old_logs().unwrap_or_else(|e| {
        eprintln!("Warning: could not prune old logs: {e}");
        0
    });

    let path = config.current_log_path();
    let file =
        File::create(&path).with_context(|| format!("Failed to create log file {:?}", path))?;
    let (writer, worker) = tracing_appender::non_blocking(file);

    Ok((
        writer,
        LogGuard {
            _writer: worker,
            path,
        },
        removed,
    ))
}
