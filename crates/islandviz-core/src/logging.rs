//! Logging configuration
//!
//! The core crate only describes where and how verbosely to log; the host
//! binary turns this into a `tracing` subscriber.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;

/// Log file name prefix
const LOG_FILE_PREFIX: &str = "islandviz_";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level (trace, debug, info, warn, error)
    pub level: String,
    /// Write logs to stderr
    pub console_output: bool,
    /// Write logs to a file in `log_dir`
    pub file_output: bool,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Number of log files kept when cleaning up
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from("logs"),
            max_log_files: 10,
        }
    }
}

impl LogConfig {
    /// Parse the configured level, defaulting to INFO
    pub fn parse_level(&self) -> Level {
        self.level.parse().unwrap_or(Level::INFO)
    }

    /// Create the log directory if needed
    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)
    }

    /// Path of the log file for a session starting now
    pub fn current_log_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        self.log_dir.join(format!("{LOG_FILE_PREFIX}{stamp}.log"))
    }

    /// Delete the oldest log files beyond `max_log_files`
    ///
    /// Returns the number of files removed.
    pub fn cleanup_old_logs(&self) -> std::io::Result<usize> {
        if !self.log_dir.exists() {
            return Ok(0);
        }

        let mut logs: Vec<PathBuf> = std::fs::read_dir(&self.log_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX) && n.ends_with(".log"))
            })
            .collect();

        if logs.len() <= self.max_log_files {
            return Ok(0);
        }

        // Timestamped names sort chronologically
        logs.sort();
        let excess = logs.len() - self.max_log_files;
        let mut removed = 0;
        for path in logs.into_iter().take(excess) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
        Ok(removed)
    }
}
