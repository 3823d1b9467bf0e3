//! Shared logging utilities for the dbsync binaries.
//!
//! Provides consistent logging configuration across the agent and the
//! Inspector, including the "logging off" and "log to file" switches.

use crate::Result;
use std::path::PathBuf;

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    /// Human-readable output on stderr
    #[default]
    Stderr,
    /// Append to a log file
    File(PathBuf),
    /// No subscriber is installed
    Disabled,
}

impl LogTarget {
    /// Builds the target from the `enabled` switch and an optional file path.
    pub fn from_settings(enabled: bool, file: Option<PathBuf>) -> Self {
        match (enabled, file) {
            (false, _) => Self::Disabled,
            (true, Some(path)) => Self::File(path),
            (true, None) => Self::Stderr,
        }
    }
}

/// Maps verbosity flags to a tracing level.
///
/// `quiet` wins over any verbosity; 0=INFO, 1=DEBUG, 2+=TRACE.
pub fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
/// * `target` - Output destination
///
/// # Example
/// ```rust,no_run
/// use dbsync_core::logging::{LogTarget, init_logging};
///
/// init_logging(1, false, LogTarget::Stderr).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool, target: LogTarget) -> Result<()> {
    let level = level_for(verbose, quiet);

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match target {
        LogTarget::Disabled => return Ok(()),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| {
                    crate::error::DbSyncError::io(
                        format!("Failed to open log file {}", path.display()),
                        e,
                    )
                })?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
    };

    result.map_err(|e| {
        crate::error::DbSyncError::configuration(format!("Failed to initialize logging: {}", e))
    })
}
