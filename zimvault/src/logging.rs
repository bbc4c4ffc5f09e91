//! Logging setup for backup runs.
//!
//! Every event goes to stdout and, when a log file is configured, is also
//! appended to that file without ANSI colors. The file writer is
//! non-blocking; keep the returned [`LoggingGuard`] alive until the process
//! exits so buffered lines are flushed.
//!
//! `RUST_LOG` overrides the configured level, e.g.
//! `RUST_LOG=zimvault=debug,reqwest=warn`.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::{FormatTime, LocalTime};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// Errors initializing logging.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    #[error("failed to open log file {}: {source}", path.display())]
    File { path: PathBuf, source: io::Error },

    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Keeps the background log writer alive.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file", &self._file.is_some())
            .finish()
    }
}

fn timer() -> impl FormatTime {
    LocalTime::new(time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
}

/// Build the level filter; an explicit `RUST_LOG` value wins over `level`.
pub fn build_filter(level: &str, env_override: Option<&str>) -> Result<EnvFilter, LogError> {
    let directives = env_override.filter(|v| !v.trim().is_empty()).unwrap_or(level);
    EnvFilter::try_new(directives).map_err(|e| LogError::InvalidLevel {
        level: directives.to_string(),
        reason: e.to_string(),
    })
}

/// Open `path` for appending, creating parent directories as needed.
pub fn open_log_file(path: &Path) -> Result<fs::File, LogError> {
    let file_err = |source| LogError::File {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(file_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(file_err)
}

/// Install the global subscriber.
///
/// Call once at startup, before any component logs.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard, LogError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&config.level, rust_log.as_deref())?;

    let stdout_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_timer(timer());

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let file = open_log_file(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(timer());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LogError::Install(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}
