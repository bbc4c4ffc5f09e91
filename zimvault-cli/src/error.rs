//! CLI error type and exit codes.

use std::fmt;

use zimvault::config::ConfigError;
use zimvault::lock::LockError;
use zimvault::logging::LogError;
use zimvault::orchestrator::RunError;

/// Exit code for a run aborted by an acquisition failure or I/O error.
pub const EXIT_FAILURE: u8 = 1;

/// Exit code for invalid or missing configuration.
pub const EXIT_CONFIG: u8 = 2;

/// Exit code when another run holds the lock.
pub const EXIT_LOCKED: u8 = 3;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or validated.
    Config(ConfigError),
    /// Logging could not be initialized.
    Logging(LogError),
    /// Another run is in progress.
    Locked(LockError),
    /// The backup run or a command failed.
    Failed(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::Logging(_) => EXIT_CONFIG,
            CliError::Locked(_) => EXIT_LOCKED,
            CliError::Failed(_) => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Locked(e) => write!(f, "{}", e),
            CliError::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<LogError> for CliError {
    fn from(e: LogError) -> Self {
        CliError::Logging(e)
    }
}

impl From<LockError> for CliError {
    fn from(e: LockError) -> Self {
        CliError::Locked(e)
    }
}

impl From<RunError> for CliError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Lock(e) => CliError::Locked(e),
            RunError::Acquire(e) => CliError::Failed(format!("Backup aborted: {}", e)),
        }
    }
}
