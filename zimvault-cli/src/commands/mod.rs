//! CLI command implementations.

pub mod config;
pub mod quota;
pub mod resolve;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use zimvault::config::BackupConfig;
use zimvault::logging::{init_logging, LoggingGuard};
use zimvault::transport::{HttpTransport, Transport};

use crate::error::CliError;

/// Load and validate configuration.
pub fn load_config(path: Option<&Path>) -> Result<BackupConfig, CliError> {
    Ok(BackupConfig::load(path)?)
}

/// Install logging as configured.
pub fn start_logging(config: &BackupConfig) -> Result<LoggingGuard, CliError> {
    Ok(init_logging(&config.log)?)
}

/// HTTP transport with the configured timeouts.
pub fn http_transport(config: &BackupConfig) -> Result<Arc<dyn Transport>, CliError> {
    let transport = HttpTransport::with_timeouts(config.timeouts)
        .map_err(|e| CliError::Failed(e.to_string()))?;
    Ok(Arc::new(transport))
}
