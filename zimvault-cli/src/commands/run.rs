//! `zimvault run`: one full backup cycle.

use std::path::Path;

use tracing::info;
use zimvault::orchestrator::BackupOrchestrator;

use super::{http_transport, load_config, start_logging};
use crate::error::CliError;

/// Run a backup cycle.
pub fn run(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let _guard = start_logging(&config)?;
    info!(version = zimvault::VERSION, "{}", config.summary());

    let orchestrator = BackupOrchestrator::new(&config, http_transport(&config)?);
    let report = orchestrator.run()?;

    println!("{}", report);
    for name in report.failed_delegates() {
        println!("  delegate '{}' reported failures (see log)", name);
    }
    Ok(())
}
