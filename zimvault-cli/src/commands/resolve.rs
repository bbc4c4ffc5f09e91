//! `zimvault resolve`: show the newest archive without downloading it.

use std::path::Path;

use zimvault::orchestrator::BackupOrchestrator;
use zimvault::units::format_size;

use super::{http_transport, load_config, start_logging};
use crate::error::CliError;

/// Resolve the newest archive and report whether it is already stored.
pub fn run(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let _guard = start_logging(&config)?;

    let orchestrator = BackupOrchestrator::with_delegates(&config, http_transport(&config)?, Vec::new());
    let engine = orchestrator.engine();
    let resolved = engine
        .resolve(&config.archive.basename)
        .map_err(|e| CliError::Failed(e.to_string()))?;
    let target = engine
        .target_path(&resolved)
        .map_err(|e| CliError::Failed(e.to_string()))?;

    println!("Newest:  {}", resolved.file_name());
    println!("URL:     {}", resolved.url);
    println!("Source:  {}", resolved.source);
    match engine.remote_size(&resolved) {
        Some(size) => println!("Size:    {}", format_size(size)),
        None => println!("Size:    (unknown)"),
    }
    if target.exists() {
        println!("Status:  already stored at {}", target.display());
    } else {
        println!("Status:  not yet downloaded");
    }
    Ok(())
}
