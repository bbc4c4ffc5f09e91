//! `zimvault quota`: inspect or enforce the storage quota.

use std::path::Path;

use zimvault::config::BackupConfig;
use zimvault::lock::RunLock;
use zimvault::quota::{EnforceOptions, QuotaEnforcer};
use zimvault::units::format_size;

use super::{load_config, start_logging};
use crate::error::CliError;

/// Show usage, or enforce the quota with zero headroom.
pub fn run(config_path: Option<&Path>, enforce: bool, dry_run: bool) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let _guard = start_logging(&config)?;
    execute(&config, enforce, dry_run)
}

/// Quota command body once configuration and logging are set up.
///
/// A real enforcement pass deletes archives, so it takes the run lock and
/// refuses to start while a backup run holds it.
pub fn execute(config: &BackupConfig, enforce: bool, dry_run: bool) -> Result<(), CliError> {
    let enforcer = QuotaEnforcer::new(&config.storage_dir, config.max_bytes);

    if enforce || dry_run {
        let mut options = EnforceOptions::with_headroom(0);
        let _lock = if dry_run {
            options = options.dry_run();
            None
        } else {
            Some(RunLock::acquire(&config.storage_dir, config.lock_stale_after)?)
        };

        let report = enforcer
            .enforce_with(&options)
            .map_err(|e| CliError::Failed(e.to_string()))?;

        let verb = if dry_run { "Would evict" } else { "Evicted" };
        for entry in &report.evicted {
            println!("{} {} ({})", verb, entry.file_name(), format_size(entry.size));
        }
        println!("{}", report);
        return Ok(());
    }

    let usage = enforcer
        .usage()
        .map_err(|e| CliError::Failed(e.to_string()))?;

    println!("Storage: {}", config.storage_dir.display());
    println!(
        "Usage:   {} of {} ({} archives)",
        format_size(usage.total_bytes),
        format_size(enforcer.max_bytes()),
        usage.entries.len()
    );
    for entry in &usage.entries {
        println!("  {:>10}  {}", format_size(entry.size), entry.file_name());
    }
    Ok(())
}
