//! `zimvault config`: inspect configuration.

use std::path::Path;

use clap::Subcommand;
use zimvault::config::{default_config_path, env_var, locate_config_file, BackupConfig};

use super::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as INI
    Show,

    /// Show which configuration file would be read
    Path,

    /// List recognised keys and their environment variables
    Keys,
}

/// Run a config subcommand.
pub fn run(config_path: Option<&Path>, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(config_path),
        ConfigCommands::Path => run_path(config_path),
        ConfigCommands::Keys => {
            run_keys();
            Ok(())
        }
    }
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let config: BackupConfig = load_config(config_path)?;
    print!("{}", config.render_ini());
    Ok(())
}

fn run_path(config_path: Option<&Path>) -> Result<(), CliError> {
    match locate_config_file(config_path, |name| std::env::var(name).ok())? {
        Some(path) => println!("{}", path.display()),
        None => match default_config_path() {
            Some(path) => println!("{} (not present, using environment only)", path.display()),
            None => println!("(no configuration directory, using environment only)"),
        },
    }
    Ok(())
}

fn run_keys() {
    for key in zimvault::config::all_keys() {
        println!("{:<26} {}", key, env_var(key));
    }
}
