//! zimvault CLI - scheduled archive backups
//!
//! Intended to be run from cron or a systemd timer:
//!
//! ```text
//! zimvault --config /etc/zimvault.ini run
//! ```

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;

#[derive(Parser)]
#[command(name = "zimvault")]
#[command(version, about = "Scheduled backups of dated offline archives", long_about = None)]
struct Cli {
    /// Configuration file (default: $ZIMVAULT_CONFIG or <config dir>/zimvault/config.ini)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full backup cycle
    Run,

    /// Show the newest available archive without downloading it
    Resolve,

    /// Show storage usage against the quota
    Quota {
        /// Evict the oldest archives until usage is within the quota
        #[arg(long)]
        enforce: bool,

        /// List what would be evicted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result: Result<(), CliError> = match cli.command {
        Commands::Run => commands::run::run(config),
        Commands::Resolve => commands::resolve::run(config),
        Commands::Quota { enforce, dry_run } => commands::quota::run(config, enforce, dry_run),
        Commands::Config { command } => commands::config::run(config, command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
