//! zimvault - Scheduled backup of dated offline archives
//!
//! This library keeps a local copy of the newest dated archive of a family
//! (e.g. `wikipedia_en_all_maxi_2024-05.zim`) found on a list of mirrors,
//! rotates old archives out under a byte quota, and refreshes secondary
//! artifacts: git mirrors, release binaries and distribution packages.

pub mod acquire;
pub mod archive;
pub mod config;
pub mod delegate;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod quota;
pub mod source;
pub mod transport;
pub mod units;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
