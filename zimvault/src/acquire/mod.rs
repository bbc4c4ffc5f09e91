//! Archive acquisition: download, integrity verification and atomic commit.
//!
//! - `checksum`: SHA-256 records and file verification
//! - `engine`: the resolve → download → verify → rename workflow
//! - `error`: fatal acquisition errors

mod checksum;
mod engine;
mod error;

pub use checksum::{calculate_file_checksum, verify_checksum, ChecksumRecord};
pub use engine::{Acquired, AcquisitionEngine, Verification};
pub use error::{AcquireError, AcquireResult};
