//! Dated archives and the managed storage directory.
//!
//! - `naming`: `<basename>_<YYYY>-<MM>.<ext>` parsing and ordering
//! - `entry`: committed archive files and directory scanning

mod entry;
mod naming;

pub use entry::{scan_archives, sort_oldest_first, ArchiveEntry};
pub use naming::{ArchiveName, NameError};
