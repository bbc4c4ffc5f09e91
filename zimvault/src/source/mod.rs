//! Source resolution: finding the newest archive on candidate mirrors.

mod listing;
mod resolver;

pub use listing::{newest_in_listing, parse_listing};
pub use resolver::{ResolveError, ResolvedArchive, SourceResolver};
