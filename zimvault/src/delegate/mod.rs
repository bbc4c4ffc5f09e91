//! Secondary artifact delegates run after the archive is acquired.
//!
//! - `repo_mirror`: keeps local git clones up to date
//! - `binaries`: fetches release assets from GitHub
//! - `packages`: fetches `.deb` bundles from a Debian-style mirror
//!
//! A delegate processes many independent items. A failing item is recorded
//! in the [`DelegateSummary`] and the delegate moves on to the next one; a
//! [`DelegateError`] is only returned when nothing could be attempted.

mod binaries;
mod packages;
mod repo_mirror;

pub use binaries::{BinaryError, BinaryFetcher};
pub use packages::{parse_packages_index, PackageError, PackageFetcher, PackageStanza};
pub use repo_mirror::{RepoError, RepoMirror, SyncAction};

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for delegate runs.
pub type DelegateResult<T> = Result<T, DelegateError>;

/// Errors that stop a delegate before it processes any item.
#[derive(Debug, Error)]
pub enum DelegateError {
    /// The delegate's output directory could not be created.
    #[error("failed to prepare {}: {source}", path.display())]
    Prepare { path: PathBuf, source: io::Error },
}

/// One item a delegate could not process.
///
/// Each delegate reports its own typed item error; the summary keeps the
/// rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Repository, asset or package identifier.
    pub item: String,
    pub reason: String,
}

/// What a delegate did during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateSummary {
    /// Items downloaded, cloned or updated.
    pub fetched: Vec<String>,
    /// Items already present.
    pub skipped: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl DelegateSummary {
    /// Record a failed item.
    pub fn fail(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(ItemFailure {
            item: item.into(),
            reason: reason.into(),
        });
    }

    /// Whether every item succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for DelegateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched, {} skipped, {} failed",
            self.fetched.len(),
            self.skipped.len(),
            self.failures.len()
        )
    }
}

/// A secondary backup task run by the orchestrator.
pub trait Delegate: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Process every configured item.
    fn run(&self) -> DelegateResult<DelegateSummary>;
}

/// Outcome of one delegate in a run.
#[derive(Debug)]
pub struct DelegateOutcome {
    pub name: &'static str,
    pub result: DelegateResult<DelegateSummary>,
}

impl DelegateOutcome {
    /// Whether the delegate ran and every item succeeded.
    pub fn is_clean(&self) -> bool {
        matches!(&self.result, Ok(summary) if summary.is_clean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display() {
        let mut summary = DelegateSummary::default();
        summary.fetched.push("a".to_string());
        summary.skipped.push("b".to_string());
        summary.fail("c", "boom");

        assert_eq!(summary.to_string(), "1 fetched, 1 skipped, 1 failed");
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_outcome_clean() {
        let ok = DelegateOutcome {
            name: "test",
            result: Ok(DelegateSummary::default()),
        };
        let err = DelegateOutcome {
            name: "test",
            result: Err(DelegateError::Prepare {
                path: PathBuf::from("/x"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            }),
        };

        assert!(ok.is_clean());
        assert!(!err.is_clean());
    }
}
