//! Storage quota enforcement by oldest-first eviction.
//!
//! The enforcer keeps the total size of archive entries in the storage
//! directory under a byte ceiling. It runs twice per backup cycle:
//!
//! - **pre-check** with `headroom` set to the estimated size of the archive
//!   about to be downloaded, so space is freed before the transfer starts;
//! - **post-check** with zero headroom against the real total once the new
//!   archive has landed, correcting any estimation error.
//!
//! Eviction order is ascending modification time, ties broken by filename.
//! When every eligible entry is gone and the ceiling still isn't met the
//! enforcer stops and reports the shortfall instead of failing.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::{scan_archives, ArchiveEntry};
use crate::units::format_size;

/// Result type for quota operations.
pub type QuotaResult<T> = Result<T, QuotaError>;

/// Errors that prevent quota enforcement from running at all.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// The storage directory could not be listed.
    #[error("failed to scan {}: {source}", path.display())]
    Scan { path: PathBuf, source: io::Error },
}

/// Options for a single enforcement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnforceOptions {
    /// Bytes reserved for an archive that hasn't landed yet.
    pub headroom: u64,
    /// Filename that must never be evicted.
    pub protect: Option<String>,
    /// Report what would be evicted without deleting anything.
    pub dry_run: bool,
}

impl EnforceOptions {
    /// Options with the given headroom.
    pub fn with_headroom(headroom: u64) -> Self {
        Self {
            headroom,
            ..Default::default()
        }
    }

    /// Never evict `file_name`.
    pub fn protecting(mut self, file_name: impl Into<String>) -> Self {
        self.protect = Some(file_name.into());
        self
    }

    /// Only simulate eviction.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// An entry that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of an enforcement pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaReport {
    /// Configured ceiling.
    pub max_bytes: u64,
    /// Headroom used for this pass.
    pub headroom: u64,
    /// Total archive bytes before eviction.
    pub initial_bytes: u64,
    /// Total archive bytes after eviction.
    pub final_bytes: u64,
    /// Entries removed (or that would be removed in a dry run), oldest first.
    pub evicted: Vec<ArchiveEntry>,
    /// Entries whose deletion failed.
    pub failures: Vec<EvictionFailure>,
    /// Bytes still over budget when no eligible entry remained.
    pub shortfall: Option<u64>,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Duration of the pass in milliseconds.
    pub duration_ms: u64,
}

impl QuotaReport {
    /// Number of evicted entries.
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }

    /// Bytes released by eviction.
    pub fn bytes_freed(&self) -> u64 {
        self.evicted.iter().map(|e| e.size).sum()
    }

    /// Whether `final_bytes + headroom <= max_bytes` holds.
    pub fn is_satisfied(&self) -> bool {
        self.shortfall.is_none()
    }
}

impl fmt::Display for QuotaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quota: evicted {} entries, freed {}, now {} of {} (headroom {}) in {}ms",
            self.evicted_count(),
            format_size(self.bytes_freed()),
            format_size(self.final_bytes),
            format_size(self.max_bytes),
            format_size(self.headroom),
            self.duration_ms
        )?;
        if let Some(shortfall) = self.shortfall {
            write!(f, ", unsatisfiable by {}", format_size(shortfall))?;
        }
        Ok(())
    }
}

/// Current usage of the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaUsage {
    /// Sum of archive entry sizes.
    pub total_bytes: u64,
    /// Archive entries, oldest first.
    pub entries: Vec<ArchiveEntry>,
}

/// Quota enforcer for one storage directory.
#[derive(Debug, Clone)]
pub struct QuotaEnforcer {
    storage_dir: PathBuf,
    max_bytes: u64,
}

impl QuotaEnforcer {
    /// Create an enforcer for `storage_dir` with a ceiling of `max_bytes`.
    pub fn new(storage_dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            max_bytes,
        }
    }

    /// Storage directory being managed.
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Configured ceiling in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Current usage without evicting anything.
    pub fn usage(&self) -> QuotaResult<QuotaUsage> {
        let entries = self.scan()?;
        let total_bytes = entries.iter().map(|e| e.size).sum();
        Ok(QuotaUsage {
            total_bytes,
            entries,
        })
    }

    /// Evict oldest entries until `total + headroom <= max_bytes`.
    pub fn enforce(&self, headroom: u64) -> QuotaResult<QuotaReport> {
        self.enforce_with(&EnforceOptions::with_headroom(headroom))
    }

    /// Enforcement pass with explicit options.
    pub fn enforce_with(&self, options: &EnforceOptions) -> QuotaResult<QuotaReport> {
        let start = Instant::now();
        let entries = self.scan()?;
        let initial_bytes: u64 = entries.iter().map(|e| e.size).sum();
        let headroom = options.headroom;

        let mut total = initial_bytes;
        let mut evicted = Vec::new();
        let mut failures = Vec::new();
        let mut candidates = entries
            .into_iter()
            .filter(|e| options.protect.as_deref() != Some(e.file_name().as_str()));

        while total.saturating_add(headroom) > self.max_bytes {
            let Some(entry) = candidates.next() else {
                break;
            };

            if options.dry_run {
                debug!(path = %entry.path.display(), "Would evict archive");
                total -= entry.size;
                evicted.push(entry);
                continue;
            }

            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    info!(
                        path = %entry.path.display(),
                        size = %format_size(entry.size),
                        "Evicted archive"
                    );
                    total -= entry.size;
                    evicted.push(entry);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %entry.path.display(), "Archive already removed");
                    total -= entry.size;
                }
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "Failed to evict archive");
                    failures.push(EvictionFailure {
                        path: entry.path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let needed = total.saturating_add(headroom);
        let shortfall = (needed > self.max_bytes).then(|| needed - self.max_bytes);

        let report = QuotaReport {
            max_bytes: self.max_bytes,
            headroom,
            initial_bytes,
            final_bytes: total,
            evicted,
            failures,
            shortfall,
            dry_run: options.dry_run,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if let Some(shortfall) = report.shortfall {
            warn!(
                shortfall = %format_size(shortfall),
                total = %format_size(report.final_bytes),
                max = %format_size(self.max_bytes),
                headroom = %format_size(headroom),
                "Quota unsatisfiable: no eligible archives left to evict"
            );
        } else {
            debug!("{}", report);
        }

        Ok(report)
    }

    fn scan(&self) -> QuotaResult<Vec<ArchiveEntry>> {
        scan_archives(&self.storage_dir).map_err(|e| QuotaError::Scan {
            path: self.storage_dir.clone(),
            source: e,
        })
    }
}

/// Enforce a quota on `storage_dir` and return the number of evicted entries.
pub fn enforce_quota(storage_dir: &Path, max_bytes: u64, headroom: u64) -> QuotaResult<usize> {
    QuotaEnforcer::new(storage_dir, max_bytes)
        .enforce(headroom)
        .map(|report| report.evicted_count())
}
