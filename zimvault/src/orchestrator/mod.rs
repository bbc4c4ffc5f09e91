//! Backup run orchestration.
//!
//! A run is a linear sequence of stages:
//!
//! ```text
//! START → PRE_QUOTA_CHECK → ACQUIRE ──(error)──→ ABORT
//!                              │
//!                              ▼
//!                     POST_QUOTA_CHECK → DELEGATE_EXTERNAL → DONE
//! ```
//!
//! The newest archive is resolved before the pre-check so its size can be
//! reserved as headroom. Only acquisition decides whether the run succeeds;
//! quota shortfalls and delegate failures are logged and reported.

mod report;

pub use report::RunReport;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::acquire::{AcquireError, AcquireResult, AcquisitionEngine};
use crate::config::BackupConfig;
use crate::delegate::{BinaryFetcher, Delegate, DelegateOutcome, PackageFetcher, RepoMirror};
use crate::lock::{LockError, RunLock};
use crate::quota::{EnforceOptions, QuotaEnforcer, QuotaReport};
use crate::source::{ResolvedArchive, SourceResolver};
use crate::transport::Transport;
use crate::units::format_size;

/// Stage of a backup run, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Start,
    PreQuotaCheck,
    Acquire,
    PostQuotaCheck,
    DelegateExternal,
    Done,
    Abort,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::PreQuotaCheck => "pre-quota-check",
            Self::Acquire => "acquire",
            Self::PostQuotaCheck => "post-quota-check",
            Self::DelegateExternal => "delegate-external",
            Self::Done => "done",
            Self::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Another run is in progress.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The newest archive could not be acquired.
    #[error("acquisition failed: {0}")]
    Acquire(#[from] AcquireError),
}

/// Inflate `bytes` by `percent`.
pub fn with_margin(bytes: u64, percent: u64) -> u64 {
    let inflated = bytes as u128 * (100 + percent as u128) / 100;
    inflated.min(u64::MAX as u128) as u64
}

/// Runs one backup cycle.
pub struct BackupOrchestrator {
    basename: String,
    headroom_margin_percent: u64,
    lock_stale_after: Duration,
    engine: AcquisitionEngine,
    quota: QuotaEnforcer,
    delegates: Vec<Box<dyn Delegate>>,
}

impl BackupOrchestrator {
    /// Orchestrator with the repository, binary and package delegates.
    pub fn new(config: &BackupConfig, transport: Arc<dyn Transport>) -> Self {
        let delegates = Self::standard_delegates(config, Arc::clone(&transport));
        Self::with_delegates(config, transport, delegates)
    }

    /// Orchestrator with an explicit delegate list, run in order.
    pub fn with_delegates(
        config: &BackupConfig,
        transport: Arc<dyn Transport>,
        delegates: Vec<Box<dyn Delegate>>,
    ) -> Self {
        let resolver = SourceResolver::new(
            Arc::clone(&transport),
            config.archive.sources.clone(),
            config.archive.extension.clone(),
        );
        Self {
            basename: config.archive.basename.clone(),
            headroom_margin_percent: config.headroom_margin_percent,
            lock_stale_after: config.lock_stale_after,
            engine: AcquisitionEngine::new(resolver, transport, config.storage_dir.clone()),
            quota: QuotaEnforcer::new(config.storage_dir.clone(), config.max_bytes),
            delegates,
        }
    }

    /// The delegates configured for a normal run.
    pub fn standard_delegates(
        config: &BackupConfig,
        transport: Arc<dyn Transport>,
    ) -> Vec<Box<dyn Delegate>> {
        let repositories: Box<dyn Delegate> = Box::new(RepoMirror::new(config.repositories.clone()));
        let binaries: Box<dyn Delegate> = Box::new(BinaryFetcher::new(
            Arc::clone(&transport),
            config.binaries.clone(),
        ));
        let packages: Box<dyn Delegate> =
            Box::new(PackageFetcher::new(transport, config.packages.clone()));
        vec![repositories, binaries, packages]
    }

    /// Quota enforcer for the managed storage directory.
    pub fn quota(&self) -> &QuotaEnforcer {
        &self.quota
    }

    /// Acquisition engine used by the run.
    pub fn engine(&self) -> &AcquisitionEngine {
        &self.engine
    }

    /// Bytes to reserve for `resolved` before downloading it.
    ///
    /// Zero if the archive is already committed. Otherwise the remote size,
    /// or the largest local archive when the server doesn't report one,
    /// plus the configured margin.
    pub fn estimate_headroom(&self, resolved: &ResolvedArchive) -> AcquireResult<u64> {
        if self.engine.target_path(resolved)?.exists() {
            return Ok(0);
        }

        let base = match self.engine.remote_size(resolved) {
            Some(size) => size,
            None => {
                let largest = self
                    .quota
                    .usage()
                    .map(|usage| usage.entries.iter().map(|e| e.size).max().unwrap_or(0))
                    .unwrap_or(0);
                warn!(
                    url = %resolved.url,
                    estimate = %format_size(largest),
                    "Remote size unknown, using largest local archive"
                );
                largest
            }
        };

        Ok(with_margin(base, self.headroom_margin_percent))
    }

    /// Run one backup cycle.
    pub fn run(&self) -> Result<RunReport, RunError> {
        let started = Instant::now();
        info!(stage = %RunStage::Start, basename = %self.basename, "Backup run starting");

        let _lock = RunLock::acquire(self.quota.storage_dir(), self.lock_stale_after)?;

        let resolved = self.engine.resolve(&self.basename).map_err(abort)?;
        info!(url = %resolved.url, source = %resolved.source, "Resolved newest archive");
        let headroom = self.estimate_headroom(&resolved).map_err(abort)?;

        info!(stage = %RunStage::PreQuotaCheck, headroom = %format_size(headroom), "Checking quota");
        let pre_quota = self.check_quota(EnforceOptions::with_headroom(headroom));

        info!(stage = %RunStage::Acquire, url = %resolved.url, "Acquiring archive");
        let acquired = self.engine.acquire_resolved(&resolved).map_err(abort)?;

        info!(stage = %RunStage::PostQuotaCheck, "Checking quota");
        let post_quota =
            self.check_quota(EnforceOptions::with_headroom(0).protecting(acquired.name.file_name()));

        info!(stage = %RunStage::DelegateExternal, delegates = self.delegates.len(), "Running delegates");
        let delegates = self.run_delegates();

        let report = RunReport {
            acquired,
            headroom,
            pre_quota,
            post_quota,
            delegates,
            duration: started.elapsed(),
        };
        info!(stage = %RunStage::Done, "{}", report);
        Ok(report)
    }

    fn check_quota(&self, options: EnforceOptions) -> Option<QuotaReport> {
        match self.quota.enforce_with(&options) {
            Ok(report) => {
                info!("{}", report);
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Quota check skipped");
                None
            }
        }
    }

    fn run_delegates(&self) -> Vec<DelegateOutcome> {
        self.delegates
            .iter()
            .map(|delegate| {
                let name = delegate.name();
                let result = delegate.run();
                match &result {
                    Ok(summary) if summary.is_clean() => {
                        info!(delegate = name, "Delegate finished: {}", summary)
                    }
                    Ok(summary) => {
                        for failure in &summary.failures {
                            warn!(delegate = name, item = %failure.item, error = %failure.reason, "Delegate item failed");
                        }
                        warn!(delegate = name, "Delegate finished with failures: {}", summary)
                    }
                    Err(e) => error!(delegate = name, error = %e, "Delegate failed"),
                }
                DelegateOutcome { name, result }
            })
            .collect()
    }
}

fn abort(e: AcquireError) -> RunError {
    error!(stage = %RunStage::Abort, kind = e.kind(), error = %e, "Backup run aborted");
    RunError::Acquire(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_margin() {
        assert_eq!(with_margin(1_000, 10), 1_100);
        assert_eq!(with_margin(1_000, 0), 1_000);
        assert_eq!(with_margin(0, 10), 0);
        assert_eq!(with_margin(u64::MAX, 10), u64::MAX);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(RunStage::PreQuotaCheck.to_string(), "pre-quota-check");
        assert_eq!(RunStage::Abort.to_string(), "abort");
    }
}
