//! Summary of a completed backup run.

use std::fmt;
use std::time::Duration;

use crate::acquire::Acquired;
use crate::delegate::DelegateOutcome;
use crate::quota::QuotaReport;

/// Result of a successful run.
#[derive(Debug)]
pub struct RunReport {
    /// The archive committed (or found) in managed storage.
    pub acquired: Acquired,
    /// Headroom reserved in the pre-check.
    pub headroom: u64,
    /// Pre-check result; `None` when storage couldn't be scanned.
    pub pre_quota: Option<QuotaReport>,
    /// Post-check result; `None` when storage couldn't be scanned.
    pub post_quota: Option<QuotaReport>,
    /// Delegate outcomes in run order.
    pub delegates: Vec<DelegateOutcome>,
    pub duration: Duration,
}

impl RunReport {
    /// Archives evicted across both quota checks.
    pub fn evicted_count(&self) -> usize {
        [&self.pre_quota, &self.post_quota]
            .iter()
            .filter_map(|r| r.as_ref())
            .map(|r| r.evicted_count())
            .sum()
    }

    /// Delegates that failed outright or had failing items.
    pub fn failed_delegates(&self) -> Vec<&'static str> {
        self.delegates
            .iter()
            .filter(|d| !d.is_clean())
            .map(|d| d.name)
            .collect()
    }

    /// Whether the post-check ended within the ceiling.
    pub fn quota_satisfied(&self) -> bool {
        self.post_quota
            .as_ref()
            .map_or(true, QuotaReport::is_satisfied)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match &self.acquired.verification {
            None => "already present",
            Some(v) if v.is_verified() => "downloaded and verified",
            Some(_) => "downloaded unverified",
        };
        write!(
            f,
            "backup complete: {} {}, {} evicted, delegates failed: {}, took {:.1}s",
            self.acquired.name.file_name(),
            action,
            self.evicted_count(),
            self.failed_delegates().len(),
            self.duration.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::Verification;
    use crate::archive::ArchiveName;
    use std::path::PathBuf;

    fn report(verification: Option<Verification>) -> RunReport {
        RunReport {
            acquired: Acquired {
                path: PathBuf::from("/srv/zim/wiki_2024-02.zim"),
                name: ArchiveName::new("wiki", 2024, 2, "zim"),
                url: "https://m/zim/wiki_2024-02.zim".to_string(),
                already_present: verification.is_none(),
                bytes_transferred: 0,
                verification,
            },
            headroom: 0,
            pre_quota: None,
            post_quota: None,
            delegates: Vec::new(),
            duration: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_display_reports_verification() {
        assert_eq!(
            report(Some(Verification::Verified)).to_string(),
            "backup complete: wiki_2024-02.zim downloaded and verified, 0 evicted, delegates failed: 0, took 1.5s"
        );
        assert!(report(Some(Verification::ChecksumMalformed("x".to_string())))
            .to_string()
            .contains("downloaded unverified"));
        assert!(report(None).to_string().contains("already present"));
    }

    #[test]
    fn test_missing_quota_report_counts_as_satisfied() {
        let report = report(None);
        assert!(report.quota_satisfied());
        assert_eq!(report.evicted_count(), 0);
    }
}
