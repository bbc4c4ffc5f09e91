//! Error types for archive acquisition.

use std::io;
use std::path::PathBuf;

use crate::source::ResolveError;

/// Result type for acquisition operations.
pub type AcquireResult<T> = Result<T, AcquireError>;

/// Errors that abort an acquisition attempt.
///
/// Every variant is fatal for the run; the temporary download has already
/// been removed by the time one is returned.
#[derive(Debug)]
pub enum AcquireError {
    /// No candidate source lists an archive of the family.
    SourceNotFound(ResolveError),

    /// Network or transport failure while downloading the archive body.
    TransferFailed { url: String, reason: String },

    /// The downloaded archive does not match its published checksum.
    IntegrityFailed {
        filename: String,
        expected: String,
        actual: String,
    },

    /// Local filesystem failure in managed storage.
    Storage { path: PathBuf, source: io::Error },

    /// The resolved URL has no usable filename.
    InvalidUrl(String),
}

impl AcquireError {
    /// Short classification used in logs and exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceNotFound(_) => "source-not-found",
            Self::TransferFailed { .. } => "transfer-failed",
            Self::IntegrityFailed { .. } => "integrity-failed",
            Self::Storage { .. } => "storage",
            Self::InvalidUrl(_) => "invalid-url",
        }
    }
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceNotFound(e) => write!(f, "{}", e),
            Self::TransferFailed { url, reason } => {
                write!(f, "failed to download {}: {}", url, reason)
            }
            Self::IntegrityFailed {
                filename,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "checksum mismatch for {}: expected {}, got {}",
                    filename, expected, actual
                )
            }
            Self::Storage { path, source } => {
                write!(f, "storage error at {}: {}", path.display(), source)
            }
            Self::InvalidUrl(url) => write!(f, "URL has no file name: {}", url),
        }
    }
}

impl std::error::Error for AcquireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SourceNotFound(e) => Some(e),
            Self::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ResolveError> for AcquireError {
    fn from(e: ResolveError) -> Self {
        Self::SourceNotFound(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_failed_display() {
        let err = AcquireError::IntegrityFailed {
            filename: "wiki_2024-01.zim".to_string(),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        assert!(err.to_string().contains("checksum mismatch"));
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("def456"));
        assert_eq!(err.kind(), "integrity-failed");
    }

    #[test]
    fn test_source_not_found_from_resolve_error() {
        let err: AcquireError = ResolveError::NotFound {
            basename: "wiki".to_string(),
            extension: "zim".to_string(),
            sources_tried: 2,
        }
        .into();
        assert_eq!(err.kind(), "source-not-found");
        assert!(err.to_string().contains("wiki_YYYY-MM.zim"));
    }

    #[test]
    fn test_transfer_failed_display() {
        let err = AcquireError::TransferFailed {
            url: "https://m/wiki_2024-01.zim".to_string(),
            reason: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to download https://m/wiki_2024-01.zim: connection reset"
        );
    }
}
