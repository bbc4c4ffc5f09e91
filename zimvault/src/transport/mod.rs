//! Network transport used by the resolver, acquisition engine and delegates.
//!
//! All network access goes through the [`Transport`] trait so components can
//! be driven by [`MemoryTransport`] in tests. [`HttpTransport`] is the
//! blocking reqwest implementation used at runtime.

mod http;
mod memory;

pub use http::{
    HttpTimeouts, HttpTransport, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TRANSFER_TIMEOUT_SECS,
};
pub use memory::{MemoryTransport, RequestKind};

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::{set_file_mtime, FileTime};
use thiserror::Error;
use tracing::warn;

/// Suffix appended to a final path while its content is being transferred.
pub const PART_SUFFIX: &str = ".part";

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The request failed before a complete response was read.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The request exceeded its timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// Writing the response body to disk failed.
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl TransportError {
    /// Whether the server reported that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404 | 410, .. })
    }
}

/// Outcome of a completed body transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// Bytes written to the destination.
    pub bytes: u64,
    /// Remote modification time, when the server reported one.
    pub modified: Option<SystemTime>,
}

/// Blocking network transport.
pub trait Transport: Send + Sync {
    /// GET a resource as text (listings, checksum records, API responses).
    fn get_text(&self, url: &str) -> TransportResult<String>;

    /// GET a resource as raw bytes (compressed indexes).
    fn get_bytes(&self, url: &str) -> TransportResult<Vec<u8>>;

    /// Size of a resource from a HEAD request, if the server reports it.
    fn content_length(&self, url: &str) -> Option<u64>;

    /// Stream a resource into `dest`, creating or truncating it.
    ///
    /// Implementations leave whatever was written in place on failure;
    /// callers own cleanup.
    fn download(&self, url: &str, dest: &Path) -> TransportResult<Transfer>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get_text(&self, url: &str) -> TransportResult<String> {
        (**self).get_text(url)
    }

    fn get_bytes(&self, url: &str) -> TransportResult<Vec<u8>> {
        (**self).get_bytes(url)
    }

    fn content_length(&self, url: &str) -> Option<u64> {
        (**self).content_length(url)
    }

    fn download(&self, url: &str, dest: &Path) -> TransportResult<Transfer> {
        (**self).download(url, dest)
    }
}

/// Temporary path used while `dest` is being transferred.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PART_SUFFIX);
    dest.with_file_name(name)
}

/// Last path segment of a URL, ignoring any query string or fragment.
pub fn url_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Join a base location and a relative path with exactly one `/`.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Apply the remote modification time to a downloaded file.
///
/// Failure is logged; the content is still valid without it.
pub fn apply_remote_mtime(path: &Path, modified: Option<SystemTime>) {
    if let Some(modified) = modified {
        if let Err(e) = set_file_mtime(path, FileTime::from_system_time(modified)) {
            warn!(path = %path.display(), error = %e, "Failed to preserve remote modification time");
        }
    }
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Download `url` to `dest` through a `.part` file and rename on success.
///
/// A partial file never appears under `dest`; the `.part` file is removed
/// when the transfer fails.
pub fn download_committed(
    transport: &dyn Transport,
    url: &str,
    dest: &Path,
) -> TransportResult<Transfer> {
    let part = part_path(dest);

    let transfer = match transport.download(url, &part) {
        Ok(transfer) => transfer,
        Err(e) => {
            let _ = remove_if_exists(&part);
            return Err(e);
        }
    };

    apply_remote_mtime(&part, transfer.modified);

    fs::rename(&part, dest).map_err(|e| {
        let _ = remove_if_exists(&part);
        TransportError::Write {
            path: dest.to_path_buf(),
            source: e,
        }
    })?;

    Ok(transfer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path_appends_suffix() {
        let part = part_path(Path::new("/data/wiki_2024-01.zim"));
        assert_eq!(part, PathBuf::from("/data/wiki_2024-01.zim.part"));
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(
            url_file_name("https://mirror.example/zim/wiki_2024-01.zim"),
            Some("wiki_2024-01.zim")
        );
        assert_eq!(
            url_file_name("https://mirror.example/a.zim?download=1"),
            Some("a.zim")
        );
        assert_eq!(url_file_name("https://mirror.example/zim/"), None);
    }

    #[test]
    fn test_join_url_single_separator() {
        assert_eq!(join_url("https://a/zim/", "x.zim"), "https://a/zim/x.zim");
        assert_eq!(join_url("https://a/zim", "x.zim"), "https://a/zim/x.zim");
        assert_eq!(join_url("https://a/zim", "/pool/x.deb"), "https://a/zim/pool/x.deb");
    }

    #[test]
    fn test_not_found_status() {
        let err = TransportError::Status {
            url: "u".to_string(),
            status: 404,
        };
        assert!(err.is_not_found());

        let err = TransportError::Status {
            url: "u".to_string(),
            status: 500,
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_remove_if_exists_missing_is_ok() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(remove_if_exists(&temp.path().join("nothing")).is_ok());
    }
}
