//! Download, verify and commit the newest archive.
//!
//! The engine runs the acquisition workflow:
//! 1. Resolve the newest archive URL
//! 2. Short-circuit if the dated archive is already committed
//! 3. Download to `<target>.part`
//! 4. Verify against the published `.sha256` record, when one exists
//! 5. Rename `<target>.part` to `<target>`
//!
//! The rename happens inside the storage directory, so it is atomic and a
//! partially downloaded archive never appears under its final name.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::checksum::{verify_checksum, ChecksumRecord};
use super::error::{AcquireError, AcquireResult};
use crate::archive::ArchiveName;
use crate::source::{ResolvedArchive, SourceResolver};
use crate::transport::{
    apply_remote_mtime, part_path, remove_if_exists, url_file_name, Transport,
};
use crate::units::format_size;

/// Outcome of checksum verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The archive matched its published SHA-256 digest.
    Verified,
    /// No checksum record could be fetched.
    ChecksumUnavailable(String),
    /// A checksum record exists but isn't a 64-hex-digit digest.
    ChecksumMalformed(String),
}

impl Verification {
    /// Whether the archive was checked against a digest.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// A committed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    /// Final path in managed storage.
    pub path: PathBuf,
    /// Parsed archive name.
    pub name: ArchiveName,
    /// Source URL.
    pub url: String,
    /// True when the archive was already present and nothing was downloaded.
    pub already_present: bool,
    /// Bytes transferred for the archive body.
    pub bytes_transferred: u64,
    /// Verification outcome; `None` when the archive was already present.
    pub verification: Option<Verification>,
}

/// Archive acquisition engine.
///
/// The engine is the only writer of new files into the storage directory.
pub struct AcquisitionEngine {
    resolver: SourceResolver,
    transport: Arc<dyn Transport>,
    storage_dir: PathBuf,
}

impl AcquisitionEngine {
    /// Create an engine that commits archives into `storage_dir`.
    pub fn new(
        resolver: SourceResolver,
        transport: Arc<dyn Transport>,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            transport,
            storage_dir: storage_dir.into(),
        }
    }

    /// Resolve the newest archive of `basename` without downloading it.
    pub fn resolve(&self, basename: &str) -> AcquireResult<ResolvedArchive> {
        Ok(self.resolver.find_newest(basename)?)
    }

    /// Final path a resolved archive is committed to.
    pub fn target_path(&self, resolved: &ResolvedArchive) -> AcquireResult<PathBuf> {
        let file_name = url_file_name(&resolved.url)
            .ok_or_else(|| AcquireError::InvalidUrl(resolved.url.clone()))?;
        Ok(self.storage_dir.join(file_name))
    }

    /// Remote size of a resolved archive, if the server reports it.
    pub fn remote_size(&self, resolved: &ResolvedArchive) -> Option<u64> {
        self.transport.content_length(&resolved.url)
    }

    /// Resolve and acquire the newest archive of `basename`.
    pub fn acquire(&self, basename: &str) -> AcquireResult<Acquired> {
        let resolved = self.resolve(basename)?;
        self.acquire_resolved(&resolved)
    }

    /// Acquire an already resolved archive.
    ///
    /// Returns immediately without any transfer if the target exists.
    pub fn acquire_resolved(&self, resolved: &ResolvedArchive) -> AcquireResult<Acquired> {
        let target = self.target_path(resolved)?;

        if target.exists() {
            info!(path = %target.display(), "Archive already present, skipping download");
            return Ok(Acquired {
                path: target,
                name: resolved.name.clone(),
                url: resolved.url.clone(),
                already_present: true,
                bytes_transferred: 0,
                verification: None,
            });
        }

        fs::create_dir_all(&self.storage_dir).map_err(|e| AcquireError::Storage {
            path: self.storage_dir.clone(),
            source: e,
        })?;

        let part = part_path(&target);
        // Leftover from an interrupted run; the transfer truncates it anyway
        if part.exists() {
            debug!(path = %part.display(), "Discarding stale partial download");
        }

        info!(url = %resolved.url, path = %part.display(), "Downloading archive");
        let transfer = match self.transport.download(&resolved.url, &part) {
            Ok(transfer) => transfer,
            Err(e) => {
                discard(&part);
                return Err(AcquireError::TransferFailed {
                    url: resolved.url.clone(),
                    reason: e.to_string(),
                });
            }
        };
        apply_remote_mtime(&part, transfer.modified);
        info!(
            url = %resolved.url,
            size = %format_size(transfer.bytes),
            "Download complete"
        );

        let verification = match self.verify(resolved, &part) {
            Ok(verification) => verification,
            Err(e) => {
                discard(&part);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&part, &target) {
            discard(&part);
            return Err(AcquireError::Storage {
                path: target,
                source: e,
            });
        }
        info!(path = %target.display(), "Archive committed");

        Ok(Acquired {
            path: target,
            name: resolved.name.clone(),
            url: resolved.url.clone(),
            already_present: false,
            bytes_transferred: transfer.bytes,
            verification: Some(verification),
        })
    }

    /// Check the downloaded file against the sibling `.sha256` record.
    fn verify(&self, resolved: &ResolvedArchive, part: &Path) -> AcquireResult<Verification> {
        let checksum_url = resolved.checksum_url();

        let body = match self.transport.get_text(&checksum_url) {
            Ok(body) => body,
            Err(e) => {
                if e.is_not_found() {
                    info!(url = %checksum_url, "No checksum published, archive kept unverified");
                } else {
                    warn!(url = %checksum_url, error = %e, "Checksum unavailable, archive kept unverified");
                }
                return Ok(Verification::ChecksumUnavailable(e.to_string()));
            }
        };

        match ChecksumRecord::parse(&body) {
            ChecksumRecord::Malformed(token) => {
                warn!(
                    url = %checksum_url,
                    token = %token,
                    "Malformed checksum record, archive kept unverified"
                );
                Ok(Verification::ChecksumMalformed(token))
            }
            ChecksumRecord::Sha256(expected) => {
                verify_checksum(part, &resolved.file_name(), &expected)?;
                info!(file = %resolved.file_name(), "Checksum verified");
                Ok(Verification::Verified)
            }
        }
    }
}

fn discard(part: &Path) {
    if let Err(e) = remove_if_exists(part) {
        warn!(path = %part.display(), error = %e, "Failed to remove partial download");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::calculate_file_checksum;
    use crate::transport::{MemoryTransport, RequestKind};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    const SOURCE: &str = "https://mirror.example/zim";
    const ARCHIVE_URL: &str = "https://mirror.example/zim/wiki_test_2024-02.zim";
    const CHECKSUM_URL: &str = "https://mirror.example/zim/wiki_test_2024-02.zim.sha256";
    const PAYLOAD: &[u8] = b"zim archive payload";

    fn payload_digest() -> String {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("payload");
        fs::write(&path, PAYLOAD).unwrap();
        calculate_file_checksum(&path).unwrap()
    }

    fn base_transport() -> MemoryTransport {
        MemoryTransport::new().with_body(
            format!("{}/", SOURCE),
            "wiki_test_2024-01.zim\nwiki_test_2024-02.zim\n",
        )
    }

    fn engine(transport: MemoryTransport, dir: &Path) -> (Arc<MemoryTransport>, AcquisitionEngine) {
        let transport = Arc::new(transport);
        let resolver = SourceResolver::new(transport.clone(), vec![SOURCE.to_string()], "zim");
        let engine = AcquisitionEngine::new(resolver, transport.clone(), dir);
        (transport, engine)
    }

    #[test]
    fn test_acquire_with_valid_checksum() {
        let temp = TempDir::new().unwrap();
        let (_, engine) = engine(
            base_transport()
                .with_body(ARCHIVE_URL, PAYLOAD.to_vec())
                .with_body(CHECKSUM_URL, format!("{}  wiki_test_2024-02.zim\n", payload_digest())),
            temp.path(),
        );

        let acquired = engine.acquire("wiki_test").unwrap();

        assert_eq!(acquired.path, temp.path().join("wiki_test_2024-02.zim"));
        assert!(!acquired.already_present);
        assert_eq!(acquired.bytes_transferred, PAYLOAD.len() as u64);
        assert_eq!(acquired.verification, Some(Verification::Verified));
        assert_eq!(fs::read(&acquired.path).unwrap(), PAYLOAD);
        assert!(!part_path(&acquired.path).exists());
    }

    #[test]
    fn test_acquire_without_checksum_is_unverified() {
        let temp = TempDir::new().unwrap();
        let (_, engine) = engine(
            base_transport().with_body(ARCHIVE_URL, PAYLOAD.to_vec()),
            temp.path(),
        );

        let acquired = engine.acquire("wiki_test").unwrap();

        assert!(matches!(
            acquired.verification,
            Some(Verification::ChecksumUnavailable(_))
        ));
        assert!(acquired.path.exists());
    }

    #[test]
    fn test_second_acquire_transfers_nothing() {
        let temp = TempDir::new().unwrap();
        let (transport, engine) = engine(
            base_transport().with_body(ARCHIVE_URL, PAYLOAD.to_vec()),
            temp.path(),
        );

        let first = engine.acquire("wiki_test").unwrap();
        let second = engine.acquire("wiki_test").unwrap();

        assert_eq!(first.path, second.path);
        assert!(second.already_present);
        assert_eq!(second.bytes_transferred, 0);
        assert_eq!(transport.count(RequestKind::Download, ARCHIVE_URL), 1);
    }

    #[test]
    fn test_transfer_failure_leaves_no_files() {
        let temp = TempDir::new().unwrap();
        let (_, engine) = engine(
            base_transport().with_interruption(ARCHIVE_URL, b"zim arch".to_vec()),
            temp.path(),
        );

        let err = engine.acquire("wiki_test").unwrap_err();

        assert!(matches!(err, AcquireError::TransferFailed { .. }));
        let target = temp.path().join("wiki_test_2024-02.zim");
        assert!(!target.exists());
        assert!(!part_path(&target).exists());
    }

    #[test]
    fn test_corrupt_payload_rejected() {
        let temp = TempDir::new().unwrap();
        let (_, engine) = engine(
            base_transport()
                .with_body(ARCHIVE_URL, b"corrupted payload".to_vec())
                .with_body(CHECKSUM_URL, payload_digest()),
            temp.path(),
        );

        let err = engine.acquire("wiki_test").unwrap_err();

        assert!(matches!(err, AcquireError::IntegrityFailed { .. }));
        let target = temp.path().join("wiki_test_2024-02.zim");
        assert!(!target.exists());
        assert!(!part_path(&target).exists());
    }

    #[test]
    fn test_malformed_checksum_accepts_payload() {
        let temp = TempDir::new().unwrap();
        let (_, engine) = engine(
            base_transport()
                .with_body(ARCHIVE_URL, b"corrupted payload".to_vec())
                .with_body(CHECKSUM_URL, "not-a-digest"),
            temp.path(),
        );

        let acquired = engine.acquire("wiki_test").unwrap();

        assert_eq!(
            acquired.verification,
            Some(Verification::ChecksumMalformed("not-a-digest".to_string()))
        );
        assert!(temp.path().join("wiki_test_2024-02.zim").exists());
    }

    #[test]
    fn test_uppercase_checksum_accepted() {
        let temp = TempDir::new().unwrap();
        let (_, engine) = engine(
            base_transport()
                .with_body(ARCHIVE_URL, PAYLOAD.to_vec())
                .with_body(CHECKSUM_URL, payload_digest().to_ascii_uppercase()),
            temp.path(),
        );

        let acquired = engine.acquire("wiki_test").unwrap();
        assert_eq!(acquired.verification, Some(Verification::Verified));
    }

    #[test]
    fn test_remote_mtime_preserved() {
        let temp = TempDir::new().unwrap();
        let remote = UNIX_EPOCH + Duration::from_secs(1_706_700_000);
        let (_, engine) = engine(
            base_transport().with_dated_body(ARCHIVE_URL, PAYLOAD.to_vec(), remote),
            temp.path(),
        );

        let acquired = engine.acquire("wiki_test").unwrap();

        let modified = fs::metadata(&acquired.path).unwrap().modified().unwrap();
        assert_eq!(modified, remote);
    }

    #[test]
    fn test_stale_part_file_replaced() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("wiki_test_2024-02.zim");
        fs::write(part_path(&target), b"stale garbage from a crash").unwrap();

        let (_, engine) = engine(
            base_transport()
                .with_body(ARCHIVE_URL, PAYLOAD.to_vec())
                .with_body(CHECKSUM_URL, payload_digest()),
            temp.path(),
        );

        let acquired = engine.acquire("wiki_test").unwrap();
        assert_eq!(fs::read(&acquired.path).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_not_found_propagates() {
        let temp = TempDir::new().unwrap();
        let (transport, engine) = engine(
            MemoryTransport::new().with_body(format!("{}/", SOURCE), "empty"),
            temp.path(),
        );

        let err = engine.acquire("wiki_test").unwrap_err();

        assert!(matches!(err, AcquireError::SourceNotFound(_)));
        assert!(transport
            .requests()
            .iter()
            .all(|(kind, _)| *kind != RequestKind::Download));
    }

    #[test]
    fn test_storage_dir_created_on_demand() {
        let temp = TempDir::new().unwrap();
        let storage = temp.path().join("nested").join("zim");
        let (_, engine) = engine(
            base_transport().with_body(ARCHIVE_URL, PAYLOAD.to_vec()),
            &storage,
        );

        let acquired = engine.acquire("wiki_test").unwrap();
        assert!(acquired.path.starts_with(&storage));
    }
}
