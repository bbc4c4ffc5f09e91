//! SHA-256 checksum records and file verification.
//!
//! Mirrors publish a `<archive>.sha256` sibling whose first whitespace-delimited
//! token is the hex digest (the usual `sha256sum` output format). A record that
//! is absent or malformed means the archive is accepted unverified.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::{AcquireError, AcquireResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Length of a hex-encoded SHA-256 digest.
const SHA256_HEX_LEN: usize = 64;

/// A parsed checksum record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumRecord {
    /// A well-formed digest, normalised to lowercase hex.
    Sha256(String),
    /// The record exists but its first token is not 64 hex digits.
    Malformed(String),
}

impl ChecksumRecord {
    /// Parse the body of a `.sha256` resource.
    ///
    /// # Examples
    ///
    /// ```
    /// use zimvault::acquire::ChecksumRecord;
    ///
    /// let record = ChecksumRecord::parse(
    ///     "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9  hello.txt\n",
    /// );
    /// assert_eq!(
    ///     record,
    ///     ChecksumRecord::Sha256(
    ///         "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9".to_string()
    ///     )
    /// );
    ///
    /// assert!(matches!(ChecksumRecord::parse("<html>404</html>"), ChecksumRecord::Malformed(_)));
    /// ```
    pub fn parse(body: &str) -> Self {
        let token = body.split_whitespace().next().unwrap_or("");
        if token.len() == SHA256_HEX_LEN && token.chars().all(|c| c.is_ascii_hexdigit()) {
            ChecksumRecord::Sha256(token.to_ascii_lowercase())
        } else {
            ChecksumRecord::Malformed(token.chars().take(80).collect())
        }
    }
}

/// Calculate SHA-256 checksum of a file.
///
/// # Returns
///
/// The lowercase hexadecimal SHA-256 hash of the file contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn calculate_file_checksum(path: &Path) -> AcquireResult<String> {
    let mut file = File::open(path).map_err(|e| AcquireError::Storage {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| AcquireError::Storage {
            path: path.to_path_buf(),
            source: e,
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that a file matches an expected checksum.
///
/// The comparison is case-insensitive. `filename` names the archive in the
/// error, since `path` is usually the temporary download path.
pub fn verify_checksum(path: &Path, filename: &str, expected: &str) -> AcquireResult<()> {
    let actual = calculate_file_checksum(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(AcquireError::IntegrityFailed {
            filename: filename.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
