//! Package bundle fetching from a Debian-style mirror.
//!
//! For every release the compressed `Packages.gz` index of each component is
//! read once. Each configured package resolves to the last stanza naming it,
//! and its `.deb` is downloaded into `<packages_dir>/<release>/`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Delegate, DelegateError, DelegateResult, DelegateSummary};
use crate::acquire::{calculate_file_checksum, AcquireError};
use crate::config::PackageConfig;
use crate::transport::{
    apply_remote_mtime, join_url, part_path, remove_if_exists, url_file_name, Transport,
    TransportError,
};

/// Failure to fetch one package or read one index.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to decompress {url}: {source}")]
    Decompress { url: String, source: io::Error },

    #[error("not found in package index")]
    NotInIndex,

    #[error("invalid Filename '{0}'")]
    InvalidFilename(String),

    #[error("checksum mismatch for {file_name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file_name: String,
        expected: String,
        actual: String,
    },

    #[error("failed to hash download: {0}")]
    Hash(#[from] AcquireError),

    #[error("failed to commit {}: {source}", path.display())]
    Commit { path: PathBuf, source: io::Error },
}

/// The fields of a `Packages` index stanza used for fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStanza {
    pub package: String,
    pub version: Option<String>,
    /// Pool path relative to the mirror root.
    pub filename: String,
    pub sha256: Option<String>,
}

/// Parse a decompressed `Packages` index.
///
/// Stanzas are separated by blank lines. Continuation lines and fields other
/// than `Package`, `Version`, `Filename` and `SHA256` are ignored, as are
/// stanzas without a `Package` or `Filename`.
pub fn parse_packages_index(text: &str) -> Vec<PackageStanza> {
    let mut stanzas = Vec::new();
    let mut current = StanzaFields::default();

    for line in text.lines() {
        if line.trim().is_empty() {
            stanzas.extend(current.finish());
            continue;
        }
        if line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match field {
            "Package" => current.package = value,
            "Version" => current.version = value,
            "Filename" => current.filename = value,
            "SHA256" => current.sha256 = value,
            _ => {}
        }
    }
    stanzas.extend(current.finish());

    stanzas
}

#[derive(Default)]
struct StanzaFields {
    package: Option<String>,
    version: Option<String>,
    filename: Option<String>,
    sha256: Option<String>,
}

impl StanzaFields {
    fn finish(&mut self) -> Option<PackageStanza> {
        let fields = std::mem::take(self);
        Some(PackageStanza {
            package: fields.package?,
            version: fields.version,
            filename: fields.filename?,
            sha256: fields.sha256,
        })
    }
}

/// Package bundle delegate.
pub struct PackageFetcher {
    transport: Arc<dyn Transport>,
    config: PackageConfig,
}

impl PackageFetcher {
    pub fn new(transport: Arc<dyn Transport>, config: PackageConfig) -> Self {
        Self { transport, config }
    }

    /// URL of the compressed index for a release and component.
    pub fn index_url(&self, release: &str, component: &str) -> String {
        join_url(
            &self.config.mirror,
            &format!(
                "dists/{}/{}/binary-{}/Packages.gz",
                release, component, self.config.arch
            ),
        )
    }

    fn load_index(&self, url: &str) -> Result<Vec<PackageStanza>, PackageError> {
        let compressed = self.transport.get_bytes(url)?;
        let mut text = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut text)
            .map_err(|source| PackageError::Decompress {
                url: url.to_string(),
                source,
            })?;
        Ok(parse_packages_index(&text))
    }

    /// All stanzas for a release, in component order.
    fn release_index(&self, release: &str) -> Vec<PackageStanza> {
        let mut stanzas = Vec::new();
        for component in &self.config.components {
            let url = self.index_url(release, component);
            match self.load_index(&url) {
                Ok(mut index) => {
                    debug!(url = %url, packages = index.len(), "Loaded package index");
                    stanzas.append(&mut index);
                }
                Err(e) => warn!(url = %url, error = %e, "Package index unavailable"),
            }
        }
        stanzas
    }

    /// Download a stanza's `.deb` into `dir`, verifying it before commit.
    ///
    /// Returns `false` when the file is already present.
    fn fetch_stanza(&self, stanza: &PackageStanza, dir: &Path) -> Result<bool, PackageError> {
        let file_name = url_file_name(&stanza.filename)
            .ok_or_else(|| PackageError::InvalidFilename(stanza.filename.clone()))?;
        let dest = dir.join(file_name);
        if dest.exists() {
            debug!(path = %dest.display(), "Package already present");
            return Ok(false);
        }

        let part = part_path(&dest);
        let result = self.download_verified(stanza, file_name, &part, &dest);
        if result.is_err() {
            let _ = remove_if_exists(&part);
        }
        result?;

        info!(path = %dest.display(), version = ?stanza.version, "Package downloaded");
        Ok(true)
    }

    fn download_verified(
        &self,
        stanza: &PackageStanza,
        file_name: &str,
        part: &Path,
        dest: &Path,
    ) -> Result<(), PackageError> {
        let url = join_url(&self.config.mirror, &stanza.filename);
        let transfer = self.transport.download(&url, part)?;

        if let Some(expected) = &stanza.sha256 {
            let actual = calculate_file_checksum(part)?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(PackageError::ChecksumMismatch {
                    file_name: file_name.to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        apply_remote_mtime(part, transfer.modified);
        fs::rename(part, dest).map_err(|source| PackageError::Commit {
            path: dest.to_path_buf(),
            source,
        })
    }
}

impl Delegate for PackageFetcher {
    fn name(&self) -> &'static str {
        "packages"
    }

    fn run(&self) -> DelegateResult<DelegateSummary> {
        let mut summary = DelegateSummary::default();
        if self.config.packages.is_empty() || self.config.releases.is_empty() {
            debug!("No packages or releases configured");
            return Ok(summary);
        }

        for release in &self.config.releases {
            let dir = self.config.packages_dir.join(release);
            fs::create_dir_all(&dir).map_err(|e| DelegateError::Prepare {
                path: dir.clone(),
                source: e,
            })?;

            let index = self.release_index(release);

            for package in &self.config.packages {
                let item = format!("{}/{}", release, package);
                let Some(stanza) = index.iter().rev().find(|s| &s.package == package) else {
                    warn!(release = %release, package = %package, "Package not found in index");
                    summary.fail(item, PackageError::NotInIndex.to_string());
                    continue;
                };

                match self.fetch_stanza(stanza, &dir) {
                    Ok(true) => summary.fetched.push(item),
                    Ok(false) => summary.skipped.push(item),
                    Err(e) => {
                        warn!(release = %release, package = %package, error = %e, "Package fetch failed");
                        summary.fail(item, e.to_string());
                    }
                }
            }
        }

        Ok(summary)
    }
}
