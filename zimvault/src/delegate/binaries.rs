//! Release asset fetching from the GitHub releases API.

use std::fs;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Delegate, DelegateError, DelegateResult, DelegateSummary};
use crate::config::{BinaryConfig, BinarySource};
use crate::transport::{download_committed, join_url, Transport, TransportError};
use crate::units::format_size;

/// Failure to fetch one release or asset.
#[derive(Debug, Error)]
pub enum BinaryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unreadable release metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("unsafe asset name '{0}'")]
    UnsafeName(String),
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

/// Downloads matching assets of each repository's latest release.
pub struct BinaryFetcher {
    transport: Arc<dyn Transport>,
    config: BinaryConfig,
}

impl BinaryFetcher {
    pub fn new(transport: Arc<dyn Transport>, config: BinaryConfig) -> Self {
        Self { transport, config }
    }

    fn latest_release_url(&self, source: &BinarySource) -> String {
        join_url(
            &self.config.api_url,
            &format!("repos/{}/releases/latest", source.repo),
        )
    }

    fn latest_release(&self, url: &str) -> Result<Release, BinaryError> {
        let body = self.transport.get_text(url)?;
        Ok(serde_json::from_str(&body)?)
    }

    fn fetch_source(&self, source: &BinarySource, summary: &mut DelegateSummary) {
        let url = self.latest_release_url(source);
        let release = match self.latest_release(&url) {
            Ok(release) => release,
            Err(e) => {
                warn!(repo = %source.repo, url = %url, error = %e, "Failed to read latest release");
                summary.fail(source.repo.clone(), e.to_string());
                return;
            }
        };

        let matching: Vec<_> = release
            .assets
            .iter()
            .filter(|asset| source.pattern.is_match(&asset.name))
            .collect();
        debug!(
            repo = %source.repo,
            tag = %release.tag_name,
            assets = release.assets.len(),
            matching = matching.len(),
            "Latest release"
        );
        if matching.is_empty() {
            warn!(repo = %source.repo, tag = %release.tag_name, pattern = %source.pattern, "No release asset matches");
        }

        for asset in matching {
            let item = format!("{}/{}", source.repo, asset.name);
            if asset.name.contains('/') || asset.name.starts_with('.') {
                summary.fail(item, BinaryError::UnsafeName(asset.name.clone()).to_string());
                continue;
            }

            let dest = self.config.binaries_dir.join(&asset.name);
            if dest.exists() {
                debug!(path = %dest.display(), "Asset already present");
                summary.skipped.push(item);
                continue;
            }

            match download_committed(self.transport.as_ref(), &asset.browser_download_url, &dest) {
                Ok(transfer) => {
                    info!(
                        path = %dest.display(),
                        size = %format_size(transfer.bytes),
                        "Release asset downloaded"
                    );
                    summary.fetched.push(item);
                }
                Err(e) => {
                    let e = BinaryError::from(e);
                    warn!(url = %asset.browser_download_url, error = %e, "Release asset download failed");
                    summary.fail(item, e.to_string());
                }
            }
        }
    }
}

impl Delegate for BinaryFetcher {
    fn name(&self) -> &'static str {
        "binaries"
    }

    fn run(&self) -> DelegateResult<DelegateSummary> {
        let mut summary = DelegateSummary::default();
        if self.config.sources.is_empty() {
            debug!("No binary sources configured");
            return Ok(summary);
        }

        fs::create_dir_all(&self.config.binaries_dir).map_err(|e| DelegateError::Prepare {
            path: self.config.binaries_dir.clone(),
            source: e,
        })?;

        for source in &self.config.sources {
            self.fetch_source(source, &mut summary);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, RequestKind};
    use std::path::Path;
    use tempfile::TempDir;

    const API: &str = "https://api.github.test";

    fn release_json(tag: &str, assets: &[&str]) -> String {
        let assets: Vec<String> = assets
            .iter()
            .map(|name| {
                format!(
                    r#"{{"name":"{name}","size":3,"browser_download_url":"https://dl.test/{tag}/{name}"}}"#
                )
            })
            .collect();
        format!(r#"{{"tag_name":"{tag}","assets":[{}]}}"#, assets.join(","))
    }

    fn fetcher(transport: MemoryTransport, dir: &Path, sources: &[&str]) -> BinaryFetcher {
        BinaryFetcher::new(
            Arc::new(transport),
            BinaryConfig {
                binaries_dir: dir.to_path_buf(),
                sources: sources
                    .iter()
                    .map(|s| BinarySource::parse(s).unwrap())
                    .collect(),
                api_url: API.to_string(),
            },
        )
    }

    #[test]
    fn test_downloads_matching_assets_only() {
        let temp = TempDir::new().unwrap();
        let transport = MemoryTransport::new()
            .with_body(
                format!("{}/repos/kiwix/kiwix-desktop/releases/latest", API),
                release_json(
                    "2.4.1",
                    &["kiwix-desktop_x86_64.AppImage", "kiwix-desktop.exe"],
                ),
            )
            .with_body(
                "https://dl.test/2.4.1/kiwix-desktop_x86_64.AppImage",
                b"elf".to_vec(),
            );

        let summary = fetcher(transport, temp.path(), &[r"kiwix/kiwix-desktop=\.AppImage$"])
            .run()
            .unwrap();

        assert_eq!(
            summary.fetched,
            vec!["kiwix/kiwix-desktop/kiwix-desktop_x86_64.AppImage"]
        );
        assert!(summary.is_clean());
        assert_eq!(
            fs::read(temp.path().join("kiwix-desktop_x86_64.AppImage")).unwrap(),
            b"elf"
        );
        assert!(!temp.path().join("kiwix-desktop.exe").exists());
    }

    #[test]
    fn test_existing_asset_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("tool.tar.gz"), b"old").unwrap();
        let transport = MemoryTransport::new().with_body(
            format!("{}/repos/a/tool/releases/latest", API),
            release_json("v1", &["tool.tar.gz"]),
        );
        let fetcher = fetcher(transport, temp.path(), &[r"a/tool=\.tar\.gz$"]);

        let summary = fetcher.run().unwrap();

        assert_eq!(summary.skipped, vec!["a/tool/tool.tar.gz"]);
        assert!(summary.fetched.is_empty());
        assert_eq!(fs::read(temp.path().join("tool.tar.gz")).unwrap(), b"old");
    }

    #[test]
    fn test_failed_source_does_not_stop_others() {
        let temp = TempDir::new().unwrap();
        let transport = MemoryTransport::new()
            .with_status(format!("{}/repos/a/broken/releases/latest", API), 500)
            .with_body(format!("{}/repos/a/garbled/releases/latest", API), "not json")
            .with_body(
                format!("{}/repos/a/ok/releases/latest", API),
                release_json("v2", &["ok.bin"]),
            )
            .with_body("https://dl.test/v2/ok.bin", b"ok".to_vec());

        let summary = fetcher(
            transport,
            temp.path(),
            &["a/broken=.*", "a/garbled=.*", "a/ok=.*"],
        )
        .run()
        .unwrap();

        let failed: Vec<_> = summary.failures.iter().map(|f| f.item.as_str()).collect();
        assert_eq!(failed, vec!["a/broken", "a/garbled"]);
        assert_eq!(summary.fetched, vec!["a/ok/ok.bin"]);
    }

    #[test]
    fn test_latest_release_errors_are_typed() {
        let temp = TempDir::new().unwrap();
        let transport = MemoryTransport::new()
            .with_body(format!("{}/repos/a/garbled/releases/latest", API), "not json");
        let fetcher = fetcher(transport, temp.path(), &[]);

        assert!(matches!(
            fetcher.latest_release(&format!("{}/repos/a/garbled/releases/latest", API)),
            Err(BinaryError::Metadata(_))
        ));
        match fetcher.latest_release(&format!("{}/repos/a/missing/releases/latest", API)) {
            Err(BinaryError::Transport(e)) => assert!(e.is_not_found()),
            other => panic!("Expected Transport error, got {:?}", other),
        }
    }

    #[test]
    fn test_interrupted_asset_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let transport = MemoryTransport::new()
            .with_body(
                format!("{}/repos/a/tool/releases/latest", API),
                release_json("v1", &["tool.bin"]),
            )
            .with_interruption("https://dl.test/v1/tool.bin", b"to".to_vec());

        let summary = fetcher(transport, temp.path(), &["a/tool=.*"]).run().unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert!(!temp.path().join("tool.bin").exists());
        assert!(!temp.path().join("tool.bin.part").exists());
    }

    #[test]
    fn test_no_sources_makes_no_requests() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let fetcher = BinaryFetcher::new(
            transport.clone(),
            BinaryConfig {
                binaries_dir: temp.path().join("bin"),
                sources: Vec::new(),
                api_url: API.to_string(),
            },
        );

        fetcher.run().unwrap();

        assert!(transport.requests().is_empty());
        assert_eq!(transport.count(RequestKind::Get, API), 0);
    }
}
