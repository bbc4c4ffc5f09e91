//! Backup configuration.
//!
//! Configuration is read once from an INI file plus `ZIMVAULT_*`
//! environment overrides, validated, and then passed by reference to every
//! component. Nothing reads process-wide settings after startup.
//!
//! ```ini
//! [storage]
//! storage_dir = /srv/backup/zim
//! max_bytes = 400G
//!
//! [archive]
//! archive_basename = wikipedia_en_all_maxi
//! sources = https://download.kiwix.org/zim/wikipedia https://mirror.example/kiwix/zim/wikipedia
//!
//! [repositories]
//! mirror_dir = /srv/backup/git
//! repositories = kiwix/kiwix-tools openzim/libzim
//!
//! [binaries]
//! binaries_dir = /srv/backup/bin
//! binaries = kiwix/kiwix-desktop=\.AppImage$
//!
//! [packages]
//! packages_dir = /srv/backup/packages
//! releases = jammy noble
//! packages = kiwix-tools zim-tools
//! ```

mod keys;
mod loader;

pub use keys::{env_var, CONFIG_ENV, ENV_PREFIX};
pub use loader::{default_config_path, load_raw, locate_config_file, RawSettings};

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{EscapePolicy, Ini, WriteOption};
use regex::Regex;
use thiserror::Error;

use crate::transport::{
    HttpTimeouts, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TRANSFER_TIMEOUT_SECS,
};
use crate::units::{format_size, parse_size};

/// Default archive file extension.
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "zim";

/// Default percentage added to the incoming-size estimate.
pub const DEFAULT_HEADROOM_MARGIN_PERCENT: u64 = 10;

/// Default age after which a run lock is considered abandoned.
pub const DEFAULT_LOCK_STALE_HOURS: u64 = 48;

/// Default limit on a single git command (clone, pull, fetch or reset).
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 60 * 60;

/// Default base URL for `owner/name` repository identifiers.
pub const DEFAULT_REPO_BASE_URL: &str = "https://github.com";

/// Default GitHub REST API endpoint.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Default Debian-style package mirror.
pub const DEFAULT_PACKAGE_MIRROR: &str = "http://archive.ubuntu.com/ubuntu";

/// Default package components searched, in order.
pub const DEFAULT_PACKAGE_COMPONENTS: &[&str] = &["main", "universe"];

/// Default package architecture.
pub const DEFAULT_PACKAGE_ARCH: &str = "amd64";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or parsed.
    #[error("failed to read config {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    /// A required key has no value.
    #[error("missing required setting '{0}' (set it in config.ini or ZIMVAULT_{upper})", upper = .0.to_ascii_uppercase())]
    Missing(&'static str),

    /// A value could not be interpreted.
    #[error("invalid value for '{key}': {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Primary archive settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Archive family (e.g. `wikipedia_en_all_maxi`).
    pub basename: String,
    /// File extension without the dot.
    pub extension: String,
    /// Candidate source base URLs, primary first.
    pub sources: Vec<String>,
}

/// Repository mirror settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub mirror_dir: PathBuf,
    /// `owner/name` identifiers or full clone URLs.
    pub repositories: Vec<String>,
    pub base_url: String,
    pub git_binary: String,
    /// Limit on each git command; the child is killed when it expires.
    pub git_timeout: Duration,
}

/// A release source for binary assets.
#[derive(Debug, Clone)]
pub struct BinarySource {
    /// `owner/repo` on GitHub.
    pub repo: String,
    /// Asset names to download.
    pub pattern: Regex,
}

impl PartialEq for BinarySource {
    fn eq(&self, other: &Self) -> bool {
        self.repo == other.repo && self.pattern.as_str() == other.pattern.as_str()
    }
}

impl Eq for BinarySource {}

impl BinarySource {
    /// Parse `owner/repo=<regex>`.
    pub fn parse(entry: &str) -> Result<Self, String> {
        let (repo, pattern) = entry
            .split_once('=')
            .ok_or_else(|| "expected owner/repo=<regex>".to_string())?;
        let repo = repo.trim();
        if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(format!("'{}' is not owner/repo", repo));
        }
        let pattern = Regex::new(pattern.trim()).map_err(|e| e.to_string())?;
        Ok(Self {
            repo: repo.to_string(),
            pattern,
        })
    }
}

/// Binary asset settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryConfig {
    pub binaries_dir: PathBuf,
    pub sources: Vec<BinarySource>,
    pub api_url: String,
}

/// Package bundle settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConfig {
    pub packages_dir: PathBuf,
    pub packages: Vec<String>,
    /// Platform release tags (e.g. `jammy`).
    pub releases: Vec<String>,
    pub mirror: String,
    pub components: Vec<String>,
    pub arch: String,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Append-only log file; stdout only when unset.
    pub file: Option<PathBuf>,
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

/// Complete, validated configuration for a backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Managed archive storage directory.
    pub storage_dir: PathBuf,
    /// Byte ceiling for archives in `storage_dir`.
    pub max_bytes: u64,
    /// Percentage added to the incoming archive size estimate.
    pub headroom_margin_percent: u64,
    /// Age after which a leftover run lock is replaced.
    pub lock_stale_after: Duration,
    pub archive: ArchiveConfig,
    pub repositories: RepositoryConfig,
    pub binaries: BinaryConfig,
    pub packages: PackageConfig,
    pub timeouts: HttpTimeouts,
    pub log: LogConfig,
}

/// Every recognised configuration key.
pub fn all_keys() -> impl Iterator<Item = &'static str> {
    keys::ALL.iter().map(|&(_, key)| key)
}

/// Split a list value on commas and whitespace.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("zimvault"))
        .unwrap_or_else(|| PathBuf::from("zimvault-data"))
}

fn parse_u64(raw: &RawSettings, key: &'static str, default: u64) -> ConfigResult<u64> {
    match raw.get(key) {
        None => Ok(default),
        Some(value) => value.parse::<u64>().map_err(|e| ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn secs(raw: &RawSettings, key: &'static str, default: u64) -> ConfigResult<Duration> {
    let value = parse_u64(raw, key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "timeout must be positive".to_string(),
        });
    }
    Ok(Duration::from_secs(value))
}

fn hours(raw: &RawSettings, key: &'static str, default: u64) -> ConfigResult<Duration> {
    let value = parse_u64(raw, key, default)?;
    value
        .checked_mul(60 * 60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "too many hours".to_string(),
        })
}

fn path_or(raw: &RawSettings, key: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
    raw.get(key).map(PathBuf::from).unwrap_or_else(default)
}

fn string_or(raw: &RawSettings, key: &str, default: &str) -> String {
    raw.get(key).unwrap_or(default).to_string()
}

fn list(raw: &RawSettings, key: &str) -> Vec<String> {
    raw.get(key).map(parse_list).unwrap_or_default()
}

impl BackupConfig {
    /// Validate raw settings.
    ///
    /// `storage_dir`, `max_bytes`, `archive_basename` and `sources` are
    /// required; everything else has a default.
    pub fn from_raw(raw: &RawSettings) -> ConfigResult<Self> {
        let storage_dir = raw
            .get(keys::STORAGE_DIR)
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing(keys::STORAGE_DIR))?;

        let max_bytes_str = raw
            .get(keys::MAX_BYTES)
            .ok_or(ConfigError::Missing(keys::MAX_BYTES))?;
        let max_bytes = parse_size(max_bytes_str).map_err(|e| ConfigError::Invalid {
            key: keys::MAX_BYTES,
            value: max_bytes_str.to_string(),
            reason: e.to_string(),
        })?;

        let basename = raw
            .get(keys::ARCHIVE_BASENAME)
            .ok_or(ConfigError::Missing(keys::ARCHIVE_BASENAME))?
            .to_string();
        if basename.contains('/') {
            return Err(ConfigError::Invalid {
                key: keys::ARCHIVE_BASENAME,
                value: basename,
                reason: "must be a bare name".to_string(),
            });
        }

        let extension = string_or(raw, keys::ARCHIVE_EXTENSION, DEFAULT_ARCHIVE_EXTENSION)
            .trim_start_matches('.')
            .to_string();
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Invalid {
                key: keys::ARCHIVE_EXTENSION,
                value: extension,
                reason: "must be alphanumeric".to_string(),
            });
        }

        let sources = list(raw, keys::SOURCES);
        if sources.is_empty() {
            return Err(ConfigError::Missing(keys::SOURCES));
        }

        let binary_sources = raw
            .get(keys::BINARIES)
            .map(|value| {
                value
                    .split(|c: char| c == ';' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(|entry| {
                        BinarySource::parse(entry).map_err(|reason| ConfigError::Invalid {
                            key: keys::BINARIES,
                            value: entry.to_string(),
                            reason,
                        })
                    })
                    .collect::<ConfigResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let components = match raw.get(keys::PACKAGE_COMPONENTS) {
            Some(value) => parse_list(value),
            None => DEFAULT_PACKAGE_COMPONENTS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        };

        let data_dir = default_data_dir();

        Ok(Self {
            max_bytes,
            headroom_margin_percent: parse_u64(
                raw,
                keys::HEADROOM_MARGIN_PERCENT,
                DEFAULT_HEADROOM_MARGIN_PERCENT,
            )?,
            lock_stale_after: hours(raw, keys::LOCK_STALE_HOURS, DEFAULT_LOCK_STALE_HOURS)?,
            archive: ArchiveConfig {
                basename,
                extension,
                sources,
            },
            repositories: RepositoryConfig {
                mirror_dir: path_or(raw, keys::MIRROR_DIR, || data_dir.join("mirrors")),
                repositories: list(raw, keys::REPOSITORIES),
                base_url: string_or(raw, keys::REPO_BASE_URL, DEFAULT_REPO_BASE_URL),
                git_binary: string_or(raw, keys::GIT_BINARY, "git"),
                git_timeout: secs(raw, keys::GIT_TIMEOUT_SECS, DEFAULT_GIT_TIMEOUT_SECS)?,
            },
            binaries: BinaryConfig {
                binaries_dir: path_or(raw, keys::BINARIES_DIR, || data_dir.join("binaries")),
                sources: binary_sources,
                api_url: string_or(raw, keys::GITHUB_API_URL, DEFAULT_GITHUB_API_URL),
            },
            packages: PackageConfig {
                packages_dir: path_or(raw, keys::PACKAGES_DIR, || data_dir.join("packages")),
                packages: list(raw, keys::PACKAGES),
                releases: list(raw, keys::RELEASES),
                mirror: string_or(raw, keys::PACKAGE_MIRROR, DEFAULT_PACKAGE_MIRROR),
                components,
                arch: string_or(raw, keys::PACKAGE_ARCH, DEFAULT_PACKAGE_ARCH),
            },
            timeouts: HttpTimeouts {
                connect: secs(raw, keys::CONNECT_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS)?,
                request: secs(raw, keys::REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS)?,
                transfer: secs(
                    raw,
                    keys::TRANSFER_TIMEOUT_SECS,
                    DEFAULT_TRANSFER_TIMEOUT_SECS,
                )?,
            },
            log: LogConfig {
                file: raw.get(keys::LOG_FILE).map(PathBuf::from),
                level: string_or(raw, keys::LOG_LEVEL, DEFAULT_LOG_LEVEL),
            },
            storage_dir,
        })
    }

    /// Load from an explicit file, `$ZIMVAULT_CONFIG` or the default location,
    /// with environment overrides from the process environment.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let (raw, _) = load_raw(explicit, |name| std::env::var(name).ok())?;
        Self::from_raw(&raw)
    }

    /// Render the effective configuration as INI.
    pub fn to_ini(&self) -> Ini {
        let join = |items: &[String]| items.join(" ");
        let mut ini = Ini::new();

        ini.with_section(Some("storage"))
            .set(keys::STORAGE_DIR, self.storage_dir.display().to_string())
            .set(keys::MAX_BYTES, self.max_bytes.to_string())
            .set(
                keys::HEADROOM_MARGIN_PERCENT,
                self.headroom_margin_percent.to_string(),
            )
            .set(
                keys::LOCK_STALE_HOURS,
                (self.lock_stale_after.as_secs() / 3600).to_string(),
            );
        ini.with_section(Some("archive"))
            .set(keys::ARCHIVE_BASENAME, self.archive.basename.as_str())
            .set(keys::ARCHIVE_EXTENSION, self.archive.extension.as_str())
            .set(keys::SOURCES, join(&self.archive.sources));
        ini.with_section(Some("repositories"))
            .set(
                keys::MIRROR_DIR,
                self.repositories.mirror_dir.display().to_string(),
            )
            .set(keys::REPOSITORIES, join(&self.repositories.repositories))
            .set(keys::REPO_BASE_URL, self.repositories.base_url.as_str())
            .set(keys::GIT_BINARY, self.repositories.git_binary.as_str())
            .set(
                keys::GIT_TIMEOUT_SECS,
                self.repositories.git_timeout.as_secs().to_string(),
            );
        ini.with_section(Some("binaries"))
            .set(
                keys::BINARIES_DIR,
                self.binaries.binaries_dir.display().to_string(),
            )
            .set(
                keys::BINARIES,
                self.binaries
                    .sources
                    .iter()
                    .map(|s| format!("{}={}", s.repo, s.pattern.as_str()))
                    .collect::<Vec<_>>()
                    .join(" "),
            )
            .set(keys::GITHUB_API_URL, self.binaries.api_url.as_str());
        ini.with_section(Some("packages"))
            .set(
                keys::PACKAGES_DIR,
                self.packages.packages_dir.display().to_string(),
            )
            .set(keys::PACKAGES, join(&self.packages.packages))
            .set(keys::RELEASES, join(&self.packages.releases))
            .set(keys::PACKAGE_MIRROR, self.packages.mirror.as_str())
            .set(keys::PACKAGE_COMPONENTS, join(&self.packages.components))
            .set(keys::PACKAGE_ARCH, self.packages.arch.as_str());
        ini.with_section(Some("network"))
            .set(
                keys::CONNECT_TIMEOUT_SECS,
                self.timeouts.connect.as_secs().to_string(),
            )
            .set(
                keys::REQUEST_TIMEOUT_SECS,
                self.timeouts.request.as_secs().to_string(),
            )
            .set(
                keys::TRANSFER_TIMEOUT_SECS,
                self.timeouts.transfer.as_secs().to_string(),
            );
        let log_file = self
            .log
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        ini.with_section(Some("logging"))
            .set(keys::LOG_FILE, log_file)
            .set(keys::LOG_LEVEL, self.log.level.as_str());

        ini
    }

    /// The effective configuration as INI text, values written verbatim.
    pub fn render_ini(&self) -> String {
        let mut out = Vec::new();
        let options = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..WriteOption::default()
        };
        // Writing into a Vec cannot fail
        let _ = self.to_ini().write_to_opt(&mut out, options);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// One-line summary for the run log.
    pub fn summary(&self) -> String {
        format!(
            "archive={} storage={} quota={} sources={} repos={} binaries={} packages={}x{}",
            self.archive.basename,
            self.storage_dir.display(),
            format_size(self.max_bytes),
            self.archive.sources.len(),
            self.repositories.repositories.len(),
            self.binaries.sources.len(),
            self.packages.packages.len(),
            self.packages.releases.len()
        )
    }
}
