//! Configuration keys and their INI sections.
//!
//! Every key name is unique across sections so it can also be given as an
//! environment variable `ZIMVAULT_<KEY>` (upper-cased).

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "ZIMVAULT_";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ZIMVAULT_CONFIG";

pub const STORAGE_DIR: &str = "storage_dir";
pub const MAX_BYTES: &str = "max_bytes";
pub const HEADROOM_MARGIN_PERCENT: &str = "headroom_margin_percent";
pub const LOCK_STALE_HOURS: &str = "lock_stale_hours";

pub const ARCHIVE_BASENAME: &str = "archive_basename";
pub const ARCHIVE_EXTENSION: &str = "archive_extension";
pub const SOURCES: &str = "sources";

pub const MIRROR_DIR: &str = "mirror_dir";
pub const REPOSITORIES: &str = "repositories";
pub const REPO_BASE_URL: &str = "repo_base_url";
pub const GIT_BINARY: &str = "git_binary";
pub const GIT_TIMEOUT_SECS: &str = "git_timeout_secs";

pub const BINARIES_DIR: &str = "binaries_dir";
pub const BINARIES: &str = "binaries";
pub const GITHUB_API_URL: &str = "github_api_url";

pub const PACKAGES_DIR: &str = "packages_dir";
pub const PACKAGES: &str = "packages";
pub const RELEASES: &str = "releases";
pub const PACKAGE_MIRROR: &str = "package_mirror";
pub const PACKAGE_COMPONENTS: &str = "package_components";
pub const PACKAGE_ARCH: &str = "package_arch";

pub const CONNECT_TIMEOUT_SECS: &str = "connect_timeout_secs";
pub const REQUEST_TIMEOUT_SECS: &str = "request_timeout_secs";
pub const TRANSFER_TIMEOUT_SECS: &str = "transfer_timeout_secs";

pub const LOG_FILE: &str = "log_file";
pub const LOG_LEVEL: &str = "log_level";

/// `(section, key)` for every recognised key.
pub const ALL: &[(&str, &str)] = &[
    ("storage", STORAGE_DIR),
    ("storage", MAX_BYTES),
    ("storage", HEADROOM_MARGIN_PERCENT),
    ("storage", LOCK_STALE_HOURS),
    ("archive", ARCHIVE_BASENAME),
    ("archive", ARCHIVE_EXTENSION),
    ("archive", SOURCES),
    ("repositories", MIRROR_DIR),
    ("repositories", REPOSITORIES),
    ("repositories", REPO_BASE_URL),
    ("repositories", GIT_BINARY),
    ("repositories", GIT_TIMEOUT_SECS),
    ("binaries", BINARIES_DIR),
    ("binaries", BINARIES),
    ("binaries", GITHUB_API_URL),
    ("packages", PACKAGES_DIR),
    ("packages", PACKAGES),
    ("packages", RELEASES),
    ("packages", PACKAGE_MIRROR),
    ("packages", PACKAGE_COMPONENTS),
    ("packages", PACKAGE_ARCH),
    ("network", CONNECT_TIMEOUT_SECS),
    ("network", REQUEST_TIMEOUT_SECS),
    ("network", TRANSFER_TIMEOUT_SECS),
    ("logging", LOG_FILE),
    ("logging", LOG_LEVEL),
];

/// Environment variable name for a key.
pub fn env_var(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())
}
