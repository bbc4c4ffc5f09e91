//! Loading raw settings from an INI file and the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};
use tracing::debug;

use super::keys;
use super::{ConfigError, ConfigResult};

/// Backslashes are kept verbatim so regex values like `\.tar\.gz` survive.
fn parse_options() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        ..ParseOption::default()
    }
}

/// Key/value settings before validation.
///
/// Later sources override earlier ones: file values first, then environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSettings {
    values: BTreeMap<&'static str, String>,
}

impl RawSettings {
    /// Empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    pub fn set(&mut self, key: &'static str, value: impl Into<String>) -> &mut Self {
        self.values.insert(key, value.into());
        self
    }

    /// Value of a key, with surrounding whitespace removed; empty counts as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Collect recognised keys from an INI document.
    ///
    /// Keys are looked up in their own section, falling back to the
    /// section-less preamble so flat files work too.
    pub fn from_ini(ini: &Ini) -> Self {
        let mut settings = Self::new();
        for &(section, key) in keys::ALL {
            let value = ini
                .get_from(Some(section), key)
                .or_else(|| ini.get_from(None::<&str>, key));
            if let Some(value) = value {
                settings.set(key, value);
            }
        }
        settings
    }

    /// Parse INI text.
    pub fn from_ini_str(text: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str_opt(text, parse_options()).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        Ok(Self::from_ini(&ini))
    }

    /// Read an INI file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let ini = Ini::load_from_file_opt(path, parse_options()).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(Self::from_ini(&ini))
    }

    /// Apply `ZIMVAULT_<KEY>` overrides using `lookup` to read variables.
    pub fn overlay_env<F>(&mut self, lookup: F) -> &mut Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for &(_, key) in keys::ALL {
            if let Some(value) = lookup(&keys::env_var(key)) {
                self.set(key, value);
            }
        }
        self
    }
}

/// Default config file location (`<config dir>/zimvault/config.ini`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("zimvault").join("config.ini"))
}

/// Pick the config file to read.
///
/// An explicit path or `$ZIMVAULT_CONFIG` must exist; the default location
/// is optional.
pub fn locate_config_file<F>(explicit: Option<&Path>, lookup: F) -> ConfigResult<Option<PathBuf>>
where
    F: Fn(&str) -> Option<String>,
{
    let required = explicit
        .map(Path::to_path_buf)
        .or_else(|| lookup(keys::CONFIG_ENV).map(PathBuf::from));

    if let Some(path) = required {
        if !path.is_file() {
            return Err(ConfigError::Read {
                path,
                reason: "file not found".to_string(),
            });
        }
        return Ok(Some(path));
    }

    Ok(default_config_path().filter(|p| p.is_file()))
}

/// Load raw settings from the located file (if any) plus the environment.
pub fn load_raw<F>(explicit: Option<&Path>, lookup: F) -> ConfigResult<(RawSettings, Option<PathBuf>)>
where
    F: Fn(&str) -> Option<String>,
{
    let path = locate_config_file(explicit, &lookup)?;
    let mut settings = match &path {
        Some(path) => RawSettings::from_file(path)?,
        None => RawSettings::new(),
    };
    settings.overlay_env(&lookup);
    Ok((settings, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_sectioned_ini() {
        let settings = RawSettings::from_ini_str(
            "[storage]\nstorage_dir = /srv/zim\nmax_bytes = 400G\n\n[archive]\nsources = https://a https://b\n",
        )
        .unwrap();

        assert_eq!(settings.get(keys::STORAGE_DIR), Some("/srv/zim"));
        assert_eq!(settings.get(keys::MAX_BYTES), Some("400G"));
        assert_eq!(settings.get(keys::SOURCES), Some("https://a https://b"));
    }

    #[test]
    fn test_flat_ini() {
        let settings = RawSettings::from_ini_str("storage_dir = /srv/zim\n").unwrap();
        assert_eq!(settings.get(keys::STORAGE_DIR), Some("/srv/zim"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let settings = RawSettings::from_ini_str("[storage]\ncolour = blue\n").unwrap();
        assert_eq!(settings, RawSettings::new());
    }

    #[test]
    fn test_empty_value_is_unset() {
        let settings = RawSettings::from_ini_str("[logging]\nlog_file =\n").unwrap();
        assert_eq!(settings.get(keys::LOG_FILE), None);
    }

    #[test]
    fn test_backslashes_preserved() {
        let settings =
            RawSettings::from_ini_str("[binaries]\nbinaries = kiwix/kiwix-tools=linux-x86_64\\.tar\\.gz$\n")
                .unwrap();
        assert_eq!(
            settings.get(keys::BINARIES),
            Some(r"kiwix/kiwix-tools=linux-x86_64\.tar\.gz$")
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let mut settings = RawSettings::from_ini_str("[storage]\nmax_bytes = 400G\n").unwrap();
        settings.overlay_env(env(&[("ZIMVAULT_MAX_BYTES", "100G")]));
        assert_eq!(settings.get(keys::MAX_BYTES), Some("100G"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("absent.ini");
        let result = locate_config_file(Some(&missing), env(&[]));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_env_var_locates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("zimvault.ini");
        std::fs::write(&path, "[storage]\nstorage_dir = /data\n").unwrap();

        let (settings, located) =
            load_raw(None, env(&[("ZIMVAULT_CONFIG", path.to_str().unwrap())])).unwrap();

        assert_eq!(located, Some(path));
        assert_eq!(settings.get(keys::STORAGE_DIR), Some("/data"));
    }
}
