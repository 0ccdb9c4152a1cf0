//! Mount configuration
//!
//! Handles loading mount settings from xdvdfs.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::xdvdfs::DEFAULT_MAX_PATH_LEN;

/// File name searched for when no config is given on the command line
pub const CONFIG_FILE_NAME: &str = "xdvdfs.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings for one mount
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Longest accepted path inside the image, in bytes
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,
    /// How long the kernel may cache attributes and lookups
    #[serde(default = "default_attr_ttl_secs")]
    pub attr_ttl_secs: u64,
    /// Source name shown in the mount table
    #[serde(default = "default_fs_name")]
    pub fs_name: String,
    #[serde(default)]
    pub allow_other: bool,
    #[serde(default)]
    pub auto_unmount: bool,
}

fn default_max_path_len() -> usize {
    DEFAULT_MAX_PATH_LEN
}

fn default_attr_ttl_secs() -> u64 {
    1
}

fn default_fs_name() -> String {
    "xdvdfs".to_string()
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            max_path_len: default_max_path_len(),
            attr_ttl_secs: default_attr_ttl_secs(),
            fs_name: default_fs_name(),
            allow_other: false,
            auto_unmount: false,
        }
    }
}

impl MountConfig {
    /// Load the configuration.
    ///
    /// An explicit path must exist and parse. Otherwise xdvdfs.json is looked up
    /// in the current directory, then next to the executable, and defaults are
    /// used when neither has one.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_path(path)?;
            log::info!("Loaded config from {}", path.display());
            return Ok(config);
        }

        // Try to load from current directory first
        match Self::load_from_path(CONFIG_FILE_NAME) {
            Ok(config) => {
                log::info!("Loaded config from ./{}", CONFIG_FILE_NAME);
                return Ok(config);
            }
            Err(ConfigError::Parse { path, source }) => {
                log::warn!("Ignoring {}: {}", path.display(), source);
            }
            Err(ConfigError::Io { .. }) => {}
        }

        // Try to load from executable directory
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let config_path = exe_dir.join(CONFIG_FILE_NAME);
                if let Ok(config) = Self::load_from_path(&config_path) {
                    log::info!("Loaded config from {}", config_path.display());
                    return Ok(config);
                }
            }
        }

        log::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Attribute cache lifetime handed to the kernel
    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MountConfig::default();
        assert_eq!(config.max_path_len, 1024);
        assert_eq!(config.attr_ttl(), Duration::from_secs(1));
        assert_eq!(config.fs_name, "xdvdfs");
        assert!(!config.allow_other);
        assert!(!config.auto_unmount);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config: MountConfig = serde_json::from_str(r#"{"allow_other": true}"#).unwrap();
        assert!(config.allow_other);
        assert_eq!(config.max_path_len, 1024);
        assert_eq!(config.fs_name, "xdvdfs");
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_path_len": 255, "fs_name": "halo", "attr_ttl_secs": 30}}"#).unwrap();

        let config = MountConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.max_path_len, 255);
        assert_eq!(config.fs_name, "halo");
        assert_eq!(config.attr_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            MountConfig::load(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let err = MountConfig::load(Some(&broken)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = MountConfig {
            allow_other: true,
            ..MountConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<MountConfig>(&json).unwrap(), config);
    }
}
