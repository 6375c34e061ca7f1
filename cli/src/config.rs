//! Optional TOML configuration.
//!
//! Looked up at `<config dir>/goback/config.toml` unless `--config` names a
//! file. Command-line flags and environment variables win over the file.

use crate::validate::ValidationError;
use directories::ProjectDirs;
use goback_core::archive::DEFAULT_COMPRESSION_LEVEL;
use goback_core::backup::DEFAULT_RETENTION_DAYS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub incremental: bool,
    pub retention_days: i64,
    pub compression_level: u32,
    /// Re-hash files the size/mtime check considers unchanged.
    pub checksum: bool,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            incremental: false,
            retention_days: DEFAULT_RETENTION_DAYS,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            checksum: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// trace, debug, info, warn or error
    pub level: Option<String>,
}

impl Config {
    /// An explicit path must be readable; the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ValidationError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::Config {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        toml::from_str(&content).map_err(|e| invalid(e.to_string()))
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "goback").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
