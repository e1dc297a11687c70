//! Configuration for the file-info cache
//!
//! Settings live in the `[cache]` table of a TOML file. Missing files or
//! sections fall back to defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{CacheError, CacheResult};

/// SQLite `synchronous` level applied to the store
///
/// The store is fully derivable from the filesystem, so the default trades
/// durability for ingest speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum SyncMode {
    #[default]
    Off,
    Normal,
    Full,
}

impl SyncMode {
    /// Numeric value of the `synchronous` pragma
    pub fn level(&self) -> i64 {
        match self {
            SyncMode::Off => 0,
            SyncMode::Normal => 1,
            SyncMode::Full => 2,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite synchronous level
    #[serde(default)]
    pub synchronous: SyncMode,

    /// Show a progress bar only when a pass observes more files than this
    #[serde(default = "default_progress_threshold")]
    pub progress_threshold: usize,

    /// How long SQLite waits on a locked store before failing (milliseconds)
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_progress_threshold() -> usize {
    110
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            synchronous: SyncMode::Off,
            progress_threshold: default_progress_threshold(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl CacheConfig {
    /// Load cache config from a TOML file
    ///
    /// Falls back to defaults if the file doesn't exist or has no `[cache]` section.
    pub fn load(config_path: &Path) -> CacheResult<Self> {
        if !config_path.exists() {
            log::debug!("No config file at {:?}, using default cache config", config_path);
            return Ok(Self::default());
        }

        let config_str =
            std::fs::read_to_string(config_path).map_err(|e| CacheError::io(config_path, e))?;

        Self::from_toml_str(&config_str).map_err(|message| CacheError::Config {
            path: config_path.to_path_buf(),
            message,
        })
    }

    /// Parse cache config from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self, String> {
        let toml_value: toml::Value = toml::from_str(config_str).map_err(|e| e.to_string())?;

        match toml_value.get("cache") {
            Some(table) => table
                .clone()
                .try_into()
                .map_err(|e: toml::de::Error| format!("[cache] section: {}", e)),
            None => {
                log::debug!("No [cache] section in config, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.synchronous, SyncMode::Off);
        assert_eq!(config.progress_threshold, 110);
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig::load(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let config = CacheConfig::from_toml_str("[other]\nkey = 1\n").unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_partial_section() {
        let config = CacheConfig::from_toml_str("[cache]\nsynchronous = \"normal\"\n").unwrap();
        assert_eq!(config.synchronous, SyncMode::Normal);
        assert_eq!(config.progress_threshold, 110);
    }

    #[test]
    fn test_full_section_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[cache]\nsynchronous = \"full\"\nprogress_threshold = 10\nbusy_timeout_ms = 250\n",
        )
        .unwrap();

        let config = CacheConfig::load(&path).unwrap();
        assert_eq!(config.synchronous, SyncMode::Full);
        assert_eq!(config.progress_threshold, 10);
        assert_eq!(config.busy_timeout_ms, 250);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[cache]\nsynchronous = \"sometimes\"\n").unwrap();

        let err = CacheConfig::load(&path).unwrap_err();
        assert!(matches!(err, CacheError::Config { .. }));
    }

    #[test]
    fn test_sync_mode_pragma_value() {
        assert_eq!(SyncMode::Off.to_string(), "OFF");
        assert_eq!("normal".parse::<SyncMode>().unwrap(), SyncMode::Normal);
        assert_eq!(SyncMode::Full.level(), 2);
    }
}
