//! Command-line tool configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PROGLOG_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller)

use proglog_log::Config as LogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse config file {0:?}: {1}")]
    ParseError(PathBuf, String),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] proglog_log::LogError),
}

/// Tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory holding segment files.
    pub data_dir: PathBuf,
    /// Limits handed to the storage core.
    pub log: LogConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log: LogConfig::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from `path` if given, then applies environment
    /// variable overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.log.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: CliConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("PROGLOG_DATA") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(bytes) = var("PROGLOG_MAX_STORE_BYTES") {
            match bytes.parse() {
                Ok(n) => self.log.segment.max_store_bytes = n,
                Err(_) => tracing::warn!("ignoring PROGLOG_MAX_STORE_BYTES={}", bytes),
            }
        }

        if let Some(bytes) = var("PROGLOG_MAX_INDEX_BYTES") {
            match bytes.parse() {
                Ok(n) => self.log.segment.max_index_bytes = n,
                Err(_) => tracing::warn!("ignoring PROGLOG_MAX_INDEX_BYTES={}", bytes),
            }
        }
    }
}
