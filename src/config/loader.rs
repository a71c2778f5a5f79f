//! Configuration file loader.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::SpawnOptions;

/// Defaults for runs started from the command line, loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Exit code treated as success.
    pub expected_exit_code: i32,
    /// Treat every exit code as success.
    pub ignore_exit_code: bool,
    /// Relative timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl SpawnConfig {
    /// Build options for `command` carrying these defaults.
    #[must_use]
    pub fn to_options(&self, command: Vec<String>) -> SpawnOptions {
        SpawnOptions {
            command,
            expected_exit_code: self.expected_exit_code,
            ignore_exit_code: self.ignore_exit_code,
            timeout_in: self.timeout_ms,
            ..Default::default()
        }
    }
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .spawnctl.toml
        search_paths.push(PathBuf::from(".spawnctl.toml"));

        // 2. User config directory: ~/.config/spawnctl/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("spawnctl").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<SpawnConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(SpawnConfig::default())
    }

    fn load_from_path(path: &PathBuf) -> Result<SpawnConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: SpawnConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;

        if config.expected_exit_code < 0 {
            return Err(ConfigError::InvalidExitCode {
                path: path.clone(),
                code: config.expected_exit_code,
            });
        }
        Ok(config)
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid expected_exit_code {code} in {path}")]
    InvalidExitCode { path: PathBuf, code: i32 },
}
