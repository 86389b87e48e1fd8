// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration management for the stress tool.

use rtring::RingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("No config directory found")]
    NoConfigDir,
}

/// Stress run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressConfig {
    /// Number of records pushed through the buffer.
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Largest payload per record, excluding the 4-byte length header.
    #[serde(default = "default_max_record")]
    pub max_record: usize,
    /// Seed for payload sizes and contents.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub ring: RingConfig,
}

fn default_iterations() -> u64 {
    100_000
}

fn default_max_record() -> usize {
    512
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            max_record: default_max_record(),
            seed: 0,
            ring: RingConfig::default(),
        }
    }
}

impl StressConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Configuration manager handles loading and saving config files.
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a config manager rooted at the platform config directory.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = directories::ProjectDirs::from("com", "rtring", "rtring")
            .map(|d| d.config_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)?;
        Self::with_dir(config_dir)
    }

    /// Create a config manager rooted at `config_dir`.
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();
        fs::create_dir_all(&config_dir)?;
        debug!("Config directory: {:?}", config_dir);
        Ok(Self { config_dir })
    }

    /// Get the path to a config file.
    fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(name)
    }

    /// Load the stress configuration, falling back to defaults.
    pub fn load_stress_config(&self) -> Result<StressConfig, ConfigError> {
        load_from(&self.config_path("stress.toml"))
    }

    /// Save the stress configuration.
    #[allow(dead_code)]
    pub fn save_stress_config(&self, config: &StressConfig) -> Result<(), ConfigError> {
        let path = self.config_path("stress.toml");
        let content = config.to_toml()?;
        fs::write(&path, content)?;
        debug!("Saved stress config to {:?}", path);
        Ok(())
    }
}

/// Load a stress configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<StressConfig, ConfigError> {
    if !path.exists() {
        debug!("No stress config at {:?}, using defaults", path);
        return Ok(StressConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = StressConfig::from_toml(&content)?;
    info!("Loaded stress config from {:?}", path);
    Ok(config)
}
