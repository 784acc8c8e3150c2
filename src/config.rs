//! Configuration for nahb-storage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StoryError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nahb-storage")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Shared secret the frontend tier presents on every write
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Accept writes without a secret when none is configured
    #[serde(default)]
    pub dev_mode: bool,

    /// Users promoted to admin at startup
    #[serde(default)]
    pub bootstrap_admins: Vec<String>,

    /// Capacity of the storage event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_http_port() -> u16 {
    5000
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            api_secret: None,
            dev_mode: false,
            bootstrap_admins: Vec::new(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoryError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StoryError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoryError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StoryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject combinations that would leave writes unprotected
    pub fn validate(&self) -> Result<(), StoryError> {
        match &self.api_secret {
            Some(secret) if secret.trim().is_empty() => {
                Err(StoryError::Config("api_secret must not be blank".into()))
            }
            None if !self.dev_mode => Err(StoryError::Config(
                "api_secret is required unless dev_mode is enabled".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("stories.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
