//! Runtime configuration
//!
//! TOML configuration for the deployable runtime: event-chain layout and the
//! program to load. Anything absent falls back to defaults, so an empty file
//! is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use block_runtime::ChainsConfig;

/// Errors from reading the runtime configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration for one deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Event-chain layout
    #[serde(default)]
    pub chains: ChainsConfig,

    /// Program description to load at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Read a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
