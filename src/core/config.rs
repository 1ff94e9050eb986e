use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::schema::game_data::RootFlags;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Engine-wide settings, fixed for the lifetime of a `StateEngine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Surface the last failure of each batch through the error sink.
    pub notify_errors: bool,
    /// Seed for `random()` in expressions. `None` draws from entropy.
    pub seed: Option<u64>,
    /// Flags used while the state has no schema yet.
    pub default_flags: RootFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notify_errors: true,
            seed: None,
            default_flags: RootFlags::default(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a config from a RON string. Missing fields take their defaults.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }
}
