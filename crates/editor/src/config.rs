// Local configuration for an editor client.
//
// Global config: `~/.quire/config.toml`

use quire_common::types::Participant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Root directory for Quire client state: `~/.quire/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".quire"))
}

/// Path to the global config file: `~/.quire/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Editor configuration at `~/.quire/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub identity: IdentityConfig,
    pub presence: PresenceConfig,
}

impl EditorConfig {
    /// Load from `~/.quire/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// How this participant appears to others.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl IdentityConfig {
    /// Participant identity for `id`, falling back to a generic name.
    pub fn participant(&self, id: impl Into<String>) -> Participant {
        Participant {
            id: id.into(),
            name: self.display_name.clone().unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_owned()),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PresenceConfig {
    /// Silence after which a participant is dropped from presence.
    pub timeout_ms: u64,
    /// How often expired presence entries are swept.
    pub sweep_interval_ms: u64,
    /// Document updates buffered per connection before it must resync.
    pub update_buffer: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000, sweep_interval_ms: 5_000, update_buffer: 256 }
    }
}

impl PresenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
