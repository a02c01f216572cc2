//! Configuration management
//!
//! Uses XDG-compliant paths:
//! - Config: ~/.config/trophycase/config.toml
//! - Data: ~/.local/share/trophycase/

mod paths;

pub use paths::Paths;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Steam Web API key used for catalog and achievement lookups.
    pub steam_api_key: Option<String>,

    /// Override for the sidecar file a watched game writes. When unset
    /// the watcher looks for achievements.json next to the executable.
    pub sidecar_override: Option<String>,

    /// Paths configuration
    #[serde(skip)]
    pub paths: Paths,
}

impl Config {
    /// Load configuration from disk, falling back to defaults when the
    /// file does not exist yet.
    pub async fn load() -> Result<Self> {
        let paths = Paths::new();
        let config_file = paths.config_file();

        if !config_file.exists() {
            return Ok(Self {
                paths,
                ..Default::default()
            });
        }

        let content = fs::read_to_string(&config_file)
            .await
            .context("Failed to read config file")?;
        let mut config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.paths = paths;
        Ok(config)
    }

    /// Persist configuration to disk.
    pub async fn save(&self) -> Result<()> {
        let config_dir = self.paths.config_dir();
        fs::create_dir_all(&config_dir)
            .await
            .context("Failed to create config directory")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(self.paths.config_file(), content)
            .await
            .context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config {
            steam_api_key: Some("ABCDEF0123456789".to_string()),
            sidecar_override: None,
            paths: Paths::new(),
        };

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.steam_api_key.as_deref(), Some("ABCDEF0123456789"));
        assert_eq!(parsed.sidecar_override, None);
    }

    #[test]
    fn test_unknown_and_missing_fields_tolerated() {
        let parsed: Config = toml::from_str("").unwrap();
        assert!(parsed.steam_api_key.is_none());
    }
}
