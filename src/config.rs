//! # Launcher configuration
//!
//! A single TOML file in `~/.tr1launcher/config.toml`. Every section and field
//! has a default, so a partial file only overrides what it names. A missing
//! file is created with the defaults; a broken file is reported and ignored
//! rather than keeping the launcher from starting.

use crate::controller::ControllerSettings;
use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_DIR: &str = ".tr1launcher";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct LauncherConfig {
    /// Joystick scan/poll timing
    pub controller: ControllerSettings,
    /// Location and names of the game executables
    pub games: GamesConfig,
    pub ui: UIConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GamesConfig {
    /// Folder holding both executables; the launcher's folder when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    pub original: String,
    pub unfinished_business: String,
}

impl Default for GamesConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            original: "tombati.exe".to_string(),
            unfinished_business: "tombub.exe".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct UIConfig {
    pub fullscreen: bool,
    pub title: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            fullscreen: false,
            title: "Tomb Raider I Launcher".to_string(),
        }
    }
}

impl LauncherConfig {
    pub fn config_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| eyre!("Failed to parse config file: {}", e))
    }

    /// Loads the user's config, writing the defaults on first start
    pub async fn load_or_default() -> Result<Self> {
        Self::load_from(&Self::config_path()).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file: {}", e))?;

        match Self::parse(&content) {
            Ok(config) => {
                debug!("Loaded config from {}: {:?}", path.display(), config);
                Ok(config)
            }
            Err(e) => {
                warn!("{} ({}), using defaults", e, path.display());
                Ok(Self::default())
            }
        }
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;

        info!("Config saved to {}", path.display());
        Ok(())
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
