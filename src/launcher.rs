//! Starting the game executables
//!
//! Both game variants live next to the launcher. The working directory is set
//! to that folder before starting, the games load their data relative to it.

use crate::config::GamesConfig;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameVariant {
    Original,
    UnfinishedBusiness,
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameVariant::Original => f.write_str("Tomb Raider"),
            GameVariant::UnfinishedBusiness => f.write_str("Unfinished Business"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("{executable} not found, please check the installation directory.")]
    NotFound { executable: String },

    #[error("Failed to start {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed while waiting for {executable}: {source}")]
    Wait {
        executable: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct GameLauncher {
    base_dir: PathBuf,
    original: String,
    unfinished_business: String,
}

impl GameLauncher {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        original: impl Into<String>,
        unfinished_business: impl Into<String>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            original: original.into(),
            unfinished_business: unfinished_business.into(),
        }
    }

    /// Uses the configured folder, or the launcher's own folder if none is set
    pub fn from_config(config: &GamesConfig) -> Self {
        let base_dir = config.base_dir.clone().unwrap_or_else(executable_dir);
        Self::new(base_dir, &config.original, &config.unfinished_business)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn executable(&self, variant: GameVariant) -> &str {
        match variant {
            GameVariant::Original => &self.original,
            GameVariant::UnfinishedBusiness => &self.unfinished_business,
        }
    }

    pub fn executable_path(&self, variant: GameVariant) -> PathBuf {
        self.base_dir.join(self.executable(variant))
    }

    /// Starts the game and waits until it exits
    pub async fn launch(&self, variant: GameVariant) -> Result<ExitStatus, LaunchError> {
        let executable = self.executable(variant).to_string();
        let path = self.executable_path(variant);
        info!("Launching {} from {}", variant, path.display());

        let mut child = Command::new(&path)
            .current_dir(&self.base_dir)
            .spawn()
            .map_err(|source| {
                if source.kind() == io::ErrorKind::NotFound {
                    warn!("{} not found in {}", executable, self.base_dir.display());
                    LaunchError::NotFound {
                        executable: executable.clone(),
                    }
                } else {
                    LaunchError::Spawn {
                        executable: executable.clone(),
                        source,
                    }
                }
            })?;

        let status = child
            .wait()
            .await
            .map_err(|source| LaunchError::Wait { executable, source })?;

        info!("{} exited with {}", variant, status);
        Ok(status)
    }
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| {
            warn!("Could not determine launcher directory, using current directory");
            PathBuf::from(".")
        })
}
