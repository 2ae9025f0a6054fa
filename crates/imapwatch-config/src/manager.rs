use crate::{ConfigError, ConfigFile};
use directories::ProjectDirs;
use imapwatch_core::WatchConfig;
use std::fs;
use std::path::{Path, PathBuf};

const ORG: &str = "io";
const AUTHOR: &str = "imapwatch";
const APP: &str = "imapwatch";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Uses `config.toml` in the platform config directory, creating the
    /// directory so the operator knows where to put the file.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from(ORG, AUTHOR, APP).ok_or(ConfigError::MissingDirectories)?;
        let config_dir = dirs.config_dir().to_path_buf();
        fs::create_dir_all(&config_dir)?;

        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn load(&self) -> Result<WatchConfig, ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let config = ConfigFile::parse(&content)?.into_watch_config()?;
        tracing::debug!(
            path = %self.config_path.display(),
            accounts = config.accounts.len(),
            actions = config.actions.len(),
            "loaded config"
        );
        Ok(config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
