//! Server configuration
//!
//! Loaded from `RETROBOARD_CONFIG` if set, otherwise from `config.toml` in
//! the platform config directory. Missing file means defaults.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine data directory")]
    NoDataDir,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP port to listen on
    pub port: u16,
    /// SQLite file for durable room metadata; resolved under the platform
    /// data directory when unset
    pub db_path: Option<PathBuf>,
    /// Skip durable metadata entirely; rooms then live only in memory
    pub ephemeral: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: retroboard_net::DEFAULT_PORT,
            db_path: None,
            ephemeral: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var_os("RETROBOARD_CONFIG") {
            Some(p) => Some(PathBuf::from(p)),
            None => Self::project_dirs().map(|d| d.config_dir().join("config.toml")),
        };
        match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(&path)?;
                let config: Config = toml::from_str(&raw)?;
                tracing::info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Where the metadata database lives
    pub fn resolve_db_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        let dirs = Self::project_dirs().ok_or(ConfigError::NoDataDir)?;
        Ok(dirs.data_dir().join("retroboard.db"))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("dev", "retroboard", "retroboard")
    }
}
