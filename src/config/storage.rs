//! Configuration Storage
//!
//! Handles reading/writing the configuration file.
//! Config location: ~/.remotedeck on macOS/Linux, %APPDATA%\RemoteDeck on Windows

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use super::types::{AppConfig, CONFIG_VERSION};

/// Configuration storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// Get the configuration directory
pub fn config_dir() -> Result<PathBuf, StorageError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("RemoteDeck"));
        }
        dirs::home_dir()
            .map(|home| home.join(".remotedeck"))
            .ok_or(StorageError::NoConfigDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".remotedeck"))
            .ok_or(StorageError::NoConfigDir)
    }
}

/// Get the config file path
pub fn config_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("config.json"))
}

/// Configuration storage manager
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    /// Storage at the default location
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: config_file()?,
        })
    }

    /// Storage at a custom path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load configuration from disk.
    ///
    /// A missing file yields the defaults. A corrupted file is backed up and
    /// replaced by the defaults.
    pub async fn load(&self) -> Result<AppConfig, StorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", self.path);
                return Ok(AppConfig::default());
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        match serde_json::from_str::<AppConfig>(&contents) {
            Ok(config) if config.version > CONFIG_VERSION => Err(StorageError::VersionTooNew {
                found: config.version,
                supported: CONFIG_VERSION,
            }),
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Config file corrupted: {}", e);
                match self.backup().await {
                    Ok(backup_path) => warn!(
                        "Corrupted config backed up to {:?}, using defaults",
                        backup_path
                    ),
                    Err(backup_err) => error!("Failed to backup corrupted config: {}", backup_err),
                }
                Ok(AppConfig::default())
            }
        }
    }

    /// Save configuration to disk (temp file, then rename)
    pub async fn save(&self, config: &AppConfig) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(config)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the current file next to itself with a timestamp suffix
    pub async fn backup(&self) -> Result<PathBuf, StorageError> {
        let backup_path = self.path.with_extension(format!(
            "json.backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));

        if self.exists().await {
            fs::copy(&self.path, &backup_path).await?;
        }

        Ok(backup_path)
    }
}
