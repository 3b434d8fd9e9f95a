//! Application configuration

use super::{
    default_data_dir, CacheDefaults, CacheImageDefaults, MessageConfig, OrphanSweepConfig,
    ReconcilerConfig, ThumbnailDefaults, WorkerConfig,
};
use crate::config::migration::Migrate;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config schema version
    pub version: u32,

    /// Data directory path
    pub data_dir: PathBuf,

    /// Logging level
    pub log_level: String,

    /// Defaults for newly-registered cache folders
    pub cache_defaults: CacheDefaults,

    /// Thumbnail generation tunables
    pub thumbnail_defaults: ThumbnailDefaults,

    /// Cache-image generation tunables
    #[serde(default)]
    pub cache_image_defaults: CacheImageDefaults,

    /// Worker pool sizing and broker lease behaviour
    pub workers: WorkerConfig,

    /// Reconciler sweep cadence
    pub reconciler: ReconcilerConfig,

    /// Orphan cache-file sweep cadence
    pub orphan_sweep: OrphanSweepConfig,

    /// Broker durability knobs
    pub messages: MessageConfig,
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let data_dir = default_data_dir()?;
        Self::load_from(&data_dir)
    }

    /// Load configuration from a specific data directory
    pub fn load_from(data_dir: &PathBuf) -> Result<Self> {
        let config_path = data_dir.join("pictura.json");

        if config_path.exists() {
            info!("Loading config from {:?}", config_path);
            let json = fs::read_to_string(&config_path)?;
            let mut config: AppConfig = serde_json::from_str(&json)?;

            if config.version < Self::target_version() {
                info!(
                    "Migrating config from v{} to v{}",
                    config.version,
                    Self::target_version()
                );
                config.migrate()?;
                config.save()?;
            }

            Ok(config)
        } else {
            warn!("No config found, creating default at {:?}", config_path);
            let config = Self::default_with_dir(data_dir.clone());
            config.save()?;
            Ok(config)
        }
    }

    /// Load or create configuration
    pub fn load_or_create(data_dir: &PathBuf) -> Result<Self> {
        Self::load_from(data_dir).or_else(|_| {
            let config = Self::default_with_dir(data_dir.clone());
            config.save()?;
            Ok(config)
        })
    }

    /// Create default configuration with a specific data directory
    pub fn default_with_dir(data_dir: PathBuf) -> Self {
        Self {
            version: Self::target_version(),
            data_dir,
            log_level: "info".to_string(),
            cache_defaults: CacheDefaults::default(),
            thumbnail_defaults: ThumbnailDefaults::default(),
            cache_image_defaults: CacheImageDefaults::default(),
            workers: WorkerConfig::default(),
            reconciler: ReconcilerConfig::default(),
            orphan_sweep: OrphanSweepConfig::default(),
            messages: MessageConfig::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let config_path = self.data_dir.join("pictura.json");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json)?;
        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the path for the logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Get the path of the SQLite store backing the document store
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("pictura.db")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::default_with_dir(data_dir)
    }
}

impl Migrate for AppConfig {
    fn current_version(&self) -> u32 {
        self.version
    }

    fn target_version() -> u32 {
        1
    }

    fn migrate(&mut self) -> Result<()> {
        match self.version {
            0 => {
                self.version = 1;
                Ok(())
            }
            1 => Ok(()),
            v => Err(anyhow!("Unknown config version: {}", v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_creates_a_default_config_when_none_exists() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();

        let config = AppConfig::load_from(&data_dir).unwrap();
        assert_eq!(config.version, AppConfig::target_version());
        assert!(data_dir.join("pictura.json").exists());
    }

    #[test]
    fn load_from_round_trips_a_saved_config() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();

        let mut original = AppConfig::default_with_dir(data_dir.clone());
        original.log_level = "debug".to_string();
        original.save().unwrap();

        let reloaded = AppConfig::load_from(&data_dir).unwrap();
        assert_eq!(reloaded.log_level, "debug");
    }

    #[test]
    fn load_from_migrates_an_old_version_forward_and_persists_it() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();

        let mut stale = AppConfig::default_with_dir(data_dir.clone());
        stale.version = 0;
        let json = serde_json::to_string_pretty(&stale).unwrap();
        fs::create_dir_all(&data_dir).unwrap();
        fs::write(data_dir.join("pictura.json"), json).unwrap();

        let migrated = AppConfig::load_from(&data_dir).unwrap();
        assert_eq!(migrated.version, AppConfig::target_version());

        let persisted = fs::read_to_string(data_dir.join("pictura.json")).unwrap();
        assert!(persisted.contains(&format!("\"version\": {}", AppConfig::target_version())));
    }
}
