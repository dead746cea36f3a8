//! Configuration file support for gwota.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (GWOTA_*)
//! 3. Local config file (./gwota.toml)
//! 4. Global config file (~/.config/gwota/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Upload tuning defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadDefaults {
    /// Resends allowed per sector before the session fails.
    pub sector_retry_limit: Option<u32>,
    /// Milliseconds between acknowledgment polls.
    pub poll_interval_ms: Option<u64>,
    /// Raw sector payload size in bytes.
    pub sector_size: Option<usize>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upload tuning defaults.
    #[serde(default)]
    pub upload: UploadDefaults,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Some(global_config) = Self::load_from_file(&global_path) {
                    debug!("Loaded global config from {}", global_path.display());
                    config.merge(global_config);
                }
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new("gwota.toml")) {
            debug!("Loaded local config from gwota.toml");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gwota").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.upload.sector_retry_limit.is_some() {
            self.upload.sector_retry_limit = other.upload.sector_retry_limit;
        }
        if other.upload.poll_interval_ms.is_some() {
            self.upload.poll_interval_ms = other.upload.poll_interval_ms;
        }
        if other.upload.sector_size.is_some() {
            self.upload.sector_size = other.upload.sector_size;
        }
    }
}
