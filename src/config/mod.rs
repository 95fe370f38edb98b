//! Configuration management for artifact-cache

pub mod schema;

pub use schema::{CacheConfig, Config, LocalConfig, LogFormat, LoggingConfig};

use crate::error::{CacheError, CacheResult};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variables that override file settings
pub mod env_vars {
    pub const BACKEND: &str = "ARTIFACT_CACHE_BACKEND";
    pub const CREDENTIALS: &str = "ARTIFACT_CACHE_CREDENTIALS";
    pub const BUCKET: &str = "ARTIFACT_CACHE_BUCKET";
    pub const REFRESH_AFTER_SECONDS: &str = "ARTIFACT_CACHE_REFRESH_AFTER_SECONDS";
    pub const LOCAL_ROOT: &str = "ARTIFACT_CACHE_LOCAL_ROOT";
}

impl Config {
    /// Apply `ARTIFACT_CACHE_*` environment overrides
    ///
    /// `source` names the config file in error messages.
    pub fn apply_env(&mut self, source: &Path) -> CacheResult<()> {
        let invalid = |reason: String| CacheError::ConfigInvalid {
            path: source.to_path_buf(),
            reason,
        };

        if let Ok(value) = env::var(env_vars::BACKEND) {
            self.cache.backend = value
                .parse()
                .map_err(|e| invalid(format!("{}: {}", env_vars::BACKEND, e)))?;
        }
        if let Ok(value) = env::var(env_vars::CREDENTIALS) {
            self.cache.credentials = value;
        }
        if let Ok(value) = env::var(env_vars::BUCKET) {
            self.cache.bucket = value;
        }
        if let Ok(value) = env::var(env_vars::REFRESH_AFTER_SECONDS) {
            self.cache.refresh_after_seconds = value.trim().parse().map_err(|_| {
                invalid(format!(
                    "{}: expected whole seconds, got '{}'",
                    env_vars::REFRESH_AFTER_SECONDS,
                    value
                ))
            })?;
        }
        if let Ok(value) = env::var(env_vars::LOCAL_ROOT) {
            self.local.root = PathBuf::from(value);
        }
        Ok(())
    }

    /// Check settings that have no usable default
    pub fn validate(&self, source: &Path) -> CacheResult<()> {
        if self.cache.bucket.trim().is_empty() {
            return Err(CacheError::ConfigInvalid {
                path: source.to_path_buf(),
                reason: "cache.bucket is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("artifact-cache")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> CacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| CacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the file, apply environment overrides and validate
    pub async fn load_effective(&self) -> CacheResult<Config> {
        let mut config = self.load().await?;
        config.apply_env(&self.config_path)?;
        config.validate(&self.config_path)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> CacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            CacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> CacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
