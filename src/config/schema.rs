//! Configuration schema for artifact-cache
//!
//! Configuration is stored at `~/.config/artifact-cache/config.toml`

use crate::store::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache service settings
    pub cache: CacheConfig,

    /// Local filesystem backend settings
    pub local: LocalConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Cache service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage backend
    pub backend: BackendKind,

    /// Path to a credential file; empty means application default credentials
    pub credentials: String,

    /// Bucket holding the cache entries
    pub bucket: String,

    /// Minimum age in seconds of the retention marker before a read bumps
    /// it; zero or negative disables refreshing
    #[serde(alias = "refreshAfterSeconds")]
    pub refresh_after_seconds: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gcs,
            credentials: String::new(),
            bucket: String::new(),
            refresh_after_seconds: 0,
        }
    }
}

/// Local filesystem backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory whose subdirectories are buckets
    pub root: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("artifact-cache"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for this crate's events when `RUST_LOG` is unset
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}
