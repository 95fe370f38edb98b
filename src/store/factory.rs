//! Backend factory
//!
//! Picks the [`BlobStore`] implementation named in the configuration.

use crate::config::Config;
use crate::credentials::ResolvedCredentials;
use crate::error::{CacheError, CacheResult};
use crate::store::{BlobStore, InMemoryBlobStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Cloud Storage
    Gcs,
    /// Directory tree on a local or shared filesystem
    Local,
    /// Process memory, lost on exit
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcs => write!(f, "gcs"),
            Self::Local => write!(f, "local"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gcs" => Ok(Self::Gcs),
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Create the configured backend
///
/// Only builds the client; the bucket probe happens when the cache
/// service is constructed.
pub async fn create_blob_store(
    config: &Config,
    credentials: &ResolvedCredentials,
) -> CacheResult<Arc<dyn BlobStore>> {
    match config.cache.backend {
        #[cfg(feature = "gcs")]
        BackendKind::Gcs => {
            let store = crate::store::GcsBlobStore::connect(credentials)
                .await
                .map_err(|source| match credentials.file() {
                    Some(path) => CacheError::CredentialLoad {
                        path: path.to_path_buf(),
                        source,
                    },
                    None => CacheError::BucketUnreachable {
                        bucket: config.cache.bucket.clone(),
                        source,
                    },
                })?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "local")]
        BackendKind::Local => Ok(Arc::new(crate::store::LocalBlobStore::new(
            config.local.root.clone(),
        ))),
        BackendKind::Memory => {
            let _ = credentials;
            Ok(Arc::new(InMemoryBlobStore::with_bucket(&config.cache.bucket)))
        }
        #[allow(unreachable_patterns)]
        other => Err(CacheError::BackendUnsupported(other.to_string())),
    }
}
