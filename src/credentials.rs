//! Credential resolution
//!
//! An empty credentials setting means "use whatever the environment
//! provides" (application default credentials). Anything else is a path to
//! a service account key file, which must be readable before any backend
//! is built.

use crate::error::{CacheError, CacheResult};
use crate::store::BlobStoreError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Where credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Ambient discovery (environment, metadata server, gcloud config)
    ApplicationDefault,
    /// Explicit key file
    File(PathBuf),
}

impl CredentialSource {
    /// Interpret the `credentials` setting
    pub fn from_setting(setting: &str) -> Self {
        let trimmed = setting.trim();
        if trimmed.is_empty() {
            Self::ApplicationDefault
        } else {
            Self::File(PathBuf::from(trimmed))
        }
    }

    /// Check that the source is usable and return it resolved
    ///
    /// A key file that is missing, unreadable or empty fails with
    /// [`CacheError::CredentialLoad`].
    pub async fn resolve(&self) -> CacheResult<ResolvedCredentials> {
        match self {
            Self::ApplicationDefault => {
                debug!("Using application default credentials");
                Ok(ResolvedCredentials::ApplicationDefault)
            }
            Self::File(path) => {
                let content = fs::read(path).await.map_err(|e| CacheError::CredentialLoad {
                    path: path.clone(),
                    source: BlobStoreError::Io(e),
                })?;

                if content.iter().all(u8::is_ascii_whitespace) {
                    return Err(CacheError::CredentialLoad {
                        path: path.clone(),
                        source: BlobStoreError::Credentials("credential file is empty".to_string()),
                    });
                }

                debug!("Using credentials from {}", path.display());
                Ok(ResolvedCredentials::File(path.clone()))
            }
        }
    }
}

/// A credential source that passed resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    ApplicationDefault,
    File(PathBuf),
}

impl ResolvedCredentials {
    /// Key file path, if explicit credentials were configured
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::ApplicationDefault => None,
            Self::File(path) => Some(path),
        }
    }
}
