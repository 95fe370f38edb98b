//! Error types for artifact-cache
//!
//! All public operations return `CacheResult<T>`. Backend failures are
//! carried as `BlobStoreError` sources so the caller can still see what the
//! object store reported.

use crate::store::BlobStoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Coarse classification of a `CacheError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Construction failed; the service never became usable
    Initialization,
    /// Writing an entry failed
    Store,
    /// Reading an entry failed for a reason other than a miss
    Load,
    /// The service was already closed
    Closed,
    /// Configuration could not be read or is invalid
    Config,
    /// Caller supplied a malformed argument
    InvalidInput,
    /// Local IO unrelated to a specific entry
    Io,
}

/// All errors that can occur in artifact-cache
#[derive(Error, Debug)]
pub enum CacheError {
    // Initialization errors
    #[error("Unable to load credentials from {}", path.display())]
    CredentialLoad {
        path: PathBuf,
        #[source]
        source: BlobStoreError,
    },

    #[error("Unable to access bucket '{bucket}'")]
    BucketUnreachable {
        bucket: String,
        #[source]
        source: BlobStoreError,
    },

    #[error("Bucket '{bucket}' is unavailable")]
    BucketUnavailable { bucket: String },

    #[error("Storage backend '{0}' is not supported by this build")]
    BackendUnsupported(String),

    // Entry errors
    #[error("Unable to store '{key}' in bucket '{bucket}'")]
    Store {
        key: String,
        bucket: String,
        #[source]
        source: BlobStoreError,
    },

    #[error("Unable to load '{key}' from bucket '{bucket}'")]
    Load {
        key: String,
        bucket: String,
        #[source]
        source: BlobStoreError,
    },

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Cache service is closed")]
    Closed,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a store error naming the key and bucket
    pub fn store(
        key: impl Into<String>,
        bucket: impl Into<String>,
        source: BlobStoreError,
    ) -> Self {
        Self::Store {
            key: key.into(),
            bucket: bucket.into(),
            source,
        }
    }

    /// Create a load error naming the key and bucket
    pub fn load(key: impl Into<String>, bucket: impl Into<String>, source: BlobStoreError) -> Self {
        Self::Load {
            key: key.into(),
            bucket: bucket.into(),
            source,
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CredentialLoad { .. }
            | Self::BucketUnreachable { .. }
            | Self::BucketUnavailable { .. }
            | Self::BackendUnsupported(_) => ErrorKind::Initialization,
            Self::Store { .. } => ErrorKind::Store,
            Self::Load { .. } => ErrorKind::Load,
            Self::InvalidKey(_) => ErrorKind::InvalidInput,
            Self::Closed => ErrorKind::Closed,
            Self::ConfigInvalid { .. }
            | Self::ConfigDirCreate { .. }
            | Self::TomlParse(_)
            | Self::TomlSerialize(_) => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Whether this error was raised while constructing the service
    pub fn is_initialization(&self) -> bool {
        self.kind() == ErrorKind::Initialization
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CredentialLoad { .. } => {
                Some("Check the credentials path, or leave it empty to use application default credentials")
            }
            Self::BucketUnreachable { .. } => {
                Some("Verify network access and that the credentials may read bucket metadata")
            }
            Self::BucketUnavailable { .. } => Some("Create the bucket or fix the bucket name"),
            Self::BackendUnsupported(_) => Some("Rebuild with the matching cargo feature enabled"),
            _ => None,
        }
    }
}
