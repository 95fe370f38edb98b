//! Object store capability
//!
//! The cache talks to its backing store only through [`BlobStore`]:
//! probe a bucket, put an object, get an object with its metadata, and
//! set the object's custom time. Everything else (auth, transport,
//! retries, timeouts) belongs to the implementation.
//!
//! # Backends
//!
//! | Backend | Feature | Use |
//! |---------|---------|-----|
//! | [`InMemoryBlobStore`] | always | tests, embedding |
//! | [`LocalBlobStore`] | `local` | shared filesystem caches |
//! | `GcsBlobStore` | `gcs` | Google Cloud Storage |

pub mod factory;
#[cfg(feature = "gcs")]
pub mod gcs;
#[cfg(feature = "local")]
pub mod local;
pub mod memory;

pub use factory::{create_blob_store, BackendKind};
#[cfg(feature = "gcs")]
pub use gcs::GcsBlobStore;
#[cfg(feature = "local")]
pub use local::LocalBlobStore;
pub use memory::InMemoryBlobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Result type alias for backend operations
pub type BlobResult<T> = Result<T, BlobStoreError>;

/// Readable byte stream handed across the store boundary
pub type BlobReader = Box<dyn AsyncRead + Unpin + Send>;

/// Errors reported by a backing object store
#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("{}", format_transport(*status, message))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_transport(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Transport error (status {}): {}", code, message),
        None => format!("Transport error: {}", message),
    }
}

impl BlobStoreError {
    /// Create a transport error
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Whether the store is telling us the object does not exist
    ///
    /// Some clients report a missing object through their generic error
    /// path, with only the HTTP status in the message. A stand-alone `404`
    /// token counts; digits inside a longer word (an object name such as
    /// `ab404f`) do not.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Transport { status, message } => {
                *status == Some(404) || message_has_not_found_status(message)
            }
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

fn message_has_not_found_status(message: &str) -> bool {
    message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == "404")
}

/// Metadata the cache needs about a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Object name inside the bucket
    pub name: String,

    /// Size of the object content in bytes
    pub size: u64,

    /// When the current object generation was created
    pub created_at: DateTime<Utc>,

    /// Retention marker, unset until the first refresh
    pub custom_time: Option<DateTime<Utc>>,
}

impl BlobMetadata {
    /// The instant retention was last signalled for this object
    pub fn last_refreshed(&self) -> DateTime<Utc> {
        self.custom_time.unwrap_or(self.created_at)
    }
}

/// An object fetched from the store: its metadata and a content stream
pub struct BlobObject {
    pub metadata: BlobMetadata,
    pub body: BlobReader,
}

impl fmt::Debug for BlobObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobObject")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Object store operations used by the cache
///
/// Implementations must be safe to call concurrently; the cache keeps no
/// locks of its own around them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Check whether `bucket` exists and is visible to these credentials
    ///
    /// Returns `Ok(false)` for a missing bucket. Connectivity and permission
    /// problems are errors.
    async fn bucket_exists(&self, bucket: &str) -> BlobResult<bool>;

    /// Write the whole of `content` to `name`, replacing any existing object
    ///
    /// The object becomes visible only once `content` has been fully read.
    async fn put(
        &self,
        bucket: &str,
        name: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<()>;

    /// Fetch an object and its metadata
    ///
    /// A missing object must be reported so that
    /// [`BlobStoreError::is_not_found`] is true.
    async fn get(&self, bucket: &str, name: &str) -> BlobResult<BlobObject>;

    /// Set the retention marker of an existing object
    async fn set_custom_time(&self, bucket: &str, name: &str, at: DateTime<Utc>)
        -> BlobResult<()>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn not_found_variants() {
        assert!(BlobStoreError::NotFound("k".into()).is_not_found());
        assert!(BlobStoreError::transport(Some(404), "gone").is_not_found());
        assert!(
            BlobStoreError::transport(None, "HTTP status client error (404 Not Found)")
                .is_not_found()
        );
        assert!(BlobStoreError::Io(std::io::Error::from(std::io::ErrorKind::NotFound))
            .is_not_found());
    }

    #[test]
    fn other_errors_are_not_misses() {
        assert!(!BlobStoreError::transport(Some(500), "internal").is_not_found());
        assert!(!BlobStoreError::transport(Some(403), "forbidden").is_not_found());
        assert!(!BlobStoreError::PermissionDenied("x".into()).is_not_found());
    }

    #[test]
    fn status_digits_inside_names_do_not_count() {
        let err = BlobStoreError::transport(None, "timeout reading object ab404cd");
        assert!(!err.is_not_found());
        let err = BlobStoreError::transport(None, "code 4040");
        assert!(!err.is_not_found());
    }

    #[test]
    fn last_refreshed_falls_back_to_creation() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let touched = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let mut meta = BlobMetadata {
            name: "k".into(),
            size: 0,
            created_at: created,
            custom_time: None,
        };
        assert_eq!(meta.last_refreshed(), created);

        meta.custom_time = Some(touched);
        assert_eq!(meta.last_refreshed(), touched);
    }

    #[test]
    fn transport_display_includes_status() {
        let err = BlobStoreError::transport(Some(503), "unavailable");
        assert_eq!(err.to_string(), "Transport error (status 503): unavailable");
    }
}
