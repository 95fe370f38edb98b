//! artifact-cache - Remote Build Cache
//!
//! Stores build outputs in an object store bucket under caller-supplied
//! keys and keeps entries that are still in use from being collected by the
//! bucket's lifecycle rules, by refreshing each object's custom time on read.
//!
//! ```rust,no_run
//! use artifact_cache::{CacheKey, CacheService, ConfigManager, RemoteArtifactCache};
//!
//! # async fn run() -> artifact_cache::CacheResult<()> {
//! let config = ConfigManager::new().load_effective().await?;
//! let cache = RemoteArtifactCache::initialize(&config).await?;
//!
//! let key = CacheKey::new("9f86d081884c7d659a2feaa0c55ad015")?;
//! cache.store(&key, &mut &b"task output"[..]).await?;
//!
//! let mut restored = Vec::new();
//! if cache.load(&key, &mut restored).await? {
//!     assert_eq!(restored, b"task output");
//! }
//! cache.close().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod key;
pub mod logging;
pub mod retention;
pub mod service;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, ConfigManager};
pub use error::{CacheError, CacheResult, ErrorKind};
pub use key::CacheKey;
pub use retention::RetentionPolicy;
pub use service::{CacheService, RemoteArtifactCache};
pub use store::{BlobStore, BlobStoreError};
