//! Cache service
//!
//! [`RemoteArtifactCache`] is the piece a build tool talks to. It maps cache
//! keys to objects in one bucket, delivers hits to the caller's writer, and
//! bumps the retention marker of entries that are still being read.
//!
//! # Lifecycle
//!
//! | State | Reached by | `store`/`load` |
//! |-------|------------|----------------|
//! | Ready | [`RemoteArtifactCache::connect`] / [`RemoteArtifactCache::initialize`] | allowed |
//! | Closed | [`CacheService::close`] | fail with [`CacheError::Closed`] |
//!
//! There is no unprobed state: construction fails unless the bucket answered.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::credentials::CredentialSource;
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;
use crate::retention::{self, RefreshOutcome, RetentionPolicy};
use crate::store::{create_blob_store, BlobMetadata, BlobStore};
use async_trait::async_trait;
use std::error::Error as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Operations a build tool invokes on its remote cache
///
/// Streams are borrowed exclusively for the duration of the call. On return
/// the producer has been read to the end and the consumer has been shut
/// down, whatever the outcome.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Store everything `producer` yields under `key`, replacing any
    /// previous entry
    async fn store(
        &self,
        key: &CacheKey,
        producer: &mut (dyn AsyncRead + Unpin + Send),
    ) -> CacheResult<()>;

    /// Copy the entry for `key` into `consumer`
    ///
    /// Returns `Ok(false)` on a miss.
    async fn load(
        &self,
        key: &CacheKey,
        consumer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> CacheResult<bool>;

    /// Stop accepting requests; calling it again does nothing
    async fn close(&self);
}

/// Build cache backed by one object store bucket
pub struct RemoteArtifactCache {
    store: Arc<dyn BlobStore>,
    bucket: String,
    retention: RetentionPolicy,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl RemoteArtifactCache {
    /// Build the service described by `config`
    ///
    /// Resolves credentials, creates the configured backend and probes the
    /// bucket. Every failure is an initialization error.
    pub async fn initialize(config: &Config) -> CacheResult<Self> {
        let credentials = CredentialSource::from_setting(&config.cache.credentials)
            .resolve()
            .await?;
        let store = create_blob_store(config, &credentials).await?;
        let retention = RetentionPolicy::from_seconds(config.cache.refresh_after_seconds);

        Self::connect(store, config.cache.bucket.clone(), retention).await
    }

    /// Wrap an existing backend after checking that `bucket` exists
    pub async fn connect(
        store: Arc<dyn BlobStore>,
        bucket: impl Into<String>,
        retention: RetentionPolicy,
    ) -> CacheResult<Self> {
        let bucket = bucket.into();

        match store.bucket_exists(&bucket).await {
            Ok(true) => {}
            Ok(false) => return Err(CacheError::BucketUnavailable { bucket }),
            Err(source) => return Err(CacheError::BucketUnreachable { bucket, source }),
        }

        info!(
            "Using {} bucket '{}' ({})",
            store.backend_name(),
            bucket,
            describe_policy(retention)
        );

        Ok(Self {
            store,
            bucket,
            retention,
            clock: Arc::new(SystemClock),
            closed: AtomicBool::new(false),
        })
    }

    /// Replace the time source used for retention decisions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bucket this service reads and writes
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Retention policy applied on reads
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> CacheResult<()> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    async fn store_from(
        &self,
        key: &CacheKey,
        producer: &mut (dyn AsyncRead + Unpin + Send),
    ) -> CacheResult<()> {
        self.ensure_open()?;

        self.store
            .put(&self.bucket, key.as_str(), producer)
            .await
            .map_err(|e| CacheError::store(key.as_str(), &self.bucket, e))?;

        debug!("Stored '{}' in bucket '{}'", key, self.bucket);
        Ok(())
    }

    /// Fetch and deliver an entry; `None` is a miss
    async fn load_into(
        &self,
        key: &CacheKey,
        consumer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> CacheResult<Option<BlobMetadata>> {
        self.ensure_open()?;

        let object = match self.store.get(&self.bucket, key.as_str()).await {
            Ok(object) => object,
            Err(e) if e.is_not_found() => {
                debug!("Cache miss for '{}'", key);
                return Ok(None);
            }
            Err(e) => return Err(CacheError::load(key.as_str(), &self.bucket, e)),
        };

        let mut body = object.body;
        tokio::io::copy(&mut body, &mut *consumer)
            .await
            .map_err(|e| CacheError::load(key.as_str(), &self.bucket, e.into()))?;

        debug!("Cache hit for '{}' ({} bytes)", key, object.metadata.size);
        Ok(Some(object.metadata))
    }

    /// Best-effort retention bump; never affects the load result
    async fn refresh_retention(&self, metadata: &BlobMetadata) {
        let now = self.clock.now();
        match retention::refresh_if_due(&*self.store, &self.bucket, metadata, self.retention, now)
            .await
        {
            Ok(RefreshOutcome::Refreshed { at }) => {
                debug!("Refreshed retention time of '{}' to {}", metadata.name, at)
            }
            Ok(_) => {}
            Err(e) => match e.source() {
                Some(cause) => warn!("{}: {}", e, cause),
                None => warn!("{}", e),
            },
        }
    }
}

fn describe_policy(policy: RetentionPolicy) -> String {
    match policy {
        RetentionPolicy::Disabled => "retention refresh disabled".to_string(),
        RetentionPolicy::RefreshAfter(interval) => {
            format!("refresh after {}s", interval.num_seconds())
        }
    }
}

#[async_trait]
impl CacheService for RemoteArtifactCache {
    async fn store(
        &self,
        key: &CacheKey,
        producer: &mut (dyn AsyncRead + Unpin + Send),
    ) -> CacheResult<()> {
        let result = self.store_from(key, producer).await;
        if result.is_err() {
            // The producer is always left at EOF
            let _ = tokio::io::copy(producer, &mut tokio::io::sink()).await;
        }
        result
    }

    async fn load(
        &self,
        key: &CacheKey,
        consumer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> CacheResult<bool> {
        let delivered = self.load_into(key, consumer).await;
        let shutdown = consumer.shutdown().await;

        let metadata = match (delivered, shutdown) {
            (Ok(None), _) => return Ok(false),
            (Ok(Some(metadata)), Ok(())) => metadata,
            (Ok(Some(_)), Err(e)) => {
                return Err(CacheError::load(key.as_str(), &self.bucket, e.into()))
            }
            (Err(e), _) => return Err(e),
        };

        self.refresh_retention(&metadata).await;
        Ok(true)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Closed cache for bucket '{}'", self.bucket);
        }
    }
}
