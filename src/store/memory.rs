//! In-memory object store
//!
//! Keeps buckets in a `HashMap` behind a mutex. Faults can be injected per
//! operation so callers can exercise failure paths without a network.

use crate::clock::{Clock, SystemClock};
use crate::store::{BlobMetadata, BlobObject, BlobResult, BlobStore, BlobStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Failure to report from an operation instead of performing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Transport failure, optionally carrying an HTTP-style status
    Transport { status: Option<u16>, message: String },
    /// The credentials lack access
    PermissionDenied(String),
}

impl Fault {
    /// Transport failure without a status code
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    fn to_error(&self) -> BlobStoreError {
        match self {
            Self::Transport { status, message } => {
                BlobStoreError::transport(*status, message.clone())
            }
            Self::PermissionDenied(msg) => BlobStoreError::PermissionDenied(msg.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    content: Vec<u8>,
    created_at: DateTime<Utc>,
    custom_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Faults {
    probe: Option<Fault>,
    put: Option<Fault>,
    get: Option<Fault>,
    custom_time: Option<Fault>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: HashMap<String, HashMap<String, StoredObject>>,
    faults: Faults,
    custom_time_updates: usize,
}

/// Object store held entirely in process memory
pub struct InMemoryBlobStore {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBlobStore {
    /// Create an empty store with no buckets
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping new objects with `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    /// Create a store that already contains `bucket`
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.create_bucket(bucket);
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an empty bucket (no-op if it exists)
    pub fn create_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    /// Place an object directly, bypassing `put`, with explicit timestamps
    pub fn insert_object(
        &self,
        bucket: &str,
        name: &str,
        content: impl Into<Vec<u8>>,
        created_at: DateTime<Utc>,
        custom_time: Option<DateTime<Utc>>,
    ) {
        self.lock().buckets.entry(bucket.to_string()).or_default().insert(
            name.to_string(),
            StoredObject {
                content: content.into(),
                created_at,
                custom_time,
            },
        );
    }

    /// Remove an object, as the store's own lifecycle rules would
    pub fn evict(&self, bucket: &str, name: &str) -> bool {
        self.lock()
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.remove(name))
            .is_some()
    }

    /// Metadata of a stored object, if present
    pub fn metadata(&self, bucket: &str, name: &str) -> Option<BlobMetadata> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(name))
            .map(|obj| to_metadata(name, obj))
    }

    /// Content of a stored object, if present
    pub fn content(&self, bucket: &str, name: &str) -> Option<Vec<u8>> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(name))
            .map(|obj| obj.content.clone())
    }

    /// Number of successful `set_custom_time` calls so far
    pub fn custom_time_updates(&self) -> usize {
        self.lock().custom_time_updates
    }

    /// Make every `bucket_exists` call fail
    pub fn fail_probe(&self, fault: Fault) {
        self.lock().faults.probe = Some(fault);
    }

    /// Make every `put` call fail
    pub fn fail_puts(&self, fault: Fault) {
        self.lock().faults.put = Some(fault);
    }

    /// Make every `get` call fail
    pub fn fail_gets(&self, fault: Fault) {
        self.lock().faults.get = Some(fault);
    }

    /// Make every `set_custom_time` call fail
    pub fn fail_custom_time(&self, fault: Fault) {
        self.lock().faults.custom_time = Some(fault);
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_metadata(name: &str, obj: &StoredObject) -> BlobMetadata {
    BlobMetadata {
        name: name.to_string(),
        size: obj.content.len() as u64,
        created_at: obj.created_at,
        custom_time: obj.custom_time,
    }
}

fn missing_bucket(bucket: &str) -> BlobStoreError {
    BlobStoreError::transport(Some(404), format!("bucket {} does not exist", bucket))
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn bucket_exists(&self, bucket: &str) -> BlobResult<bool> {
        let state = self.lock();
        if let Some(fault) = &state.faults.probe {
            return Err(fault.to_error());
        }
        Ok(state.buckets.contains_key(bucket))
    }

    async fn put(
        &self,
        bucket: &str,
        name: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<()> {
        let fault = self.lock().faults.put.clone();
        if let Some(fault) = fault {
            return Err(fault.to_error());
        }

        let mut buf = Vec::new();
        content.read_to_end(&mut buf).await?;

        let created_at = self.clock.now();
        let mut state = self.lock();
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?;
        objects.insert(
            name.to_string(),
            StoredObject {
                content: buf,
                created_at,
                custom_time: None,
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, name: &str) -> BlobResult<BlobObject> {
        let state = self.lock();
        if let Some(fault) = &state.faults.get {
            return Err(fault.to_error());
        }

        let obj = state
            .buckets
            .get(bucket)
            .ok_or_else(|| missing_bucket(bucket))?
            .get(name)
            .ok_or_else(|| BlobStoreError::NotFound(name.to_string()))?;

        Ok(BlobObject {
            metadata: to_metadata(name, obj),
            body: Box::new(Cursor::new(obj.content.clone())),
        })
    }

    async fn set_custom_time(
        &self,
        bucket: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> BlobResult<()> {
        let mut state = self.lock();
        if let Some(fault) = &state.faults.custom_time {
            return Err(fault.to_error());
        }

        let obj = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?
            .get_mut(name)
            .ok_or_else(|| BlobStoreError::NotFound(name.to_string()))?;
        obj.custom_time = Some(at);
        state.custom_time_updates += 1;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
