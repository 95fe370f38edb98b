//! Local filesystem object store
//!
//! Each bucket is a directory under a root (typically a shared mount).
//! Objects are committed by writing a temp file and renaming it into place,
//! so readers never observe a partial object. The custom time lives in a
//! JSON sidecar under `.meta/`, removed whenever the object is rewritten.

use crate::store::{BlobMetadata, BlobObject, BlobResult, BlobStore, BlobStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};

const META_DIR: &str = ".meta";
const TMP_DIR: &str = ".tmp";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    custom_time: DateTime<Utc>,
}

/// Object store backed by a directory tree
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`; buckets are its subdirectories
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> BlobResult<PathBuf> {
        validate_component(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, name: &str) -> BlobResult<PathBuf> {
        validate_component(name)?;
        Ok(self.bucket_dir(bucket)?.join(name))
    }

    fn sidecar_path(&self, bucket: &str, name: &str) -> BlobResult<PathBuf> {
        validate_component(name)?;
        Ok(self
            .bucket_dir(bucket)?
            .join(META_DIR)
            .join(format!("{}.json", name)))
    }

    fn temp_path(&self, bucket: &str) -> BlobResult<PathBuf> {
        Ok(self
            .bucket_dir(bucket)?
            .join(TMP_DIR)
            .join(uuid::Uuid::new_v4().to_string()))
    }

    async fn read_sidecar(&self, bucket: &str, name: &str) -> BlobResult<Option<DateTime<Utc>>> {
        let path = self.sidecar_path(bucket, name)?;
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let sidecar: Sidecar = serde_json::from_str(&content)?;
                Ok(Some(sidecar.custom_time))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `content` to a temp file and rename it to `dest`
    async fn commit_file(
        &self,
        bucket: &str,
        dest: &Path,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<()> {
        let temp = self.temp_path(bucket)?;
        if let Some(parent) = temp.parent() {
            fs::create_dir_all(parent).await?;
        }

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            tokio::io::copy(content, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, dest).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Object and bucket names map to single path components here
fn validate_component(name: &str) -> BlobResult<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(BlobStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn bucket_exists(&self, bucket: &str) -> BlobResult<bool> {
        let root = fs::metadata(&self.root).await?;
        if !root.is_dir() {
            return Err(BlobStoreError::transport(
                None,
                format!("storage root is not a directory: {}", self.root.display()),
            ));
        }

        match fs::metadata(self.bucket_dir(bucket)?).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        name: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<()> {
        let dest = self.object_path(bucket, name)?;
        self.commit_file(bucket, &dest, content).await?;

        // A new object generation starts without a custom time
        match fs::remove_file(self.sidecar_path(bucket, name)?).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        debug!("Committed {}", dest.display());
        Ok(())
    }

    async fn get(&self, bucket: &str, name: &str) -> BlobResult<BlobObject> {
        let path = self.object_path(bucket, name)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlobStoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let meta = file.metadata().await?;
        let created_at: DateTime<Utc> = meta.modified()?.into();
        let custom_time = match self.read_sidecar(bucket, name).await {
            Ok(custom_time) => custom_time,
            Err(e) => {
                warn!("Ignoring unreadable custom time of '{}': {}", name, e);
                None
            }
        };

        Ok(BlobObject {
            metadata: BlobMetadata {
                name: name.to_string(),
                size: meta.len(),
                created_at,
                custom_time,
            },
            body: Box::new(file),
        })
    }

    async fn set_custom_time(
        &self,
        bucket: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> BlobResult<()> {
        let object = self.object_path(bucket, name)?;
        match fs::metadata(&object).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlobStoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        let dest = self.sidecar_path(bucket, name)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec(&Sidecar { custom_time: at })?;
        self.commit_file(bucket, &dest, &mut json.as_slice()).await
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
