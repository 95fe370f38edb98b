//! Google Cloud Storage backend
//!
//! Uses the JSON API through `google-cloud-storage`. Retention is signalled
//! through the object's `customTime`, which bucket lifecycle rules such as
//! `daysSinceCustomTime` act on.
//!
//! Object bodies are streamed in both directions; at most
//! `UPLOAD_QUEUE_DEPTH` chunks of `UPLOAD_CHUNK_SIZE` bytes are buffered on
//! upload.

use crate::credentials::ResolvedCredentials;
use crate::store::{BlobMetadata, BlobObject, BlobResult, BlobStore, BlobStoreError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use google_cloud_storage::client::google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::buckets::get::GetBucketRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::patch::PatchObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::objects::Object;
use google_cloud_storage::http::Error as GcsError;
use std::io;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tracing::debug;

const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;
const UPLOAD_QUEUE_DEPTH: usize = 4;

/// Object store backed by a GCS project
pub struct GcsBlobStore {
    client: Client,
}

impl GcsBlobStore {
    /// Build a client from resolved credentials
    ///
    /// Fails with [`BlobStoreError::Credentials`] when the key file cannot be
    /// parsed or no default credentials can be discovered.
    pub async fn connect(credentials: &ResolvedCredentials) -> BlobResult<Self> {
        let config = match credentials.file() {
            Some(path) => {
                let file = CredentialsFile::new_from_file(path.to_string_lossy().into_owned())
                    .await
                    .map_err(|e| BlobStoreError::Credentials(e.to_string()))?;
                ClientConfig::default()
                    .with_credentials(file)
                    .await
                    .map_err(|e| BlobStoreError::Credentials(e.to_string()))?
            }
            None => ClientConfig::default()
                .with_auth()
                .await
                .map_err(|e| BlobStoreError::Credentials(e.to_string()))?,
        };

        debug!("Created GCS client");
        Ok(Self {
            client: Client::new(config),
        })
    }
}

fn map_error(err: GcsError, name: &str) -> BlobStoreError {
    match err {
        GcsError::Response(resp) => match resp.code {
            404 => BlobStoreError::NotFound(name.to_string()),
            401 | 403 => BlobStoreError::PermissionDenied(resp.message),
            code => BlobStoreError::transport(Some(code), resp.message),
        },
        // Other variants (HTTP client, token source) may still carry a
        // status only in their message; `is_not_found` looks for it.
        other => BlobStoreError::transport(None, other.to_string()),
    }
}

fn to_chrono(t: OffsetDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond()).unwrap_or_default()
}

fn to_offset(t: DateTime<Utc>) -> BlobResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(t.timestamp())
        .map_err(|e| BlobStoreError::transport(None, format!("invalid custom time: {}", e)))
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn bucket_exists(&self, bucket: &str) -> BlobResult<bool> {
        let req = GetBucketRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };
        match self.client.get_bucket(&req).await {
            Ok(_) => Ok(true),
            Err(e) => match map_error(e, bucket) {
                BlobStoreError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn put(
        &self,
        bucket: &str,
        name: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<()> {
        let req = UploadObjectRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };
        let upload_type = UploadType::Simple(Media::new(name.to_string()));

        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(UPLOAD_QUEUE_DEPTH);
        let upload = self
            .client
            .upload_streamed_object(&req, ReceiverStream::new(rx), &upload_type);

        let pump = async move {
            let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
            loop {
                let n = match content.read(&mut buf).await {
                    Ok(n) => n,
                    Err(e) => {
                        // Fail the request so a truncated object is never committed
                        let _ = tx.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                        return Err(e);
                    }
                };
                if n == 0 {
                    return Ok(());
                }
                if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                    // Upload already finished; its result carries the cause
                    return Ok(());
                }
            }
        };

        let (uploaded, pumped) = tokio::join!(upload, pump);
        pumped?;
        uploaded.map_err(|e| map_error(e, name))?;
        Ok(())
    }

    async fn get(&self, bucket: &str, name: &str) -> BlobResult<BlobObject> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: name.to_string(),
            ..Default::default()
        };

        let object = self
            .client
            .get_object(&req)
            .await
            .map_err(|e| map_error(e, name))?;
        let stream = self
            .client
            .download_streamed_object(&req, &Range::default())
            .await
            .map_err(|e| map_error(e, name))?
            .map_err(io::Error::other);

        let created_at = object.time_created.map(to_chrono).unwrap_or_default();
        Ok(BlobObject {
            metadata: BlobMetadata {
                name: name.to_string(),
                size: object.size.max(0) as u64,
                created_at,
                custom_time: object.custom_time.map(to_chrono),
            },
            body: Box::new(StreamReader::new(Box::pin(stream))),
        })
    }

    async fn set_custom_time(
        &self,
        bucket: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> BlobResult<()> {
        let req = PatchObjectRequest {
            bucket: bucket.to_string(),
            object: name.to_string(),
            metadata: Some(Object {
                custom_time: Some(to_offset(at)?),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.client
            .patch_object(&req)
            .await
            .map_err(|e| map_error(e, name))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "gcs"
    }
}
