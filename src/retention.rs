//! Retention refresh
//!
//! The bucket's lifecycle rules delete objects whose custom time is older
//! than some threshold. Whenever an entry is read and its marker is at least
//! `refresh_after` old, the marker is moved to "now" so entries that are
//! still being used survive.
//!
//! Refreshing is advisory. [`refresh_if_due`] reports failures through
//! [`RefreshError`], which has no conversion into
//! [`CacheError`](crate::CacheError); callers log it and move on.

use crate::store::{BlobMetadata, BlobStore, BlobStoreError};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// How often the retention marker of a read entry is bumped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Never touch object metadata on read
    #[default]
    Disabled,
    /// Refresh once the marker is at least this old
    RefreshAfter(Duration),
}

impl RetentionPolicy {
    /// Policy for a `refresh_after_seconds` setting; zero or negative disables
    pub fn from_seconds(seconds: i64) -> Self {
        if seconds <= 0 {
            Self::Disabled
        } else {
            Self::RefreshAfter(Duration::seconds(seconds))
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::RefreshAfter(_))
    }

    /// Whether an entry last refreshed at `last_refreshed` is due at `now`
    pub fn is_due(&self, last_refreshed: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Disabled => false,
            Self::RefreshAfter(interval) => now - last_refreshed >= *interval,
        }
    }
}

/// What a refresh attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Policy is disabled
    Disabled,
    /// Marker is recent enough
    NotDue { last_refreshed: DateTime<Utc> },
    /// Marker was moved to `at`
    Refreshed { at: DateTime<Utc> },
}

/// A refresh that could not be committed
#[derive(Error, Debug)]
#[error("Failed to refresh retention time of '{name}' in bucket '{bucket}'")]
pub struct RefreshError {
    pub bucket: String,
    pub name: String,
    #[source]
    pub source: BlobStoreError,
}

/// Bump the custom time of an entry if the policy says it is due
pub async fn refresh_if_due(
    store: &dyn BlobStore,
    bucket: &str,
    metadata: &BlobMetadata,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<RefreshOutcome, RefreshError> {
    if !policy.is_enabled() {
        return Ok(RefreshOutcome::Disabled);
    }

    let last_refreshed = metadata.last_refreshed();
    if !policy.is_due(last_refreshed, now) {
        return Ok(RefreshOutcome::NotDue { last_refreshed });
    }

    store
        .set_custom_time(bucket, &metadata.name, now)
        .await
        .map_err(|source| RefreshError {
            bucket: bucket.to_string(),
            name: metadata.name.clone(),
            source,
        })?;

    Ok(RefreshOutcome::Refreshed { at: now })
}
