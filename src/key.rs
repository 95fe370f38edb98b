//! Cache keys
//!
//! A key is supplied by the build tool (usually a hash of the task inputs)
//! and is used verbatim as the object name in the bucket.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Longest object name accepted by the supported object stores, in bytes
pub const MAX_KEY_LEN: usize = 1024;

/// Opaque identifier naming one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap a caller-supplied key
    ///
    /// Rejects empty keys, keys longer than [`MAX_KEY_LEN`] and keys
    /// containing control characters, none of which can name an object.
    pub fn new(key: impl Into<String>) -> CacheResult<Self> {
        let key = key.into();

        if key.is_empty() {
            return Err(CacheError::InvalidKey("key is empty".to_string()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(CacheError::InvalidKey(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                MAX_KEY_LEN
            )));
        }
        if key.chars().any(char::is_control) {
            return Err(CacheError::InvalidKey(format!(
                "key contains control characters: {:?}",
                key
            )));
        }

        Ok(Self(key))
    }

    /// Derive a key from content: lowercase hex SHA-256
    pub fn digest(content: impl AsRef<[u8]>) -> Self {
        let hash = Sha256::digest(content.as_ref());
        Self(hex::encode(hash))
    }

    /// The object name this key maps to
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(value: String) -> CacheResult<Self> {
        Self::new(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_used_verbatim() {
        let key = CacheKey::new("a1b2c3d4e5f6").unwrap();
        assert_eq!(key.as_str(), "a1b2c3d4e5f6");
        assert_eq!(key.to_string(), "a1b2c3d4e5f6");
    }

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(CacheKey::new(""), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn control_characters_rejected() {
        assert!(CacheKey::new("abc\ndef").is_err());
    }

    #[test]
    fn oversized_key_rejected() {
        let key = "a".repeat(MAX_KEY_LEN + 1);
        assert!(CacheKey::new(key).is_err());
        assert!(CacheKey::new("a".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn digest_is_sha256_hex() {
        let key = CacheKey::digest(b"");
        assert_eq!(
            key.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn deserialize_validates() {
        let ok: CacheKey = serde_json::from_str("\"deadbeef\"").unwrap();
        assert_eq!(ok.as_str(), "deadbeef");
        assert!(serde_json::from_str::<CacheKey>("\"\"").is_err());
    }
}
