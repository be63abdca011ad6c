//! Deterministic checksums over serialized configuration blobs.
//!
//! A checksum is the only drift indicator between an instance and the snapshot
//! store, so only equality matters. SHA-256 keeps accidental collisions out of
//! the picture.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Largest blob accepted by [`checksum`] (64 MiB).
pub const MAX_BLOB_SIZE: usize = 64 * 1024 * 1024;

/// Lower-case hex digest identifying one serialized configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Wrap an existing checksum string, e.g. one read from the store or a marker file.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the checksum as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the checksum and return the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Checksum {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Checksum {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for Checksum {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Checksum {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Compute the checksum of a serialized configuration blob.
///
/// # Errors
///
/// Returns [`SyncError::BlobTooLarge`] when `blob` exceeds [`MAX_BLOB_SIZE`].
///
/// # Examples
///
/// ```rust
/// use fleet_sync::checksum::checksum;
///
/// let a = checksum(b"{\"log_level\":\"info\"}").unwrap();
/// let b = checksum(b"{\"log_level\":\"info\"}").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn checksum(blob: &[u8]) -> Result<Checksum> {
    if blob.len() > MAX_BLOB_SIZE {
        return Err(SyncError::BlobTooLarge {
            size: blob.len(),
            limit: MAX_BLOB_SIZE,
        });
    }
    Ok(Checksum(hex::encode(Sha256::digest(blob))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_digest() {
        let sum = checksum(b"").unwrap();
        assert_eq!(
            sum.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_different_input_different_checksum() {
        let a = checksum(b"{\"pool\":10}").unwrap();
        let b = checksum(b"{\"pool\":11}").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_too_large() {
        let blob = vec![0u8; MAX_BLOB_SIZE + 1];
        let err = checksum(&blob).unwrap_err();
        assert!(matches!(err, SyncError::BlobTooLarge { size, .. } if size == MAX_BLOB_SIZE + 1));
    }

    #[test]
    fn test_serde_is_transparent() {
        let sum = Checksum::new("abc");
        assert_eq!(serde_json::to_string(&sum).unwrap(), "\"abc\"");
        assert_eq!(sum, "abc");
    }

    proptest! {
        #[test]
        fn prop_checksum_is_deterministic(blob in proptest::collection::vec(any::<u8>(), 0..512)) {
            let first = checksum(&blob).unwrap();
            let second = checksum(&blob).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.as_str().len(), 64);
        }
    }
}
