//! Document keys
//!
//! Collections store documents under fixed-length byte keys so an index entry
//! can hold many keys back to back. [`DocKey::generate`] makes 16-byte UUIDv7
//! keys, which sort by creation time.

use std::fmt;

use uuid::Uuid;

use docstore_core::{Error, Result};

/// Default document key length in bytes
pub const DEFAULT_KEY_LEN: usize = 16;

/// A document key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey(Vec<u8>);

impl DocKey {
    /// A new time-ordered 16-byte key
    pub fn generate() -> Self {
        DocKey(Uuid::now_v7().as_bytes().to_vec())
    }

    /// Wrap raw key bytes
    ///
    /// # Errors
    ///
    /// `InvalidKey` for an empty key.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::InvalidKey("document key must not be empty".to_string()));
        }
        Ok(DocKey(bytes))
    }

    /// Wrap raw key bytes, requiring exactly `len` bytes
    pub fn with_len(bytes: impl Into<Vec<u8>>, len: usize) -> Result<Self> {
        let key = Self::from_bytes(bytes)?;
        check_len(&key.0, len)?;
        Ok(key)
    }

    /// The key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwrap into the key bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Key length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; keys are never empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fail with `InvalidKey` unless `key` is exactly `len` bytes long
pub fn check_len(key: &[u8], len: usize) -> Result<()> {
    if key.len() != len {
        return Err(Error::InvalidKey(format!(
            "document key has {} bytes, collection expects {}",
            key.len(),
            len
        )));
    }
    Ok(())
}

impl AsRef<[u8]> for DocKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Uuid> for DocKey {
    fn from(id: Uuid) -> Self {
        DocKey(id.as_bytes().to_vec())
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(id) = Uuid::from_slice(&self.0) {
            return write!(f, "{}", id);
        }
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
