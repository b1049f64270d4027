//! Document codecs
//!
//! A collection stores documents as bytes produced by a named [`Codec`]. The
//! codec name is persisted with the collection metadata and resolved through
//! the database's [`CodecRegistry`] on every access, so a codec registered
//! after open is picked up by collections that name it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use docstore_core::{Error, Result};

use crate::document::Document;

/// Name of the built-in JSON codec
pub const JSON_CODEC: &str = "json";

/// Converts documents to and from their stored bytes
pub trait Codec: Send + Sync {
    /// Name under which the codec is registered
    fn name(&self) -> &str;

    /// Document to bytes
    fn encode(&self, doc: &Document) -> Result<Vec<u8>>;

    /// Bytes to document
    fn decode(&self, bytes: &[u8]) -> Result<Document>;
}

/// Plain `serde_json` encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        JSON_CODEC
    }

    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        serde_json::to_vec(doc).map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        serde_json::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}

/// Codecs known to one database, keyed by name
///
/// Cloning shares the underlying table.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Arc<RwLock<HashMap<String, Arc<dyn Codec>>>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.names())
            .finish()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let registry = CodecRegistry {
            codecs: Arc::new(RwLock::new(HashMap::new())),
        };
        registry.register(Arc::new(JsonCodec));
        registry
    }
}

impl CodecRegistry {
    /// Registry holding only [`JsonCodec`]
    pub fn new() -> Self {
        CodecRegistry::default()
    }

    /// Add or replace a codec under its own name
    pub fn register(&self, codec: Arc<dyn Codec>) {
        self.codecs.write().insert(codec.name().to_string(), codec);
    }

    /// Look up a codec
    ///
    /// # Errors
    ///
    /// `UnknownCodec` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Codec>> {
        self.codecs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownCodec(name.to_string()))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.codecs.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.codecs.read().keys().cloned().collect();
        names.sort();
        names
    }
}
