//! Collections: documents in a bucket, kept in step with their indexes
//!
//! A collection named `users` owns the root bucket `/users`. Documents are
//! stored under fixed-length keys, encoded by the collection's codec. Each
//! index owns a sub-bucket (`/users/age`) and is updated in the same
//! transaction as the document write that changes it.
//!
//! A [`Collection`] is a cheap handle: it never caches buckets, every
//! operation resolves them from the transaction it is given.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use docstore_core::{Bucket, Cursor, Error, MatchCursor, Path, Result, Transaction};

use crate::codec::{Codec, CodecRegistry};
use crate::document::Document;
use crate::index::{encoding, tokenizer, Index, IndexSpec};
use crate::key::check_len;

/// Collection metadata as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Collection name
    pub name: String,
    /// Bucket holding the documents
    pub path: Path,
    /// Codec the documents are stored with
    pub codec: String,
    /// Length of every document key
    pub key_len: usize,
    /// Index definitions by name
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexSpec>,
}

/// What to create: name plus optional overrides of the database defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    /// Collection name
    pub name: String,
    /// Codec name, the database default when `None`
    pub codec: Option<String>,
    /// Key length, the database default when `None`
    pub key_len: Option<usize>,
    /// Indexes created together with the collection
    pub indexes: Vec<IndexSpec>,
}

impl CollectionSpec {
    /// Collection with default codec and key length and no indexes
    pub fn new(name: impl Into<String>) -> Self {
        CollectionSpec {
            name: name.into(),
            codec: None,
            key_len: None,
            indexes: Vec::new(),
        }
    }

    /// Use a specific codec
    pub fn codec(mut self, name: impl Into<String>) -> Self {
        self.codec = Some(name.into());
        self
    }

    /// Use a specific key length
    pub fn key_len(mut self, len: usize) -> Self {
        self.key_len = Some(len);
        self
    }

    /// Add an index
    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }
}

/// Check a collection name
///
/// Names become root bucket names. Names starting with `_` are reserved for
/// the database's own buckets.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidPath("collection name must not be empty".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidPath(format!(
            "collection name '{}' contains '/'",
            name
        )));
    }
    if name.starts_with('_') {
        return Err(Error::InvalidPath(format!(
            "collection name '{}' is reserved",
            name
        )));
    }
    Ok(())
}

/// One dangling or missing index reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFault {
    /// Index name
    pub index: String,
    /// Encoded index value
    pub value: Vec<u8>,
    /// Document key
    pub key: Vec<u8>,
}

/// Result of [`Collection::verify_indexes`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Documents checked
    pub documents: usize,
    /// References to documents that are gone or no longer hold the value
    pub dangling: Vec<IndexFault>,
    /// Values documents hold that their index does not list
    pub missing: Vec<IndexFault>,
}

impl IndexReport {
    /// True when no fault was found
    pub fn is_consistent(&self) -> bool {
        self.dangling.is_empty() && self.missing.is_empty()
    }
}

struct Inner {
    name: String,
    path: Path,
    codec: String,
    key_len: usize,
    codecs: CodecRegistry,
    indexes: RwLock<BTreeMap<String, Index>>,
}

/// Handle on one collection
#[derive(Clone)]
pub struct Collection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .field("codec", &self.inner.codec)
            .field("key_len", &self.inner.key_len)
            .field("indexes", &self.index_names())
            .finish()
    }
}

impl Collection {
    pub(crate) fn from_meta(meta: &CollectionMeta, codecs: CodecRegistry) -> Result<Self> {
        validate_collection_name(&meta.name)?;
        if meta.key_len == 0 {
            return Err(Error::InvalidKey(format!(
                "collection '{}' has a zero key length",
                meta.name
            )));
        }
        let mut indexes = BTreeMap::new();
        for (name, spec) in &meta.indexes {
            indexes.insert(name.clone(), Index::new(spec.clone(), &meta.path, meta.key_len)?);
        }
        Ok(Collection {
            inner: Arc::new(Inner {
                name: meta.name.clone(),
                path: meta.path.clone(),
                codec: meta.codec.clone(),
                key_len: meta.key_len,
                codecs,
                indexes: RwLock::new(indexes),
            }),
        })
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Bucket path of the documents
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Codec name
    pub fn codec_name(&self) -> &str {
        &self.inner.codec
    }

    /// Document key length
    pub fn key_len(&self) -> usize {
        self.inner.key_len
    }

    /// The codec, resolved now
    ///
    /// # Errors
    ///
    /// `UnknownCodec` if the name is not registered.
    pub fn codec(&self) -> Result<Arc<dyn Codec>> {
        self.inner.codecs.get(&self.inner.codec)
    }

    /// Current metadata
    pub fn meta(&self) -> CollectionMeta {
        CollectionMeta {
            name: self.inner.name.clone(),
            path: self.inner.path.clone(),
            codec: self.inner.codec.clone(),
            key_len: self.inner.key_len,
            indexes: self
                .inner
                .indexes
                .read()
                .iter()
                .map(|(name, index)| (name.clone(), index.spec().clone()))
                .collect(),
        }
    }

    /// Index by name
    pub fn index(&self, name: &str) -> Option<Index> {
        self.inner.indexes.read().get(name).cloned()
    }

    /// All indexes, in name order
    pub fn indexes(&self) -> Vec<Index> {
        self.inner.indexes.read().values().cloned().collect()
    }

    /// Index names, sorted
    pub fn index_names(&self) -> Vec<String> {
        self.inner.indexes.read().keys().cloned().collect()
    }

    /// First non-fulltext index on `field`, in name order
    pub fn index_on(&self, field: &Path) -> Option<Index> {
        self.inner
            .indexes
            .read()
            .values()
            .find(|index| !index.is_fulltext() && index.field() == field)
            .cloned()
    }

    /// The document bucket in `tx`
    pub fn bucket(&self, tx: &dyn Transaction) -> Result<Box<dyn Bucket>> {
        tx.bucket(&self.inner.path)?
            .ok_or_else(|| Error::not_found(format!("collection '{}'", self.inner.name)))
    }

    /// Fetch and decode one document
    pub fn get(&self, tx: &dyn Transaction, key: &[u8]) -> Result<Option<Document>> {
        match self.bucket(tx)?.get(key)? {
            Some(raw) => Ok(Some(self.codec()?.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store a new document
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `key` is taken, `UniqueConstraintViolation` if a
    /// unique index already holds one of the document's values.
    pub fn insert(&self, tx: &dyn Transaction, key: &[u8], doc: &Document) -> Result<()> {
        self.write(tx, key, doc, true)
    }

    /// Store or replace a document
    pub fn put(&self, tx: &dyn Transaction, key: &[u8], doc: &Document) -> Result<()> {
        self.write(tx, key, doc, false)
    }

    /// Remove a document and its index references; returns whether it existed
    pub fn delete(&self, tx: &dyn Transaction, key: &[u8]) -> Result<bool> {
        let bucket = self.bucket(tx)?;
        let Some(raw) = bucket.get(key)? else {
            return Ok(false);
        };
        let old = self.codec()?.decode(&raw)?;
        bucket.delete(key)?;
        for index in self.indexes() {
            index.apply(tx, key, &index.values(&old), &[])?;
        }
        Ok(true)
    }

    /// Number of documents
    pub fn count(&self, tx: &dyn Transaction) -> Result<usize> {
        self.bucket(tx)?.len()
    }

    /// Cursor over the raw documents, index sub-buckets left out
    pub fn cursor(&self, tx: &dyn Transaction) -> Result<Box<dyn Cursor>> {
        let raw = self.bucket(tx)?.cursor()?;
        Ok(Box::new(MatchCursor::new(raw, |_: &[u8], value: Option<&[u8]>| {
            value.is_some()
        })))
    }

    /// Every document in key order
    pub fn documents(&self, tx: &dyn Transaction) -> Result<Vec<(Vec<u8>, Document)>> {
        let codec = self.codec()?;
        let mut out = Vec::new();
        self.bucket(tx)?.for_each(&mut |key, value| {
            if let Some(value) = value {
                out.push((key.to_vec(), codec.decode(value)?));
            }
            Ok(())
        })?;
        Ok(out)
    }

    /// Keys of the documents an index lists for `value`
    ///
    /// On a fulltext index a string `value` is tokenized and the keys
    /// holding every token are returned. Arrays and objects match nothing.
    ///
    /// # Errors
    ///
    /// `NotFound` if the index does not exist.
    pub fn lookup(&self, tx: &dyn Transaction, index: &str, value: &Document) -> Result<Vec<Vec<u8>>> {
        let index = self
            .index(index)
            .ok_or_else(|| Error::not_found(format!("index '{}' on '{}'", index, self.inner.name)))?;

        if index.is_fulltext() {
            let Some(text) = value.as_str() else {
                return Ok(Vec::new());
            };
            let mut result: Option<Vec<Vec<u8>>> = None;
            for token in tokenizer::tokenize(text) {
                let keys = index.lookup(tx, &encoding::encode_str(&token))?;
                result = Some(match result {
                    None => keys,
                    Some(acc) => acc.into_iter().filter(|k| keys.contains(k)).collect(),
                });
            }
            return Ok(result.unwrap_or_default());
        }

        match encoding::encode_value(value) {
            Some(encoded) => index.lookup(tx, &encoded),
            None => Ok(Vec::new()),
        }
    }

    /// Compare every index with the documents
    pub fn verify_indexes(&self, tx: &dyn Transaction) -> Result<IndexReport> {
        let documents: BTreeMap<Vec<u8>, Document> = self.documents(tx)?.into_iter().collect();
        let mut report = IndexReport {
            documents: documents.len(),
            ..IndexReport::default()
        };

        for index in self.indexes() {
            let entries = index.entries(tx)?;
            for (value, keys) in &entries {
                for key in keys {
                    let held = documents
                        .get(key)
                        .map_or(false, |doc| index.values(doc).contains(value));
                    if !held {
                        report.dangling.push(IndexFault {
                            index: index.name().to_string(),
                            value: value.clone(),
                            key: key.clone(),
                        });
                    }
                }
            }
            for (key, doc) in &documents {
                for value in index.values(doc) {
                    let listed = entries
                        .iter()
                        .any(|(v, keys)| *v == value && keys.contains(key));
                    if !listed {
                        report.missing.push(IndexFault {
                            index: index.name().to_string(),
                            value,
                            key: key.clone(),
                        });
                    }
                }
            }
        }
        Ok(report)
    }

    /// Drop and refill every index bucket from the documents
    pub fn rebuild_indexes(&self, tx: &dyn Transaction) -> Result<()> {
        for index in self.indexes() {
            if tx.bucket(index.path())?.is_some() {
                tx.delete_bucket(index.path())?;
            }
            tx.create_bucket(index.path())?;
            self.backfill(tx, &index)?;
        }
        info!(target: "docstore::engine", collection = %self.inner.name, "indexes rebuilt");
        Ok(())
    }

    /// Create and fill the bucket for a new index without attaching it
    ///
    /// The caller attaches the index once the transaction has committed.
    ///
    /// Index buckets share the collection bucket with documents, so an index
    /// name exactly as long as a document key is rejected with `InvalidPath`.
    pub(crate) fn build_index(&self, tx: &dyn Transaction, spec: IndexSpec) -> Result<Index> {
        if spec.name.len() == self.inner.key_len {
            return Err(Error::InvalidPath(format!(
                "index name '{}' is {} bytes long, the length of document keys in '{}'",
                spec.name, self.inner.key_len, self.inner.name
            )));
        }
        if self.inner.indexes.read().contains_key(&spec.name) {
            return Err(Error::already_exists(format!(
                "index '{}' on '{}'",
                spec.name, self.inner.name
            )));
        }
        let index = Index::new(spec, &self.inner.path, self.inner.key_len)?;
        tx.create_bucket(index.path())?;
        self.backfill(tx, &index)?;
        debug!(
            target: "docstore::engine",
            collection = %self.inner.name,
            index = index.name(),
            "index built"
        );
        Ok(index)
    }

    /// Whether both handles refer to the same opened collection
    pub(crate) fn same_as(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn attach_index(&self, index: Index) {
        self.inner
            .indexes
            .write()
            .insert(index.name().to_string(), index);
    }

    pub(crate) fn detach_index(&self, name: &str) -> Option<Index> {
        self.inner.indexes.write().remove(name)
    }

    fn backfill(&self, tx: &dyn Transaction, index: &Index) -> Result<()> {
        for (key, doc) in self.documents(tx)? {
            let values = index.values(&doc);
            index.check_unique(tx, &key, &values)?;
            index.apply(tx, &key, &[], &values)?;
        }
        Ok(())
    }

    fn write(&self, tx: &dyn Transaction, key: &[u8], doc: &Document, insert: bool) -> Result<()> {
        check_len(key, self.inner.key_len)?;
        let codec = self.codec()?;
        let bucket = self.bucket(tx)?;
        let old = match bucket.get(key)? {
            Some(_) if insert => {
                return Err(Error::already_exists(format!(
                    "document {:?} in '{}'",
                    key, self.inner.name
                )))
            }
            Some(raw) => Some(codec.decode(&raw)?),
            None => None,
        };

        let changes: Vec<(Index, Vec<Vec<u8>>, Vec<Vec<u8>>)> = self
            .indexes()
            .into_iter()
            .map(|index| {
                let before = old.as_ref().map(|d| index.values(d)).unwrap_or_default();
                let after = index.values(doc);
                (index, before, after)
            })
            .collect();

        // nothing is written until every unique index agrees
        for (index, _, after) in &changes {
            index.check_unique(tx, key, after)?;
        }

        bucket.put(key, &codec.encode(doc)?)?;
        for (index, before, after) in &changes {
            index.apply(tx, key, before, after)?;
        }
        Ok(())
    }
}
