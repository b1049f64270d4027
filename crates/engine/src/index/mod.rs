//! Secondary indexes
//!
//! An index lives in a sub-bucket of its collection (`/users/age`). Each
//! entry maps an encoded field value (see [`encoding`]) to the sorted
//! concatenation of the fixed-length keys of every document holding that
//! value. Entries are created on first use and deleted when their last key
//! goes away.
//!
//! Maintenance is driven by the collection: for each write it derives the old
//! and new value sets, checks uniqueness for every index before touching
//! anything, then moves the document key between entries.

pub mod encoding;
pub mod tokenizer;

use serde::{Deserialize, Serialize};

use docstore_core::{Bucket, Cursor, Error, Path, Result, Transaction};

use crate::document::{field, Document};

/// Definition of an index, as persisted in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, also its sub-bucket name
    pub name: String,
    /// Indexed document field
    pub field: Path,
    /// At most one document per value
    #[serde(default)]
    pub unique: bool,
    /// Index every word of a string field instead of the whole value
    #[serde(default)]
    pub fulltext: bool,
}

impl IndexSpec {
    /// Plain index on `field`
    pub fn new(name: impl Into<String>, field: impl Into<Path>) -> Self {
        IndexSpec {
            name: name.into(),
            field: field.into(),
            unique: false,
            fulltext: false,
        }
    }

    /// Mark the index unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark the index fulltext
    pub fn fulltext(mut self) -> Self {
        self.fulltext = true;
        self
    }

    /// Check the name and field
    ///
    /// # Errors
    ///
    /// `InvalidPath` for an empty name, a name containing `/`, or the root
    /// field path.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(Error::InvalidPath(format!(
                "invalid index name '{}'",
                self.name
            )));
        }
        if self.field.is_root() {
            return Err(Error::InvalidPath(format!(
                "index '{}' must name a document field",
                self.name
            )));
        }
        Ok(())
    }
}

/// An index bound to its collection's bucket path and key length
#[derive(Debug, Clone)]
pub struct Index {
    spec: IndexSpec,
    path: Path,
    key_len: usize,
}

impl Index {
    pub(crate) fn new(spec: IndexSpec, collection: &Path, key_len: usize) -> Result<Self> {
        spec.validate()?;
        let path = collection.join(&spec.name)?;
        Ok(Index {
            spec,
            path,
            key_len,
        })
    }

    /// The definition
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Indexed field
    pub fn field(&self) -> &Path {
        &self.spec.field
    }

    /// Bucket path of the index
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the index is unique
    pub fn is_unique(&self) -> bool {
        self.spec.unique
    }

    /// Whether the index is fulltext
    pub fn is_fulltext(&self) -> bool {
        self.spec.fulltext
    }

    /// Encoded index values `doc` contributes, sorted and deduplicated
    ///
    /// Missing fields, arrays and objects contribute nothing. A fulltext index
    /// contributes one value per token of a string field.
    pub fn values(&self, doc: &Document) -> Vec<Vec<u8>> {
        let Some(value) = field(doc, &self.spec.field) else {
            return Vec::new();
        };
        let mut out: Vec<Vec<u8>> = if self.spec.fulltext {
            match value.as_str() {
                Some(text) => tokenizer::tokenize(text)
                    .iter()
                    .map(|t| encoding::encode_str(t))
                    .collect(),
                None => Vec::new(),
            }
        } else {
            encoding::encode_value(value).into_iter().collect()
        };
        out.sort();
        out.dedup();
        out
    }

    /// The index bucket in `tx`
    pub fn bucket(&self, tx: &dyn Transaction) -> Result<Box<dyn Bucket>> {
        tx.bucket(&self.path)?
            .ok_or_else(|| Error::not_found(self.path.to_string()))
    }

    /// Document keys stored under one encoded value
    ///
    /// Seeks a cursor on the index bucket to the value.
    pub fn lookup(&self, tx: &dyn Transaction, encoded: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut cursor = self.bucket(tx)?.cursor()?;
        match cursor.seek(encoded) {
            Some((key, Some(raw))) if key == encoded => self.split(encoded, &raw),
            _ => Ok(Vec::new()),
        }
    }

    /// Every entry as (encoded value, document keys), in value order
    pub fn entries(&self, tx: &dyn Transaction) -> Result<Vec<(Vec<u8>, Vec<Vec<u8>>)>> {
        let mut raw_entries = Vec::new();
        self.bucket(tx)?.for_each(&mut |k, v| {
            if let Some(v) = v {
                raw_entries.push((k.to_vec(), v.to_vec()));
            }
            Ok(())
        })?;
        raw_entries
            .into_iter()
            .map(|(k, v)| {
                let keys = self.split(&k, &v)?;
                Ok((k, keys))
            })
            .collect()
    }

    /// Fail if any of `values` already maps to a document other than `key`
    pub(crate) fn check_unique(
        &self,
        tx: &dyn Transaction,
        key: &[u8],
        values: &[Vec<u8>],
    ) -> Result<()> {
        if !self.spec.unique {
            return Ok(());
        }
        for value in values {
            if let Some(existing) = self.lookup(tx, value)?.into_iter().find(|k| k != key) {
                return Err(Error::UniqueConstraintViolation {
                    index: self.spec.name.clone(),
                    existing,
                });
            }
        }
        Ok(())
    }

    /// Move `key` from the entries only in `old` to those only in `new`
    pub(crate) fn apply(
        &self,
        tx: &dyn Transaction,
        key: &[u8],
        old: &[Vec<u8>],
        new: &[Vec<u8>],
    ) -> Result<()> {
        let bucket = self.bucket(tx)?;
        for value in old.iter().filter(|v| !new.contains(v)) {
            self.remove_from(bucket.as_ref(), value, key)?;
        }
        for value in new.iter().filter(|v| !old.contains(v)) {
            self.add_to(bucket.as_ref(), value, key)?;
        }
        Ok(())
    }

    /// Drop one reference; returns whether it was present
    pub(crate) fn remove_reference(
        &self,
        tx: &dyn Transaction,
        encoded: &[u8],
        key: &[u8],
    ) -> Result<bool> {
        let bucket = self.bucket(tx)?;
        self.remove_from(bucket.as_ref(), encoded, key)
    }

    fn add_to(&self, bucket: &dyn Bucket, value: &[u8], key: &[u8]) -> Result<()> {
        let mut keys = match bucket.get(value)? {
            Some(raw) => self.split(value, &raw)?,
            None => Vec::new(),
        };
        if let Err(pos) = keys.binary_search_by(|k| k.as_slice().cmp(key)) {
            keys.insert(pos, key.to_vec());
            bucket.put(value, &keys.concat())?;
        }
        Ok(())
    }

    fn remove_from(&self, bucket: &dyn Bucket, value: &[u8], key: &[u8]) -> Result<bool> {
        let Some(raw) = bucket.get(value)? else {
            return Ok(false);
        };
        let mut keys = self.split(value, &raw)?;
        let Ok(pos) = keys.binary_search_by(|k| k.as_slice().cmp(key)) else {
            return Ok(false);
        };
        keys.remove(pos);
        if keys.is_empty() {
            bucket.delete(value)?;
        } else {
            bucket.put(value, &keys.concat())?;
        }
        Ok(true)
    }

    fn split(&self, value: &[u8], raw: &[u8]) -> Result<Vec<Vec<u8>>> {
        // a key set is whole fixed-length keys or nothing
        if self.key_len == 0 || raw.len() % self.key_len != 0 {
            return Err(Error::IndexCorrupt {
                index: self.spec.name.clone(),
                key: value.to_vec(),
            });
        }
        Ok(raw.chunks_exact(self.key_len).map(<[u8]>::to_vec).collect())
    }
}
