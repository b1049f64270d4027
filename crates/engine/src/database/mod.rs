//! Database: one storage instance and its named collections
//!
//! This module provides the [`Database`] struct that ties together:
//! - the storage handle opened through a [`Driver`]
//! - the codec registry shared by every collection
//! - the catalog of collections, persisted in the `_catalog` bucket and
//!   reloaded on open
//!
//! ## Transaction API
//!
//! Collection and index DDL runs in its own update. Document operations are
//! available in two forms:
//!
//! 1. **Convenience API**: `db.insert("users", &doc)`, one transaction per call
//! 2. **Closure API**: `db.update(|tx| users.put(tx, key, &doc))` to group
//!    several operations into one atomic commit
//!
//! Index DDL publishes its in-memory change (the index map) from inside the
//! write transaction that changes the catalog. Document writes run under the
//! same storage writer lock, so every write sees the index set its
//! transaction commits against. A commit that fails after publication is
//! undone before the call returns.

mod catalog;
pub mod config;

pub use catalog::CATALOG_BUCKET;
pub use config::{DocstoreConfig, StorageConfig, CONFIG_FILE_NAME};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use docstore_core::{BatchFn, Driver, Error, Path, Result, Storage, StorageExt, Transaction};
use docstore_storage::{FileDriver, MemoryDriver};

use crate::codec::{Codec, CodecRegistry};
use crate::collection::{validate_collection_name, Collection, CollectionMeta, CollectionSpec, IndexReport};
use crate::document::Document;
use crate::index::IndexSpec;
use crate::key::{DocKey, DEFAULT_KEY_LEN};
use crate::query::{select, Query, QueryOutput};

/// A document database over one storage instance
pub struct Database {
    name: String,
    storage: Box<dyn Storage>,
    config: DocstoreConfig,
    codecs: CodecRegistry,
    collections: RwLock<BTreeMap<String, Collection>>,
    data_dir: Option<PathBuf>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("collections", &self.collection_names())
            .field("data_dir", &self.data_dir)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Database {
    /// Open the storage called `name` through `driver`
    ///
    /// Creates the catalog bucket on first open and loads every collection
    /// recorded in it.
    ///
    /// # Errors
    ///
    /// `Config` if `config` is invalid, storage errors from the driver,
    /// `Corruption` for an unreadable catalog entry.
    pub fn open(driver: &dyn Driver, name: &str, config: DocstoreConfig) -> Result<Self> {
        config.validate()?;
        let storage = driver.open(name)?;

        if !storage.read(|tx| catalog::exists(tx))? {
            storage.write(|tx| catalog::init(tx))?;
            debug!(target: "docstore::db", name, "created catalog");
        }

        let codecs = CodecRegistry::new();
        let mut collections = BTreeMap::new();
        for meta in storage.read(|tx| catalog::load(tx))? {
            let collection = Collection::from_meta(&meta, codecs.clone())?;
            collections.insert(meta.name.clone(), collection);
        }

        info!(
            target: "docstore::db",
            name,
            collections = collections.len(),
            "database opened"
        );

        Ok(Database {
            name: name.to_string(),
            storage,
            config,
            codecs,
            collections: RwLock::new(collections),
            data_dir: None,
        })
    }

    /// Open a database persisted under `dir`
    ///
    /// Reads `docstore.toml` from `dir`, writing the default one first if it
    /// is missing, and stores data in `<dir>/<name>.docstore`.
    ///
    /// # Example
    ///
    /// ```text
    /// let db = Database::open_dir("/path/to/data", "app")?;
    /// ```
    pub fn open_dir(dir: impl AsRef<FsPath>, name: &str) -> Result<Self> {
        let data_dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        DocstoreConfig::write_default_if_missing(&config_path)?;
        let config = DocstoreConfig::from_file(&config_path)?;

        let driver = FileDriver::with_options(&data_dir, config.store_options());
        let mut db = Self::open(&driver, name, config)?;
        db.data_dir = Some(data_dir);
        Ok(db)
    }

    /// Open a fresh in-memory database
    pub fn open_in_memory(config: DocstoreConfig) -> Result<Self> {
        let driver = MemoryDriver::with_options(config.store_options());
        Self::open(&driver, "memory", config)
    }

    /// Storage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration in effect
    pub fn config(&self) -> &DocstoreConfig {
        &self.config
    }

    /// Directory the database lives in, for databases opened with
    /// [`Database::open_dir`]
    pub fn data_dir(&self) -> Option<&FsPath> {
        self.data_dir.as_deref()
    }

    /// The underlying storage
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// The codec registry
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Make a codec available to collections naming it
    pub fn register_codec(&self, codec: Arc<dyn Codec>) {
        debug!(target: "docstore::db", codec = codec.name(), "codec registered");
        self.codecs.register(codec);
    }

    // ========== Collections ==========

    /// Create a collection with the configured defaults
    pub fn create_collection(&self, name: &str) -> Result<Collection> {
        self.create_collection_with(CollectionSpec::new(name))
    }

    /// Create a collection, and its indexes, in one transaction
    ///
    /// # Errors
    ///
    /// `InvalidPath` for a bad name, `AlreadyExists` if the name is taken,
    /// `UnknownCodec` for an unregistered codec, `InvalidKey` for a zero key
    /// length.
    pub fn create_collection_with(&self, spec: CollectionSpec) -> Result<Collection> {
        validate_collection_name(&spec.name)?;
        let codec = spec
            .codec
            .clone()
            .unwrap_or_else(|| self.config.default_codec.clone());
        if !self.codecs.contains(&codec) {
            return Err(Error::UnknownCodec(codec));
        }
        let meta = CollectionMeta {
            name: spec.name.clone(),
            path: Path::root().join(&spec.name)?,
            codec,
            key_len: spec.key_len.unwrap_or(self.config.key_len),
            indexes: BTreeMap::new(),
        };
        let collection = Collection::from_meta(&meta, self.codecs.clone())?;

        // the handle is private until the map insert below, so a failed
        // transaction simply discards it
        self.storage.write(|tx| {
            if catalog::contains(tx, &spec.name)? {
                return Err(Error::already_exists(format!("collection '{}'", spec.name)));
            }
            tx.create_bucket(collection.path())?;
            let mut meta = meta.clone();
            for index_spec in &spec.indexes {
                let index = collection.build_index(tx, index_spec.clone())?;
                meta.indexes.insert(index.name().to_string(), index.spec().clone());
                collection.attach_index(index);
            }
            catalog::save(tx, &meta)
        })?;

        self.collections
            .write()
            .insert(spec.name.clone(), collection.clone());
        info!(
            target: "docstore::db",
            collection = %spec.name,
            indexes = spec.indexes.len(),
            "collection created"
        );
        Ok(collection)
    }

    /// Collection by name
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such collection.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("collection '{}'", name)))
    }

    /// Collection names, sorted
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Delete a collection with its documents and indexes
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let collection = self.collection(name)?;
        self.storage.write(|tx| {
            tx.delete_bucket(collection.path())?;
            catalog::remove(tx, name)
        })?;
        let mut collections = self.collections.write();
        // a concurrent create may already have published a new collection
        // under this name
        if collections
            .get(name)
            .map_or(false, |current| current.same_as(&collection))
        {
            collections.remove(name);
        }
        drop(collections);
        info!(target: "docstore::db", collection = %name, "collection dropped");
        Ok(())
    }

    // ========== Indexes ==========

    /// Add an index to a collection, filling it from existing documents
    ///
    /// # Errors
    ///
    /// `AlreadyExists` for a taken index name, `InvalidPath` for a name
    /// that could collide with document keys, `UniqueConstraintViolation`
    /// if existing documents break a unique index. Nothing changes on error.
    ///
    /// A view that starts while the index is being built may already see it
    /// in the collection without its bucket; queries in that view fall back
    /// to a full scan.
    pub fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<()> {
        let collection = self.collection(collection)?;
        let name = spec.name.clone();
        let mut published = false;
        let result = self.storage.write(|tx| {
            let index = collection.build_index(tx, spec)?;
            let mut meta = collection.meta();
            meta.indexes.insert(index.name().to_string(), index.spec().clone());
            catalog::save(tx, &meta)?;
            collection.attach_index(index);
            published = true;
            Ok(())
        });
        if let Err(e) = result {
            if published {
                collection.detach_index(&name);
            }
            return Err(e);
        }
        info!(
            target: "docstore::db",
            collection = %collection.name(),
            index = %name,
            "index created"
        );
        Ok(())
    }

    /// Remove an index and its bucket
    ///
    /// # Errors
    ///
    /// `NotFound` if the collection has no index called `name`.
    pub fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        let collection = self.collection(collection)?;
        let mut detached = None;
        let result = self.storage.write(|tx| {
            let index = collection.index(name).ok_or_else(|| {
                Error::not_found(format!("index '{}' on '{}'", name, collection.name()))
            })?;
            tx.delete_bucket(index.path())?;
            let mut meta = collection.meta();
            meta.indexes.remove(name);
            catalog::save(tx, &meta)?;
            detached = collection.detach_index(name);
            Ok(())
        });
        if let Err(e) = result {
            if let Some(index) = detached {
                collection.attach_index(index);
            }
            return Err(e);
        }
        info!(target: "docstore::db", collection = %collection.name(), index = %name, "index dropped");
        Ok(())
    }

    /// Check every index of a collection against its documents
    pub fn verify_indexes(&self, collection: &str) -> Result<IndexReport> {
        let collection = self.collection(collection)?;
        self.storage.read(|tx| collection.verify_indexes(tx))
    }

    /// Rebuild every index of a collection from its documents
    pub fn rebuild_indexes(&self, collection: &str) -> Result<()> {
        let collection = self.collection(collection)?;
        self.storage.write(|tx| collection.rebuild_indexes(tx))
    }

    // ========== Documents ==========

    /// Insert a document under a freshly generated key
    ///
    /// # Errors
    ///
    /// `InvalidKey` if the collection does not use 16-byte keys; use
    /// [`Database::insert_with_key`] for those.
    pub fn insert(&self, collection: &str, doc: &Document) -> Result<DocKey> {
        let collection = self.collection(collection)?;
        if collection.key_len() != DEFAULT_KEY_LEN {
            return Err(Error::InvalidKey(format!(
                "collection '{}' uses {}-byte keys, generated keys have {}",
                collection.name(),
                collection.key_len(),
                DEFAULT_KEY_LEN
            )));
        }
        let key = DocKey::generate();
        self.storage
            .write(|tx| collection.insert(tx, key.as_bytes(), doc))?;
        Ok(key)
    }

    /// Insert a document under `key`
    pub fn insert_with_key(&self, collection: &str, key: &[u8], doc: &Document) -> Result<()> {
        let collection = self.collection(collection)?;
        self.storage.write(|tx| collection.insert(tx, key, doc))
    }

    /// Store or replace the document under `key`
    pub fn put(&self, collection: &str, key: &[u8], doc: &Document) -> Result<()> {
        let collection = self.collection(collection)?;
        self.storage.write(|tx| collection.put(tx, key, doc))
    }

    /// Fetch one document
    pub fn get(&self, collection: &str, key: &[u8]) -> Result<Option<Document>> {
        let collection = self.collection(collection)?;
        self.storage.read(|tx| collection.get(tx, key))
    }

    /// Delete one document; returns whether it existed
    pub fn delete(&self, collection: &str, key: &[u8]) -> Result<bool> {
        let collection = self.collection(collection)?;
        self.storage.write(|tx| collection.delete(tx, key))
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        let collection = self.collection(collection)?;
        self.storage.read(|tx| collection.count(tx))
    }

    // ========== Queries ==========

    /// Start a query over a collection
    pub fn select(&self, collection: &str) -> Result<Query> {
        Ok(select(&self.collection(collection)?))
    }

    /// Run a query in a read-only transaction
    pub fn find(&self, query: &Query) -> Result<QueryOutput> {
        self.storage.read(|tx| query.execute(tx))
    }

    /// Run a query in a write transaction, removing dangling index
    /// references it meets
    pub fn find_and_repair(&self, query: &Query) -> Result<QueryOutput> {
        self.storage.write(|tx| query.execute(tx))
    }

    // ========== Transactions ==========

    /// Run `f` in a read-only snapshot and return its value
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        self.storage.read(f)
    }

    /// Run `f` in a write transaction and return its value once committed
    ///
    /// Any error from `f` discards every write it made.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        self.storage.write(f)
    }

    /// Run `f` in a write transaction that may be coalesced with concurrent
    /// batch calls; `f` may be invoked more than once
    pub fn batch(&self, f: BatchFn) -> Result<()> {
        self.storage.batch(f)
    }

    /// Close the storage; later operations fail with `StorageUnavailable`
    pub fn close(&self) -> Result<()> {
        self.storage.close()?;
        info!(target: "docstore::db", name = %self.name, "database closed");
        Ok(())
    }

    /// Whether [`Database::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.storage.is_closed()
    }
}
