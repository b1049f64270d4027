//! docstore - embedded document database over an ordered key/value store
//!
//! Documents live in collections, each collection is a bucket of fixed-length
//! keys, and secondary indexes are kept in buckets nested under it. Queries
//! are built from `Where` filters and use an index when the filter starts
//! with an equality on an indexed field.
//!
//! # Quick Start
//!
//! ```
//! use docstore::{CollectionSpec, Database, DocstoreConfig, IndexSpec};
//! use serde_json::json;
//!
//! let db = Database::open_in_memory(DocstoreConfig::default())?;
//! db.create_collection_with(
//!     CollectionSpec::new("users").index(IndexSpec::new("age", "age")),
//! )?;
//! db.insert("users", &json!({"name": "ada", "age": 36}))?;
//!
//! let mut query = db.select("users")?;
//! query.cond().path("age").eq().int(36);
//! let found = db.find(&query)?;
//! assert_eq!(found.len(), 1);
//! assert!(found.stats.plan.uses_index());
//! # Ok::<(), docstore::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `docstore-core`: storage traits, cursors, bucket paths, errors
//! - `docstore-storage`: the in-memory store and its file-backed driver
//! - `docstore-engine`: collections, indexes, queries and the database

pub use docstore_core::{
    BatchFn, Bucket, Cursor, Driver, Entry, Error, MatchCursor, Path, Result, SliceCursor,
    Storage, StorageExt, SubstituteCursor, Transaction,
};
pub use docstore_engine::*;
pub use docstore_storage::{FileDriver, MemoryDriver, MemoryStore, StoreOptions};
