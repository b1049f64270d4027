//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::Once;

pub use docstore::{
    select, CollectionSpec, Database, DocKey, DocstoreConfig, Document, Error, IndexSpec, Path,
    Query, QueryPlan, Result, StorageExt, Transaction, Where,
};
pub use serde_json::json;
use tempfile::TempDir;

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output to the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        if std::env::var_os("RUST_LOG").is_some() {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        }
    });
}

/// In-memory database with default configuration.
pub fn memory_db() -> Database {
    init_tracing();
    Database::open_in_memory(DocstoreConfig::default()).expect("in-memory database")
}

/// Database persisted in a fresh temporary directory.
pub struct TestDb {
    pub db: Database,
    pub dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::open_dir(dir.path(), "test").expect("database");
        TestDb { db, dir }
    }

    /// Close and open again from the same directory.
    pub fn reopen(self) -> Self {
        self.db.close().expect("close");
        let db = Database::open_dir(self.dir.path(), "test").expect("reopen");
        TestDb { db, dir: self.dir }
    }
}

/// Single-byte key, readable in assertions.
pub fn key(c: char) -> Vec<u8> {
    vec![c as u8]
}

/// `users` collection with one-byte keys and an index on `age`, holding
/// documents a, b and c with `id` equal to their key and ages 30, 25, 30.
pub fn users_db() -> Database {
    let db = memory_db();
    db.create_collection_with(
        CollectionSpec::new("users")
            .key_len(1)
            .index(IndexSpec::new("age", "age")),
    )
    .expect("users collection");
    db.put("users", &key('a'), &json!({"id": "a", "age": 30}))
        .unwrap();
    db.put("users", &key('b'), &json!({"id": "b", "age": 25}))
        .unwrap();
    db.put("users", &key('c'), &json!({"id": "c", "age": 30}))
        .unwrap();
    db
}

/// Keys of a query result as strings.
pub fn key_names(keys: Vec<&[u8]>) -> Vec<String> {
    keys.into_iter()
        .map(|k| String::from_utf8_lossy(k).into_owned())
        .collect()
}
