//! Database Lifecycle Tests
//!
//! Opening, closing and reopening, configuration files, and codecs.

use std::sync::Arc;

use crate::common::*;
use docstore::{Codec, CONFIG_FILE_NAME};

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn collections_indexes_and_documents_survive_reopen() {
    let t = TestDb::new();
    t.db.create_collection_with(
        CollectionSpec::new("users").index(IndexSpec::new("email", "email").unique()),
    )
    .unwrap();
    let id = t.db.insert("users", &json!({"email": "ann@x"})).unwrap();

    let t = t.reopen();
    assert_eq!(t.db.collection_names(), vec!["users".to_string()]);
    assert_eq!(
        t.db.get("users", id.as_bytes()).unwrap(),
        Some(json!({"email": "ann@x"}))
    );

    // the unique index is enforced after reload
    let err = t.db.insert("users", &json!({"email": "ann@x"})).unwrap_err();
    assert!(err.is_constraint_violation());
}

#[test]
fn dropped_collection_stays_dropped() {
    let t = TestDb::new();
    t.db.create_collection("a").unwrap();
    t.db.create_collection("b").unwrap();
    t.db.drop_collection("a").unwrap();

    let t = t.reopen();
    assert_eq!(t.db.collection_names(), vec!["b".to_string()]);
    assert!(matches!(t.db.collection("a"), Err(Error::NotFound(_))));
}

#[test]
fn dropped_index_stays_dropped() {
    let t = TestDb::new();
    t.db.create_collection_with(
        CollectionSpec::new("users").index(IndexSpec::new("age", "age")),
    )
    .unwrap();
    t.db.drop_index("users", "age").unwrap();

    let t = t.reopen();
    assert!(t.db.collection("users").unwrap().index_names().is_empty());
    let mut q = t.db.select("users").unwrap();
    q.cond().path("age").eq().int(1);
    assert_eq!(q.explain().unwrap(), QueryPlan::FullScan);
}

#[test]
fn closed_database_refuses_work() {
    let t = TestDb::new();
    t.db.create_collection("users").unwrap();
    t.db.close().unwrap();
    assert!(t.db.is_closed());

    let err = t.db.insert("users", &json!({})).unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)), "{:?}", err);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn default_config_file_is_written_on_first_open() {
    let t = TestDb::new();
    let path = t.dir.path().join(CONFIG_FILE_NAME);
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        DocstoreConfig::from_toml_str(&written).unwrap(),
        DocstoreConfig::default()
    );
    assert_eq!(t.db.config(), &DocstoreConfig::default());
    assert_eq!(t.db.data_dir(), Some(t.dir.path()));
}

#[test]
fn config_file_sets_collection_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "key_len = 4\n\n[storage]\nsync_on_commit = false\n",
    )
    .unwrap();

    let db = Database::open_dir(dir.path(), "cfg").unwrap();
    assert_eq!(db.config().key_len, 4);
    assert!(!db.config().storage.sync_on_commit);

    let users = db.create_collection("users").unwrap();
    assert_eq!(users.key_len(), 4);
    db.insert_with_key("users", b"u001", &json!({})).unwrap();
    assert!(matches!(
        db.insert_with_key("users", b"u1", &json!({})),
        Err(Error::InvalidKey(_))
    ));
}

#[test]
fn invalid_config_file_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "key_len = 0\n").unwrap();
    let err = Database::open_dir(dir.path(), "bad").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{:?}", err);
}

// ============================================================================
// Codecs
// ============================================================================

/// Stores documents as JSON with the bytes reversed.
struct Reversed;

impl Codec for Reversed {
    fn name(&self) -> &str {
        "reversed"
    }

    fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(doc).map_err(|e| Error::Codec(e.to_string()))?;
        bytes.reverse();
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        let mut bytes = bytes.to_vec();
        bytes.reverse();
        serde_json::from_slice(&bytes).map_err(|e| Error::Codec(e.to_string()))
    }
}

#[test]
fn custom_codec_round_trips_through_storage() {
    let db = memory_db();
    assert!(matches!(
        db.create_collection_with(CollectionSpec::new("r").codec("reversed")),
        Err(Error::UnknownCodec(_))
    ));

    db.register_codec(Arc::new(Reversed));
    let r = db
        .create_collection_with(CollectionSpec::new("r").key_len(1).codec("reversed"))
        .unwrap();
    assert_eq!(r.codec_name(), "reversed");

    db.put("r", b"k", &json!({"x": 1})).unwrap();
    let raw = db
        .view(|tx| {
            let bucket = tx
                .bucket(r.path())?
                .ok_or_else(|| Error::not_found("r"))?;
            bucket.get(b"k")
        })
        .unwrap()
        .unwrap();
    assert_eq!(raw, b"}1:\"x\"{".to_vec());
    assert_eq!(db.get("r", b"k").unwrap(), Some(json!({"x": 1})));
}

#[test]
fn codec_registered_after_reopen_is_picked_up() {
    let t = TestDb::new();
    t.db.register_codec(Arc::new(Reversed));
    t.db.create_collection_with(CollectionSpec::new("r").key_len(1).codec("reversed"))
        .unwrap();
    t.db.put("r", b"k", &json!({"x": 1})).unwrap();

    let t = t.reopen();
    assert!(matches!(t.db.get("r", b"k"), Err(Error::UnknownCodec(_))));
    t.db.register_codec(Arc::new(Reversed));
    assert_eq!(t.db.get("r", b"k").unwrap(), Some(json!({"x": 1})));
}
