//! Index Tests
//!
//! Index maintenance on every write, constraints, and recovery from
//! references that no longer match a document.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;

use crate::common::*;

fn age_keys(db: &Database, age: i64) -> Vec<String> {
    let users = db.collection("users").unwrap();
    let keys = db
        .view(|tx| users.lookup(tx, "age", &json!(age)))
        .unwrap();
    keys.into_iter()
        .map(|k| String::from_utf8_lossy(&k).into_owned())
        .collect()
}

/// Delete a document bucket entry behind the collection's back.
fn delete_raw(db: &Database, collection: &str, key: &[u8]) {
    let collection = db.collection(collection).unwrap();
    db.update(|tx| {
        let bucket = tx
            .bucket(collection.path())?
            .ok_or_else(|| Error::not_found("collection bucket"))?;
        bucket.delete(key)
    })
    .unwrap();
}

// ============================================================================
// Maintenance
// ============================================================================

#[test]
fn replacing_a_document_moves_its_index_entry() {
    let db = users_db();
    assert_eq!(age_keys(&db, 30), vec!["a", "c"]);

    db.put("users", &key('a'), &json!({"id": "a", "age": 31}))
        .unwrap();
    assert_eq!(age_keys(&db, 30), vec!["c"]);
    assert_eq!(age_keys(&db, 31), vec!["a"]);
    assert!(db.verify_indexes("users").unwrap().is_consistent());
}

#[test]
fn deleting_a_document_removes_its_index_entry() {
    let db = users_db();
    assert!(db.delete("users", &key('c')).unwrap());
    assert!(!db.delete("users", &key('c')).unwrap());
    assert_eq!(age_keys(&db, 30), vec!["a"]);

    db.delete("users", &key('a')).unwrap();
    assert!(age_keys(&db, 30).is_empty());
    assert!(db.verify_indexes("users").unwrap().is_consistent());
}

#[test]
fn index_created_later_is_backfilled() {
    let db = users_db();
    db.create_index("users", IndexSpec::new("id", "id"))
        .unwrap();

    let mut q = db.select("users").unwrap();
    q.cond().path("id").eq().str("b");
    let out = db.find(&q).unwrap();
    assert_eq!(
        out.stats.plan,
        QueryPlan::IndexLookup {
            index: "id".to_string(),
            value: json!("b"),
        }
    );
    assert_eq!(key_names(out.keys()), vec!["b"]);
}

#[test]
fn duplicate_index_name_is_rejected() {
    let db = users_db();
    let err = db
        .create_index("users", IndexSpec::new("age", "id"))
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

// ============================================================================
// Unique constraint
// ============================================================================

#[test]
fn unique_violation_rejects_the_whole_write() {
    let db = memory_db();
    db.create_collection_with(
        CollectionSpec::new("accounts")
            .key_len(1)
            .index(IndexSpec::new("email", "email").unique())
            .index(IndexSpec::new("plan", "plan")),
    )
    .unwrap();
    db.put("accounts", &key('a'), &json!({"email": "a@x", "plan": "free"}))
        .unwrap();

    let err = db
        .put("accounts", &key('b'), &json!({"email": "a@x", "plan": "pro"}))
        .unwrap_err();
    match &err {
        Error::UniqueConstraintViolation { index, existing } => {
            assert_eq!(index, "email");
            assert_eq!(existing, &key('a'));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_constraint_violation());

    // neither the document nor its other index entry was written
    assert_eq!(db.get("accounts", &key('b')).unwrap(), None);
    let accounts = db.collection("accounts").unwrap();
    let pro = db
        .view(|tx| accounts.lookup(tx, "plan", &json!("pro")))
        .unwrap();
    assert!(pro.is_empty());
}

#[test]
fn unique_index_allows_rewriting_the_same_document() {
    let db = memory_db();
    db.create_collection_with(
        CollectionSpec::new("accounts")
            .key_len(1)
            .index(IndexSpec::new("email", "email").unique()),
    )
    .unwrap();
    db.put("accounts", &key('a'), &json!({"email": "a@x", "n": 1}))
        .unwrap();
    db.put("accounts", &key('a'), &json!({"email": "a@x", "n": 2}))
        .unwrap();
    assert_eq!(
        db.get("accounts", &key('a')).unwrap(),
        Some(json!({"email": "a@x", "n": 2}))
    );
}

#[test]
fn violation_inside_update_rolls_back_earlier_writes() {
    let db = memory_db();
    db.create_collection_with(
        CollectionSpec::new("accounts")
            .key_len(1)
            .index(IndexSpec::new("email", "email").unique()),
    )
    .unwrap();
    let accounts = db.collection("accounts").unwrap();

    let result = db.update(|tx| {
        accounts.put(tx, &key('a'), &json!({"email": "same"}))?;
        accounts.put(tx, &key('b'), &json!({"email": "same"}))
    });
    assert!(result.unwrap_err().aborts_transaction());
    assert_eq!(db.count("accounts").unwrap(), 0);
}

// ============================================================================
// Fulltext
// ============================================================================

#[test]
fn fulltext_lookup_requires_every_word() {
    let db = memory_db();
    db.create_collection_with(
        CollectionSpec::new("notes")
            .key_len(1)
            .index(IndexSpec::new("body", "body").fulltext()),
    )
    .unwrap();
    db.put("notes", &key('1'), &json!({"body": "The quick brown fox"}))
        .unwrap();
    db.put("notes", &key('2'), &json!({"body": "A quick red fox!"}))
        .unwrap();
    db.put("notes", &key('3'), &json!({"body": "Slow brown bear"}))
        .unwrap();

    let notes = db.collection("notes").unwrap();
    let find = |text: &str| {
        db.view(|tx| notes.lookup(tx, "body", &json!(text)))
            .unwrap()
            .into_iter()
            .map(|k| String::from_utf8_lossy(&k).into_owned())
            .collect::<Vec<_>>()
    };
    assert_eq!(find("QUICK fox"), vec!["1", "2"]);
    assert_eq!(find("brown"), vec!["1", "3"]);
    assert_eq!(find("brown fox"), vec!["1"]);
    assert!(find("purple").is_empty());

    // fulltext indexes never drive equality queries
    let mut q = db.select("notes").unwrap();
    q.cond().path("body").eq().str("Slow brown bear");
    let out = db.find(&q).unwrap();
    assert_eq!(out.stats.plan, QueryPlan::FullScan);
    assert_eq!(key_names(out.keys()), vec!["3"]);
}

// ============================================================================
// Dangling references
// ============================================================================

#[test]
fn read_only_query_skips_dangling_reference() {
    let db = users_db();
    delete_raw(&db, "users", &key('a'));

    let mut q = db.select("users").unwrap();
    q.cond().path("age").eq().int(30);
    let out = db.find(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["c"]);
    assert_eq!(out.stats.dangling, 1);

    // still there for the next reader
    let report = db.verify_indexes("users").unwrap();
    assert_eq!(report.dangling.len(), 1);
    assert_eq!(report.dangling[0].key, key('a'));
}

#[test]
fn writable_query_removes_dangling_reference() {
    let db = users_db();
    delete_raw(&db, "users", &key('a'));

    let mut q = db.select("users").unwrap();
    q.cond().path("age").eq().int(30);
    let out = db.find_and_repair(&q).unwrap();
    assert_eq!(key_names(out.keys()), vec!["c"]);
    assert_eq!(out.stats.dangling, 1);

    assert!(db.verify_indexes("users").unwrap().is_consistent());
    let again = db.find(&q).unwrap();
    assert_eq!(again.stats.dangling, 0);
}

#[test]
fn rebuild_restores_consistency() {
    let db = users_db();
    delete_raw(&db, "users", &key('b'));
    db.update(|tx| {
        let users = db.collection("users")?;
        let bucket = tx
            .bucket(users.path())?
            .ok_or_else(|| Error::not_found("users"))?;
        bucket.put(&key('z'), br#"{"id":"z","age":25}"#)
    })
    .unwrap();

    let report = db.verify_indexes("users").unwrap();
    assert_eq!(report.documents, 3);
    assert_eq!(report.dangling.len(), 1);
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].key, key('z'));

    db.rebuild_indexes("users").unwrap();
    assert!(db.verify_indexes("users").unwrap().is_consistent());
    assert_eq!(age_keys(&db, 25), vec!["z"]);
}

// ============================================================================
// Concurrent index DDL
// ============================================================================

#[test]
fn index_ddl_concurrent_with_writes_keeps_indexes_consistent() {
    const WRITERS: usize = 3;
    const ROUNDS: usize = 200;

    let db = memory_db();
    db.create_collection_with(CollectionSpec::new("c").key_len(1))
        .unwrap();
    let stop = AtomicBool::new(false);
    let failed_puts = AtomicUsize::new(0);

    thread::scope(|s| {
        for t in 0..WRITERS {
            let db = &db;
            let stop = &stop;
            let failed_puts = &failed_puts;
            s.spawn(move || {
                let mut i = 0i64;
                while !stop.load(Ordering::Relaxed) {
                    let k = (t * 50) as u8 + (i % 50) as u8;
                    if db.put("c", &[k], &json!({"age": i})).is_err() {
                        failed_puts.fetch_add(1, Ordering::Relaxed);
                    }
                    i += 1;
                }
            });
        }

        let rounds = || -> Result<usize> {
            let mut inconsistent = 0;
            for _ in 0..ROUNDS {
                db.create_index("c", IndexSpec::new("age", "age"))?;
                if !db.verify_indexes("c")?.is_consistent() {
                    inconsistent += 1;
                }
                db.drop_index("c", "age")?;
            }
            Ok(inconsistent)
        };
        let outcome = rounds();
        // release the writers before any assertion can panic
        stop.store(true, Ordering::Relaxed);
        assert_eq!(outcome.unwrap(), 0);
    });

    assert_eq!(failed_puts.load(Ordering::Relaxed), 0);
    db.create_index("c", IndexSpec::new("age", "age")).unwrap();
    assert!(db.verify_indexes("c").unwrap().is_consistent());
}

#[test]
fn concurrent_create_index_keeps_every_definition() {
    const PER_THREAD: usize = 20;

    let t = TestDb::new();
    t.db.create_collection("users").unwrap();
    t.db.insert("users", &json!({"a": 1, "b": 2})).unwrap();

    let barrier = Barrier::new(2);
    thread::scope(|s| {
        for prefix in ["a", "b"] {
            let db = &t.db;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let name = format!("{}{}", prefix, i);
                    db.create_index("users", IndexSpec::new(name, prefix))
                        .unwrap();
                }
            });
        }
    });
    assert_eq!(
        t.db.collection("users").unwrap().index_names().len(),
        2 * PER_THREAD
    );

    let t = t.reopen();
    let names = t.db.collection("users").unwrap().index_names();
    assert_eq!(names.len(), 2 * PER_THREAD);
    for i in 0..PER_THREAD {
        assert!(names.contains(&format!("a{}", i)));
        assert!(names.contains(&format!("b{}", i)));
    }
    assert!(t.db.verify_indexes("users").unwrap().is_consistent());
}

#[test]
fn drop_index_concurrent_with_drop_index_reports_not_found_once() {
    let db = users_db();
    let results: Vec<Result<()>> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| s.spawn(|| db.drop_index("users", "age")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(Error::NotFound(_)))));
    assert!(db.collection("users").unwrap().index("age").is_none());
    db.put("users", &key('d'), &json!({"id": "d", "age": 40}))
        .unwrap();
}

#[test]
fn index_name_as_long_as_keys_is_rejected() {
    let db = users_db();
    let err = db
        .create_index("users", IndexSpec::new("x", "id"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPath(_)), "{:?}", err);
    assert!(db.collection("users").unwrap().index("x").is_none());
    db.put("users", &key('x'), &json!({"id": "x"})).unwrap();
}
