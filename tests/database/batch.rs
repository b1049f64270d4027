//! Batch and Transaction Tests
//!
//! Grouping document writes into one commit, and coalesced batches from
//! concurrent callers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use crate::common::*;
use docstore::BatchFn;

#[test]
fn update_commits_several_collections_together() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();
    let audit = db.create_collection("audit").unwrap();

    let id = db
        .update(|tx| {
            let id = DocKey::generate();
            users.insert(tx, id.as_bytes(), &json!({"name": "ann"}))?;
            audit.insert(tx, DocKey::generate().as_bytes(), &json!({"created": "ann"}))?;
            Ok(id)
        })
        .unwrap();

    assert!(db.get("users", id.as_bytes()).unwrap().is_some());
    assert_eq!(db.count("audit").unwrap(), 1);
}

#[test]
fn failed_update_leaves_nothing_behind() {
    let db = memory_db();
    let users = db.create_collection("users").unwrap();

    let result: Result<()> = db.update(|tx| {
        users.insert(tx, DocKey::generate().as_bytes(), &json!({"name": "ann"}))?;
        Err(Error::not_found("something the caller needed"))
    });
    assert!(result.is_err());
    assert_eq!(db.count("users").unwrap(), 0);
}

#[test]
fn concurrent_batches_all_commit() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let db = Arc::new(memory_db());
    db.create_collection_with(
        CollectionSpec::new("events").index(IndexSpec::new("thread", "thread")),
    )
    .unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let events = db.collection("events").unwrap();
                    let calls = Arc::clone(&calls);
                    let mut key = [0u8; 16];
                    key[0] = t as u8;
                    key[1] = i as u8;
                    let f: BatchFn = Arc::new(move |tx: &dyn Transaction| {
                        calls.fetch_add(1, Ordering::Relaxed);
                        events.put(tx, &key, &json!({"thread": t, "i": i}))
                    });
                    db.batch(f).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.count("events").unwrap(), THREADS * PER_THREAD);
    assert!(calls.load(Ordering::Relaxed) >= THREADS * PER_THREAD);
    assert!(db.verify_indexes("events").unwrap().is_consistent());

    let mut q = db.select("events").unwrap();
    q.cond().path("thread").eq().int(3);
    assert_eq!(db.find(&q).unwrap().len(), PER_THREAD);
}

#[test]
fn coalesced_batch_with_failing_member_matches_single_application() {
    const MEMBERS: usize = 8;

    let config = DocstoreConfig {
        storage: docstore::StorageConfig {
            max_batch_delay_ms: 50,
            ..Default::default()
        },
        ..Default::default()
    };
    let db = Database::open_in_memory(config).unwrap();
    let spec = CollectionSpec::new("accounts")
        .key_len(1)
        .index(IndexSpec::new("email", "email").unique());
    db.create_collection_with(spec.clone()).unwrap();
    let accounts = db.collection("accounts").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    // members 0 and 1 claim the same email, so exactly one of them fails
    let members: Vec<BatchFn> = (0..MEMBERS)
        .map(|i| {
            let accounts = accounts.clone();
            let calls = Arc::clone(&calls);
            let email = if i < 2 { "dup".to_string() } else { format!("u{}", i) };
            let f: BatchFn = Arc::new(move |tx: &dyn Transaction| {
                calls.fetch_add(1, Ordering::Relaxed);
                accounts.put(tx, &[b'a' + i as u8], &json!({"email": email, "i": i}))
            });
            f
        })
        .collect();

    let barrier = Barrier::new(MEMBERS);
    let results: Vec<Result<()>> = thread::scope(|s| {
        let handles: Vec<_> = members
            .iter()
            .map(|f| {
                let (db, barrier) = (&db, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    db.batch(Arc::clone(f))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let failed: Vec<usize> = (0..MEMBERS).filter(|&i| results[i].is_err()).collect();
    assert_eq!(failed.len(), 1, "{:?}", results);
    assert!(failed[0] < 2);
    assert!(results[failed[0]].as_ref().unwrap_err().is_constraint_violation());
    assert!(calls.load(Ordering::Relaxed) >= MEMBERS);

    // the same successful members applied once each, one transaction apiece
    let reference = memory_db();
    reference.create_collection_with(spec).unwrap();
    for (i, f) in members.iter().enumerate() {
        if i != failed[0] {
            reference.update(|tx| f(tx)).unwrap();
        }
    }

    let state = |db: &Database| {
        let accounts = db.collection("accounts").unwrap();
        db.view(|tx| accounts.documents(tx)).unwrap()
    };
    assert_eq!(state(&db), state(&reference));
    assert_eq!(db.count("accounts").unwrap(), MEMBERS - 1);
    assert!(db.verify_indexes("accounts").unwrap().is_consistent());
    assert_eq!(
        db.view(|tx| accounts.lookup(tx, "email", &json!("dup")))
            .unwrap()
            .len(),
        1
    );
}
