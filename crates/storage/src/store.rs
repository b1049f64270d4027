//! MemoryStore: copy-on-write bucket tree with snapshot transactions
//!
//! This module implements the [`Storage`] trait using:
//! - an `Arc<Node>` root published under a `parking_lot::RwLock`
//! - a writer mutex so at most one update runs at a time
//! - `AtomicU64` counting commits
//! - an optional [`DataFile`] the tree is written to before each commit
//!   becomes visible
//!
//! # Design Notes
//!
//! - **Snapshot reads**: a view clones the root `Arc` and never blocks writers.
//! - **Rollback is free**: an update works on its own root; dropping it
//!   discards every write.
//! - **Durability before visibility**: with a data file attached, a commit
//!   that fails to persist is reported as an error and not published.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};

use docstore_core::{BatchFn, Error, Result, Storage, Transaction};

use crate::batch::Batcher;
use crate::options::StoreOptions;
use crate::persist::DataFile;
use crate::tree::Node;
use crate::tx::MemTransaction;

/// In-memory storage engine, optionally backed by a data file
pub struct MemoryStore {
    name: String,
    /// Last committed tree
    committed: RwLock<Arc<Node>>,
    /// Serializes updates
    writer: Mutex<()>,
    closed: AtomicBool,
    commits: AtomicU64,
    batcher: Batcher,
    file: Option<DataFile>,
    options: StoreOptions,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .field("commits", &self.commit_count())
            .field("file", &self.file.as_ref().map(DataFile::path))
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, StoreOptions::default())
    }

    /// Create an empty store
    pub fn with_options(name: impl Into<String>, options: StoreOptions) -> Self {
        Self::from_parts(name.into(), Arc::new(Node::new()), None, options)
    }

    /// Open a store persisted at `path`, creating it if missing
    ///
    /// # Errors
    ///
    /// `Corruption` if the file fails validation, `Io` if it cannot be read.
    pub fn open_file(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        options: StoreOptions,
    ) -> Result<Self> {
        let name = name.into();
        let file = DataFile::new(path, options.sync_on_commit);
        let root = match file.load()? {
            Some(root) => {
                info!(target: "docstore::storage", name = %name, path = ?file.path(), "loaded data file");
                root
            }
            None => Node::new(),
        };
        Ok(Self::from_parts(name, Arc::new(root), Some(file), options))
    }

    /// A fresh, open store sharing this store's last committed tree
    pub(crate) fn reopen(&self) -> Self {
        Self::from_parts(
            self.name.clone(),
            self.snapshot(),
            self.file.clone(),
            self.options.clone(),
        )
    }

    fn from_parts(
        name: String,
        root: Arc<Node>,
        file: Option<DataFile>,
        options: StoreOptions,
    ) -> Self {
        MemoryStore {
            name,
            committed: RwLock::new(root),
            writer: Mutex::new(()),
            closed: AtomicBool::new(false),
            commits: AtomicU64::new(0),
            batcher: Batcher::new(&options),
            file,
            options,
        }
    }

    /// Name the store was opened under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options in effect
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Number of updates committed since this instance was opened
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> Arc<Node> {
        Arc::clone(&*self.committed.read())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::unavailable(format!("store '{}' is closed", self.name)))
        } else {
            Ok(())
        }
    }

    fn commit(&self, root: Arc<Node>) -> Result<()> {
        if let Some(file) = &self.file {
            file.persist(&root)?;
        }
        *self.committed.write() = root;
        let n = self.commits.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(target: "docstore::storage", name = %self.name, commit = n, "committed");
        Ok(())
    }
}

impl Storage for MemoryStore {
    fn view(&self, f: &mut dyn FnMut(&dyn Transaction) -> Result<()>) -> Result<()> {
        self.ensure_open()?;
        let tx = MemTransaction::begin(self.snapshot(), false);
        let result = f(&tx);
        tx.finish();
        result
    }

    fn update(&self, f: &mut dyn FnMut(&dyn Transaction) -> Result<()>) -> Result<()> {
        self.ensure_open()?;
        let _writer = self.writer.lock();
        // close() may have won the race for the writer lock
        self.ensure_open()?;

        let tx = MemTransaction::begin(self.snapshot(), true);
        let result = f(&tx);
        let root = tx.finish();
        match result {
            Ok(()) => self.commit(root),
            Err(e) => {
                debug!(target: "docstore::storage", name = %self.name, error = %e, "rolled back");
                Err(e)
            }
        }
    }

    fn batch(&self, f: BatchFn) -> Result<()> {
        self.ensure_open()?;
        self.batcher.submit(self, f)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // wait for an in-flight update to finish
        drop(self.writer.lock());
        info!(target: "docstore::storage", name = %self.name, commits = self.commit_count(), "store closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{Path, StorageExt};

    fn put(store: &MemoryStore, bucket: &str, key: &str, value: &str) -> Result<()> {
        store.write(|tx| {
            let b = tx.create_bucket_if_not_exists(&Path::new(bucket))?;
            b.put(key.as_bytes(), value.as_bytes())
        })
    }

    fn get(store: &MemoryStore, bucket: &str, key: &str) -> Option<Vec<u8>> {
        store
            .read(|tx| match tx.bucket(&Path::new(bucket))? {
                Some(b) => b.get(key.as_bytes()),
                None => Ok(None),
            })
            .unwrap()
    }

    #[test]
    fn test_update_commits_on_ok() {
        let store = MemoryStore::new("t");
        put(&store, "users", "alice", "1").unwrap();
        assert_eq!(get(&store, "users", "alice"), Some(b"1".to_vec()));
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_update_rolls_back_on_err() {
        let store = MemoryStore::new("t");
        put(&store, "users", "alice", "1").unwrap();
        let before = store.snapshot();

        let result = store.update(&mut |tx| {
            let b = tx.bucket(&Path::new("users"))?.ok_or_else(|| Error::not_found("users"))?;
            b.put(b"alice", b"2")?;
            b.put(b"bob", b"3")?;
            tx.create_bucket(&Path::new("extra"))?;
            Err(Error::unavailable("abort"))
        });

        assert!(result.is_err());
        assert_eq!(*store.snapshot(), *before);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_view_sees_snapshot_from_its_start() {
        let store = MemoryStore::new("t");
        put(&store, "b", "k", "old").unwrap();

        store
            .view(&mut |tx| {
                let b = tx.bucket(&Path::new("b"))?.ok_or_else(|| Error::not_found("b"))?;
                put(&store, "b", "k", "new")?;
                assert_eq!(b.get(b"k")?, Some(b"old".to_vec()));
                Ok(())
            })
            .unwrap();

        assert_eq!(get(&store, "b", "k"), Some(b"new".to_vec()));
    }

    #[test]
    fn test_escaped_handle_reports_transaction_closed() {
        let store = MemoryStore::new("t");
        let mut escaped = None;
        store
            .update(&mut |tx| {
                escaped = Some(tx.create_bucket_if_not_exists(&Path::new("b"))?);
                Ok(())
            })
            .unwrap();
        let handle = escaped.unwrap();
        assert!(matches!(handle.get(b"k"), Err(Error::TransactionClosed)));
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_use() {
        let store = MemoryStore::new("t");
        store.close().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.view(&mut |_| Ok(())), Err(Error::StorageUnavailable(_))));
        assert!(matches!(store.update(&mut |_| Ok(())), Err(Error::StorageUnavailable(_))));
    }

    #[test]
    fn test_reopen_keeps_committed_tree() {
        let store = MemoryStore::new("t");
        put(&store, "b", "k", "v").unwrap();
        store.close().unwrap();
        let reopened = store.reopen();
        assert!(!reopened.is_closed());
        assert_eq!(get(&reopened, "b", "k"), Some(b"v".to_vec()));
    }
}
