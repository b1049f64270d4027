//! Transaction and bucket handles
//!
//! A transaction owns a private root `Arc<Node>`. Views never write to it;
//! updates modify it copy-on-write and the store publishes it on commit.
//! Bucket handles share the transaction state and carry their path, so a
//! handle re-resolves its node on every call and sees the transaction's own
//! writes. Once the transaction function returns the state is marked closed
//! and every handle fails with `TransactionClosed`.

use std::sync::Arc;

use parking_lot::Mutex;

use docstore_core::{Bucket, Cursor, Error, Path, Result, Transaction};

use crate::tree::{Node, NodeCursor};

#[derive(Debug)]
struct TxState {
    root: Arc<Node>,
    open: bool,
    writable: bool,
}

impl TxState {
    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::TransactionClosed)
        }
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.writable {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }
}

type SharedState = Arc<Mutex<TxState>>;

fn segments(path: &Path) -> Vec<Vec<u8>> {
    path.segments()
        .iter()
        .map(|s| s.as_bytes().to_vec())
        .collect()
}

fn display(path: &[Vec<u8>]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.iter()
        .map(|s| format!("/{}", String::from_utf8_lossy(s)))
        .collect()
}

/// One view or update transaction over a [`crate::MemoryStore`]
pub struct MemTransaction {
    state: SharedState,
    writable: bool,
}

impl MemTransaction {
    pub(crate) fn begin(root: Arc<Node>, writable: bool) -> Self {
        MemTransaction {
            state: Arc::new(Mutex::new(TxState {
                root,
                open: true,
                writable,
            })),
            writable,
        }
    }

    /// Close the transaction and hand back its root
    pub(crate) fn finish(self) -> Arc<Node> {
        let mut state = self.state.lock();
        state.open = false;
        Arc::clone(&state.root)
    }

    fn handle(&self, path: Vec<Vec<u8>>) -> Box<dyn Bucket> {
        Box::new(MemBucket {
            state: Arc::clone(&self.state),
            path,
            writable: self.writable,
        })
    }
}

impl Transaction for MemTransaction {
    fn writable(&self) -> bool {
        self.writable
    }

    fn bucket(&self, path: &Path) -> Result<Option<Box<dyn Bucket>>> {
        let segs = segments(path);
        let state = self.state.lock();
        state.check_open()?;
        let exists = state.root.resolve(&segs).is_some();
        drop(state);
        Ok(exists.then(|| self.handle(segs)))
    }

    fn create_bucket(&self, path: &Path) -> Result<Box<dyn Bucket>> {
        let segs = segments(path);
        let mut state = self.state.lock();
        state.check_writable()?;
        let (name, parent) = match segs.split_last() {
            Some(split) => split,
            None => return Err(Error::already_exists("/")),
        };
        let parent_node = state.root.resolve_mut(parent).map_err(|e| match e {
            Error::NotFound(_) => Error::not_found(display(parent)),
            other => other,
        })?;
        parent_node.create_child(name).map_err(|e| match e {
            Error::AlreadyExists(_) => Error::already_exists(path.to_string()),
            other => other,
        })?;
        drop(state);
        Ok(self.handle(segs))
    }

    fn create_bucket_if_not_exists(&self, path: &Path) -> Result<Box<dyn Bucket>> {
        let segs = segments(path);
        let mut state = self.state.lock();
        state.check_writable()?;
        let mut node = Arc::make_mut(&mut state.root);
        for segment in &segs {
            if !node.contains(segment) {
                node.create_child(segment)?;
            }
            node = node.child_mut(segment)?;
        }
        drop(state);
        Ok(self.handle(segs))
    }

    fn delete_bucket(&self, path: &Path) -> Result<()> {
        let segs = segments(path);
        let mut state = self.state.lock();
        state.check_writable()?;
        let (name, parent) = match segs.split_last() {
            Some(split) => split,
            None => return Err(Error::InvalidPath("cannot delete the root bucket".to_string())),
        };
        let parent_node = state
            .root
            .resolve_mut(parent)
            .map_err(|_| Error::not_found(path.to_string()))?;
        parent_node.remove_child(name).map_err(|e| match e {
            Error::NotFound(_) => Error::not_found(path.to_string()),
            other => other,
        })
    }

    fn for_each_bucket(&self, f: &mut dyn FnMut(&Path, &dyn Bucket) -> Result<()>) -> Result<()> {
        let names = {
            let state = self.state.lock();
            state.check_open()?;
            state.root.child_names()
        };
        for name in names {
            let path = Path::new(&String::from_utf8_lossy(&name));
            let bucket = self.handle(vec![name]);
            f(&path, bucket.as_ref())?;
        }
        Ok(())
    }
}

/// Handle to one bucket inside a [`MemTransaction`]
pub struct MemBucket {
    state: SharedState,
    path: Vec<Vec<u8>>,
    writable: bool,
}

impl MemBucket {
    /// Snapshot of this bucket's node as of now in the transaction
    fn node(&self) -> Result<Arc<Node>> {
        let state = self.state.lock();
        state.check_open()?;
        state
            .root
            .resolve(&self.path)
            .cloned()
            .ok_or_else(|| Error::not_found(display(&self.path)))
    }

    fn with_node_mut<T>(&self, f: impl FnOnce(&mut Node) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        state.check_writable()?;
        let node = state.root.resolve_mut(&self.path).map_err(|e| match e {
            Error::NotFound(_) => Error::not_found(display(&self.path)),
            other => other,
        })?;
        f(node)
    }
}

impl Bucket for MemBucket {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.node()?.get(key).map(<[u8]>::to_vec))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_node_mut(|node| node.put(key, value))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_node_mut(|node| node.delete(key))
    }

    fn for_each(&self, f: &mut dyn FnMut(&[u8], Option<&[u8]>) -> Result<()>) -> Result<()> {
        let node = self.node()?;
        for (key, value) in node.iter() {
            f(key, value)?;
        }
        Ok(())
    }

    fn cursor(&self) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(NodeCursor::new(self.node()?)))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.node()?.value_count())
    }

    fn writable(&self) -> bool {
        self.writable
    }
}
