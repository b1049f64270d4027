//! Engine-agnostic storage contract
//!
//! These traits are everything the document layer needs from an embedded
//! key-value engine: nested buckets of ordered pairs, read-only and read-write
//! transactions, and cursors. Swapping the engine means implementing them
//! and exposing a [`Driver`].
//!
//! Thread safety: [`Storage`] must be `Send + Sync`. Buckets and cursors are
//! only valid inside the transaction function that produced them.

use std::sync::Arc;

use crate::cursor::Cursor;
use crate::error::Result;
use crate::path::Path;

/// A named container of ordered key/value pairs and sub-buckets
///
/// Handles are tied to their transaction. Once the transaction function
/// returns every method fails with `Error::TransactionClosed`.
pub trait Bucket {
    /// Point lookup
    ///
    /// Returns `None` if the key is absent or names a sub-bucket. The bytes
    /// are an owned copy.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite a value
    ///
    /// # Errors
    ///
    /// `ReadOnly` in a view transaction, `InvalidKey` for an empty key,
    /// `IncompatibleValue` if the key names a sub-bucket.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove a value; absent keys are a no-op
    ///
    /// # Errors
    ///
    /// `ReadOnly` in a view transaction, `IncompatibleValue` if the key names
    /// a sub-bucket.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Visit every direct pair in key order
    ///
    /// The value is `None` for keys naming a sub-bucket. The callback must not
    /// modify the bucket. Its first error stops the walk and is returned.
    fn for_each(&self, f: &mut dyn FnMut(&[u8], Option<&[u8]>) -> Result<()>) -> Result<()>;

    /// A fresh cursor positioned before the first pair
    fn cursor(&self) -> Result<Box<dyn Cursor>>;

    /// Number of direct value pairs (sub-buckets excluded)
    fn len(&self) -> Result<usize>;

    /// True when the bucket holds no value pairs
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether writes are allowed through this handle
    fn writable(&self) -> bool;
}

/// One transaction: bucket lookup and creation rooted at a [`Path`]
pub trait Transaction {
    /// Whether this is a read-write transaction
    fn writable(&self) -> bool;

    /// Resolve a path to a bucket; the root path always resolves
    fn bucket(&self, path: &Path) -> Result<Option<Box<dyn Bucket>>>;

    /// Create a bucket whose parent already exists
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the path is taken, `NotFound` if the parent is
    /// missing, `ReadOnly` in a view.
    fn create_bucket(&self, path: &Path) -> Result<Box<dyn Bucket>>;

    /// Return the bucket at `path`, creating it and any missing parents
    fn create_bucket_if_not_exists(&self, path: &Path) -> Result<Box<dyn Bucket>>;

    /// Remove a bucket and everything beneath it
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `InvalidPath` for the root, `ReadOnly` in a view.
    fn delete_bucket(&self, path: &Path) -> Result<()>;

    /// Visit the direct child buckets of the root in key order
    fn for_each_bucket(&self, f: &mut dyn FnMut(&Path, &dyn Bucket) -> Result<()>) -> Result<()>;
}

/// Transaction function accepted by [`Storage::batch`]
///
/// The engine may call it more than once, so it must not have side effects
/// outside the transaction it is given.
pub type BatchFn = Arc<dyn Fn(&dyn Transaction) -> Result<()> + Send + Sync>;

/// A storage engine instance
pub trait Storage: Send + Sync {
    /// Run `f` in a read-only snapshot transaction
    fn view(&self, f: &mut dyn FnMut(&dyn Transaction) -> Result<()>) -> Result<()>;

    /// Run `f` in a read-write transaction
    ///
    /// Commits atomically if `f` returns `Ok`; discards every write otherwise.
    fn update(&self, f: &mut dyn FnMut(&dyn Transaction) -> Result<()>) -> Result<()>;

    /// Like [`Storage::update`], but the engine may coalesce concurrent
    /// calls into one commit and may invoke `f` more than once
    fn batch(&self, f: BatchFn) -> Result<()>;

    /// Release all resources; a second call is a no-op
    fn close(&self) -> Result<()>;

    /// Whether [`Storage::close`] has been called
    fn is_closed(&self) -> bool;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn view(&self, f: &mut dyn FnMut(&dyn Transaction) -> Result<()>) -> Result<()> {
        (**self).view(f)
    }

    fn update(&self, f: &mut dyn FnMut(&dyn Transaction) -> Result<()>) -> Result<()> {
        (**self).update(f)
    }

    fn batch(&self, f: BatchFn) -> Result<()> {
        (**self).batch(f)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn view(&self, f: &mut dyn FnMut(&dyn Transaction) -> Result<()>) -> Result<()> {
        (**self).view(f)
    }

    fn update(&self, f: &mut dyn FnMut(&dyn Transaction) -> Result<()>) -> Result<()> {
        (**self).update(f)
    }

    fn batch(&self, f: BatchFn) -> Result<()> {
        (**self).batch(f)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Value-returning wrappers around [`Storage::view`] and [`Storage::update`]
///
/// # Example
///
/// ```text
/// let count = storage.read(|tx| {
///     let users = tx.bucket(&Path::new("users"))?;
///     users.map_or(Ok(0), |b| b.len())
/// })?;
/// ```
pub trait StorageExt: Storage {
    /// Run `f` in a view and return its value
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        let mut f = Some(f);
        let mut out = None;
        self.view(&mut |tx| {
            if let Some(f) = f.take() {
                out = Some(f(tx)?);
            }
            Ok(())
        })?;
        out.ok_or_else(|| crate::Error::unavailable("view function was not invoked"))
    }

    /// Run `f` in an update and return its value once committed
    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        let mut f = Some(f);
        let mut out = None;
        self.update(&mut |tx| {
            if let Some(f) = f.take() {
                out = Some(f(tx)?);
            }
            Ok(())
        })?;
        out.ok_or_else(|| crate::Error::unavailable("update function was not invoked"))
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

/// Opens storage instances by name
pub trait Driver: Send + Sync {
    /// Open (or create) the storage called `name`
    fn open(&self, name: &str) -> Result<Box<dyn Storage>>;
}
