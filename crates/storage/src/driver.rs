//! Drivers: open stores by name
//!
//! [`MemoryDriver`] keeps its stores for the driver's lifetime, so opening the
//! same name twice shares one tree. [`FileDriver`] maps a name to
//! `<dir>/<name>.docstore` and shares open files process-wide.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use docstore_core::{Driver, Error, Result, Storage};

use crate::options::StoreOptions;
use crate::persist::DATA_FILE_EXTENSION;
use crate::store::MemoryStore;

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidPath("storage name must not be empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(Error::InvalidPath(format!("invalid storage name '{}'", name)));
    }
    Ok(())
}

/// Driver for purely in-memory stores
#[derive(Debug, Default)]
pub struct MemoryDriver {
    stores: DashMap<String, Arc<MemoryStore>>,
    options: StoreOptions,
}

impl MemoryDriver {
    /// Driver with default options
    pub fn new() -> Self {
        MemoryDriver::default()
    }

    /// Driver whose stores use `options`
    pub fn with_options(options: StoreOptions) -> Self {
        MemoryDriver {
            stores: DashMap::new(),
            options,
        }
    }

    /// The shared store for `name`, reopened if it was closed
    pub fn open_store(&self, name: &str) -> Result<Arc<MemoryStore>> {
        validate_name(name)?;
        let mut entry = self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::with_options(name, self.options.clone())));
        if entry.is_closed() {
            debug!(target: "docstore::storage", name, "reopening closed in-memory store");
            let reopened = Arc::new(entry.reopen());
            *entry = reopened;
        }
        Ok(Arc::clone(&*entry))
    }

    /// Names of stores opened through this driver
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Driver for MemoryDriver {
    fn open(&self, name: &str) -> Result<Box<dyn Storage>> {
        Ok(Box::new(self.open_store(name)?))
    }
}

/// Open data files (path -> weak reference)
static OPEN_FILES: Lazy<Mutex<HashMap<PathBuf, Weak<MemoryStore>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Driver for stores persisted under one directory
#[derive(Debug, Clone)]
pub struct FileDriver {
    dir: PathBuf,
    options: StoreOptions,
}

impl FileDriver {
    /// Driver rooted at `dir` with default options
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_options(dir, StoreOptions::default())
    }

    /// Driver rooted at `dir`
    pub fn with_options(dir: impl Into<PathBuf>, options: StoreOptions) -> Self {
        FileDriver {
            dir: dir.into(),
            options,
        }
    }

    /// Directory holding the data files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Data file for `name`
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, DATA_FILE_EXTENSION))
    }

    /// The shared store for `name`
    ///
    /// A file already open in this process is returned as-is; a closed or
    /// dropped one is loaded again from disk.
    pub fn open_store(&self, name: &str) -> Result<Arc<MemoryStore>> {
        validate_name(name)?;
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_path(name);
        let key = self
            .dir
            .canonicalize()?
            .join(format!("{}.{}", name, DATA_FILE_EXTENSION));

        let mut open = OPEN_FILES.lock();
        if let Some(store) = open.get(&key).and_then(Weak::upgrade) {
            if !store.is_closed() {
                return Ok(store);
            }
        }
        let store = Arc::new(MemoryStore::open_file(name, &path, self.options.clone())?);
        open.retain(|_, weak| weak.strong_count() > 0);
        open.insert(key, Arc::downgrade(&store));
        Ok(store)
    }
}

impl Driver for FileDriver {
    fn open(&self, name: &str) -> Result<Box<dyn Storage>> {
        Ok(Box::new(self.open_store(name)?))
    }
}
