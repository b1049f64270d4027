//! Storage layer for docstore
//!
//! This crate implements the engine behind the `docstore_core` storage traits:
//! - MemoryStore: copy-on-write bucket tree with snapshot views
//! - Single-writer updates with all-or-nothing commit
//! - Batch coalescing of concurrent write functions
//! - Optional data file persistence with CRC32 validation
//! - MemoryDriver and FileDriver for opening stores by name

#![warn(missing_docs)]
#![warn(clippy::all)]

mod batch;
pub mod driver;
pub mod options;
pub mod persist;
pub mod store;
pub mod tree;
pub mod tx;

pub use driver::{FileDriver, MemoryDriver};
pub use options::StoreOptions;
pub use persist::DataFile;
pub use store::MemoryStore;
pub use tree::{Node, NodeCursor};
pub use tx::{MemBucket, MemTransaction};
