//! Core types and traits for docstore
//!
//! This crate defines the engine-agnostic pieces every other crate builds on:
//! - Path: `/`-separated bucket (and document field) addresses
//! - Cursor: ordered iteration contract, plus `SliceCursor`
//! - MatchCursor / SubstituteCursor: composable cursor adapters
//! - Traits: Bucket, Transaction, Storage, Driver
//! - Error: the error taxonomy shared by the workspace

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod error;
pub mod path;
pub mod traits;

pub use cursor::{Cursor, Entries, Entry, MatchCursor, SliceCursor, SubstituteCursor};
pub use error::{Error, Result};
pub use path::{Path, PATH_SEPARATOR};
pub use traits::{BatchFn, Bucket, Driver, Storage, StorageExt, Transaction};
