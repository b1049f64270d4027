//! Database integration tests
//!
//! End-to-end behaviour of collections, indexes and queries through the
//! public `docstore` API, over both the in-memory and file-backed drivers.

#[path = "../common/mod.rs"]
mod common;

mod batch;
mod indexes;
mod lifecycle;
mod queries;
