//! Document engine for docstore
//!
//! This crate builds documents, collections and queries on top of the
//! ordered key/value model in `docstore-core`:
//! - Database: storage handle, catalog and codec registry
//! - Collection: documents keyed by fixed-length byte keys
//! - Index: secondary indexes kept in step with every document write
//! - Query: `Where` filters evaluated left to right, planned against indexes
//!
//! The engine is the only component that knows about:
//! - Document encoding (codecs)
//! - Index bucket layout
//! - The collection catalog

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod collection;
pub mod database;
pub mod document;
pub mod index;
pub mod key;
pub mod query;

pub use codec::{Codec, CodecRegistry, JsonCodec, JSON_CODEC};
pub use collection::{Collection, CollectionMeta, CollectionSpec, IndexFault, IndexReport};
pub use database::{Database, DocstoreConfig, StorageConfig, CONFIG_FILE_NAME};
pub use document::Document;
pub use index::{Index, IndexSpec};
pub use key::{DocKey, DEFAULT_KEY_LEN};
pub use query::{
    select, Cond, Expr, Op, Predicate, Query, QueryOutput, QueryPlan, QueryStats, Where,
};
