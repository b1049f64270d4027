//! Error types for docstore
//!
//! Every crate in the workspace reports failures through the single [`Error`]
//! enum defined here. We use `thiserror` for the `Display` and `Error`
//! implementations.
//!
//! ## Propagation rules
//!
//! - Engine failures (`StorageUnavailable`, `Io`, `Corruption`) and constraint
//!   failures (`UniqueConstraintViolation`) returned from a transaction
//!   function roll the whole transaction back.
//! - `TypeMismatch` aborts the query being evaluated. The caller decides
//!   whether the enclosing transaction goes with it.
//! - `IndexCorrupt` is recoverable; query evaluation repairs or skips the
//!   dangling reference instead of returning it.

use std::io;
use thiserror::Error;

/// Result type alias for docstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the document store
#[derive(Debug, Error)]
pub enum Error {
    /// A bucket, document, collection or index was required but absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Bucket, collection, index or document creation collided with an existing one
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Write attempted through a read-only transaction
    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    /// A unique index already maps the value to another document
    #[error("unique constraint violated on index '{index}'")]
    UniqueConstraintViolation {
        /// Name of the violated index
        index: String,
        /// Key of the document already holding the value
        existing: Vec<u8>,
    },

    /// Query comparison between incompatible runtime types
    #[error("type mismatch: cannot compare {left} with {right}")]
    TypeMismatch {
        /// Type of the left operand
        left: &'static str,
        /// Type of the right operand
        right: &'static str,
    },

    /// An index entry references a document that no longer exists
    #[error("index '{index}' references missing document {key:?}")]
    IndexCorrupt {
        /// Name of the index holding the dangling reference
        index: String,
        /// The dangling document key
        key: Vec<u8>,
    },

    /// The underlying storage engine failed or has been closed
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Malformed bucket path or collection name
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Empty key, or a document key of the wrong length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Key holds a sub-bucket where a value was expected, or the reverse
    #[error("incompatible value at key {0:?}")]
    IncompatibleValue(Vec<u8>),

    /// A bucket handle was used after its transaction finished
    #[error("transaction closed: bucket handle used outside its transaction")]
    TransactionClosed,

    /// Query chain does not alternate operands and operators
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// Collection refers to a codec that was never registered
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    /// Encoding or decoding a document failed
    #[error("codec error: {0}")]
    Codec(String),

    /// Persisted data failed validation
    #[error("data corruption: {0}")]
    Corruption(String),

    /// I/O error from the persistence layer
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be read or is invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`]
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Shorthand for [`Error::AlreadyExists`]
    pub fn already_exists(what: impl Into<String>) -> Self {
        Error::AlreadyExists(what.into())
    }

    /// Shorthand for [`Error::StorageUnavailable`]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Error::StorageUnavailable(reason.into())
    }

    /// True for [`Error::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True for [`Error::UniqueConstraintViolation`]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::UniqueConstraintViolation { .. })
    }

    /// Whether this error must roll back the transaction it escapes from.
    ///
    /// Query-level errors (`TypeMismatch`, `MalformedQuery`) and the
    /// recoverable `IndexCorrupt` leave that decision to the caller.
    pub fn aborts_transaction(&self) -> bool {
        !matches!(
            self,
            Error::TypeMismatch { .. } | Error::MalformedQuery(_) | Error::IndexCorrupt { .. }
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Corruption(e.to_string())
    }
}
