//! Error handling for VellumDB.
//!
//! Every fallible operation in the database returns [`Result<T>`]. The
//! [`Error`] enum is the single error type shared by all components so
//! that consumers can distinguish error kinds with a simple `match`.

use std::io;

use thiserror::Error;

/// Result type alias for VellumDB operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified error type for all VellumDB operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A table with this name already exists.
    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    /// The table is read-only and refuses mutation.
    #[error("table is read-only: {0}")]
    ReadOnlyTable(String),

    /// The requested index does not exist.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// An index with this name already exists.
    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    /// The index enforces a table constraint and cannot be dropped
    /// explicitly.
    #[error("index {0} enforces a table constraint and cannot be dropped")]
    CannotDropConstraintIndex(String),

    /// No document matches the given primary key.
    #[error("document not found")]
    DocumentNotFound,

    /// A document with the same primary key or unique indexed value
    /// already exists.
    #[error("duplicate document")]
    DuplicateDocument,

    /// The document is missing a value at the primary key path, or the
    /// value is empty.
    #[error("document is missing the primary key")]
    MissingPrimaryKey,

    /// The requested field does not exist in the object.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// The requested index does not exist in the array.
    #[error("value not found at array index {0}")]
    ValueNotFound(usize),

    /// Two values of incompatible types were combined.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A mutation was attempted through a read-only transaction.
    #[error("transaction is read-only")]
    TransactionReadOnly,

    /// The transaction has already been committed or rolled back.
    #[error("transaction has already been terminated")]
    TransactionClosed,

    /// The SQL text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The key does not exist in the key-value store.
    #[error("key not found")]
    KeyNotFound,

    /// The key already exists in the key-value store.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// Sentinel returned by iteration callbacks to terminate iteration
    /// early. It is swallowed by the iterating engine and never surfaces
    /// to the caller.
    #[error("iteration stopped")]
    Stop,

    /// An I/O error from the on-disk engine.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Persisted data failed validation while being read back.
    #[error("corrupted data: {0}")]
    Corruption(String),

    /// An invariant was broken; this is a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error is the iteration stop sentinel.
    #[inline]
    pub fn is_stop(&self) -> bool {
        matches!(self, Error::Stop)
    }
}
