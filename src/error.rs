//! Crate-level error type.

use thiserror::Error;

use crate::storage::reader::ReaderError;
use crate::storage::schema::SchemaError;
use crate::storage::writer::WriterError;

/// Errors returned by [`Database`](crate::Database) and its accessors.
///
/// A missing row is never an error: deletes of absent keys are no-ops and
/// existence checks return `false`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored schema does not match the expected one.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The database was closed or dropped.
    #[error("Database is closed")]
    Closed,

    #[error("Query cancelled")]
    Cancelled,

    /// A blocking call was made from inside an async runtime.
    #[error("Blocking database call made from an async execution context")]
    BlockingInAsyncContext,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
