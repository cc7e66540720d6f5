//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from storage operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend failure (I/O, corruption, ...).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The rolling transaction-body window has no databases.
    #[error("transaction-body window is empty")]
    EmptyTxBodyWindow,
}
