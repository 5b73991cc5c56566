//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Container or blob not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data could not be decoded.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Azure SDK error.
    #[error("azure error: {0}")]
    Azure(#[from] azure_core::Error),

    /// Storage backend error.
    #[error("backend error: {0}")]
    Backend(String),
}
