//! Storage error types
//!
//! Defines all errors that can occur in the realtime database layer.

use thiserror::Error;

/// Errors that can occur in the realtime database
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected (checksum mismatch, oversized entry, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Journal format or recovery error
    #[error("WAL error: {0}")]
    WalError(String),

    /// Path is empty or malformed
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    /// Chart range must hold at least one reading
    #[error("Invalid chart range: {0} (must be at least 1)")]
    InvalidRange(u32),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StorageError::Lock(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
