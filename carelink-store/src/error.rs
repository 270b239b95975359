//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a store reports for a completed operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached. Retrying later may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The addressed record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The write was rejected because it would move the stored clock backward.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The record is malformed for this store.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for failures the caller's retry loop may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
