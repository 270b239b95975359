//! Error types for the sync layer.

use carelink_store::StoreError;
use carelink_types::{EntityUuid, LogicalClock};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A uuid or timestamp the operation depends on is absent or malformed.
    /// Fatal; retrying cannot help.
    #[error("required value missing: {0}")]
    RequiredValueMissing(String),

    /// The remote store could not be reached.
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(#[source] StoreError),

    /// The remote store rejected the operation.
    #[error("remote store error: {0}")]
    Remote(#[source] StoreError),

    /// The local store failed.
    #[error("local store error: {0}")]
    Local(#[source] StoreError),

    /// The cloud copy carries a higher clock than the local copy outside of
    /// a pull. Indicates a late or out-of-order push upstream.
    #[error("cloud clock exceeds local clock for {uuid}: local {local}, cloud {remote}")]
    ClockRegression {
        uuid: EntityUuid,
        local: LogicalClock,
        remote: LogicalClock,
    },

    /// A chain pointer names a version the remote does not hold yet.
    /// Repair logs this and resumes on a later pass.
    #[error("version chain gap at {uuid}: {missing} not found remotely")]
    ChainInconsistent {
        uuid: EntityUuid,
        missing: EntityUuid,
    },

    /// Another push for the same record is in flight.
    #[error("push already in flight for {0}")]
    PushInFlight(EntityUuid),

    /// The operation did not finish before its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Wraps a remote store failure, keeping transient failures distinct.
    pub fn remote(err: StoreError) -> Self {
        if err.is_transient() {
            SyncError::RemoteUnavailable(err)
        } else {
            SyncError::Remote(err)
        }
    }

    /// Wraps a local store failure.
    pub fn local(err: StoreError) -> Self {
        SyncError::Local(err)
    }

    /// Returns true if the caller's retry loop may retry the operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RemoteUnavailable(_) | SyncError::Timeout | SyncError::PushInFlight(_) => {
                true
            }
            SyncError::Local(e) => e.is_transient(),
            _ => false,
        }
    }
}
