//! Sync error types.

use reportsync_storage::StorageError;
use reportsync_types::TransitionError;
use thiserror::Error;

/// Result type for queue and sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced to callers of the queue and scheduler.
///
/// Delivery failures never appear here; they are recorded on the item.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("invalid import data: {0}")]
    InvalidImport(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("sync scheduler not running")]
    ChannelClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Transition(e) => SyncError::Transition(e),
            other => SyncError::Storage(other),
        }
    }
}
