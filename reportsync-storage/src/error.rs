//! Storage error types.

use reportsync_types::TransitionError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing the durable store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported queue schema version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("duplicate item id: {0}")]
    DuplicateId(String),

    #[error("invalid store key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}
