use crate::item::ItemStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network unreachable, timeouts, 5xx, rate limiting.
    Transient,
    /// The service refused the report for a reason retrying will not fix.
    Permanent,
    /// The payload was rejected as malformed.
    Validation,
    /// Local persistence or file access failed.
    StoreIo,
}

impl ErrorKind {
    /// Returns true if an automatic retry may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::StoreIo)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::StoreIo => write!(f, "store_io"),
        }
    }
}

/// A state change the item state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for item {id}: {from} -> {to}")]
pub struct TransitionError {
    pub id: String,
    pub from: ItemStatus,
    pub to: ItemStatus,
}
