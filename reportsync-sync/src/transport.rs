//! Delivery abstraction for the remote ingestion service.

use async_trait::async_trait;
use reportsync_types::{AttachmentRef, ErrorKind, ItemId, ReportPayload};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Acknowledgement returned by the ingestion service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Server-side identifier, if the service returns one.
    #[serde(default)]
    pub receipt_id: Option<String>,
}

/// A failed delivery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SubmitError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for SubmitError {}

/// The remote ingestion service, as seen by the sync engine.
///
/// `submit` may be called more than once for the same id (at-least-once
/// delivery); implementations must let the service deduplicate on it.
/// Implementations also own request timeouts: a call that never returns
/// stalls the current pass.
#[async_trait]
pub trait ReportTransport: Send + Sync {
    /// Submits the report body.
    async fn submit(&self, id: &ItemId, payload: &ReportPayload) -> Result<Receipt, SubmitError>;

    /// Uploads one attachment of an accepted report, returning its URL.
    async fn upload_attachment(
        &self,
        id: &ItemId,
        attachment: &AttachmentRef,
    ) -> Result<String, SubmitError>;
}
