use crate::error::{ErrorKind, TransitionError};
use crate::id::ItemId;
use crate::payload::ReportPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a queued report.
///
/// `Completed` is terminal and realized as removal from the store, so at rest
/// only `Pending`, `Processing` and `Failed` are observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    /// Returns true if the state machine allows `self -> next`.
    ///
    /// `Failed -> Processing` is the automatic retry path and is only taken by
    /// the sync engine after the retry policy approves it.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Failed, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    /// Parses the lowercase wire name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(ItemStatus::Pending),
            "processing" => Some(ItemStatus::Processing),
            "completed" => Some(ItemStatus::Completed),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durable unit of work: a report awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    #[serde(alias = "createdAt", alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub payload: ReportPayload,
    pub status: ItemStatus,
    #[serde(default, alias = "retryCount")]
    pub retry_count: u32,
    #[serde(default, alias = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, alias = "lastErrorKind", skip_serializing_if = "Option::is_none")]
    pub last_error_kind: Option<ErrorKind>,
    #[serde(default, alias = "lastAttemptAt", skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Creates a new pending item with a freshly generated id.
    pub fn new(payload: ReportPayload) -> Self {
        Self::with_id(ItemId::generate(), Utc::now(), payload)
    }

    /// Creates a pending item with a caller-supplied id and creation time.
    pub fn with_id(id: ItemId, created_at: DateTime<Utc>, payload: ReportPayload) -> Self {
        Self {
            id,
            created_at,
            payload,
            status: ItemStatus::Pending,
            retry_count: 0,
            last_error: None,
            last_error_kind: None,
            last_attempt_at: None,
        }
    }

    /// Returns true if a sync pass may consider this item at all.
    pub fn is_deliverable(&self) -> bool {
        matches!(self.status, ItemStatus::Pending | ItemStatus::Failed)
    }

    /// `pending|failed -> processing`. Stamps `last_attempt_at`.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(ItemStatus::Processing)?;
        self.last_attempt_at = Some(now);
        Ok(())
    }

    /// `processing -> failed`. Counts the attempt and records its cause.
    pub fn record_failure(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(ItemStatus::Failed)?;
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(message.into());
        self.last_error_kind = Some(kind);
        self.last_attempt_at = Some(now);
        Ok(())
    }

    /// `processing -> completed`. The caller removes the item afterwards.
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(ItemStatus::Completed)
    }

    /// `failed -> pending` (manual retry). Resets the retry budget.
    pub fn reset_for_retry(&mut self) -> Result<(), TransitionError> {
        self.transition(ItemStatus::Pending)?;
        self.retry_count = 0;
        self.last_error = None;
        self.last_error_kind = None;
        Ok(())
    }

    fn transition(&mut self, next: ItemStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
