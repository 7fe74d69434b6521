//! Retry budget for automatic delivery attempts.
//!
//! There is no per-item backoff. Passes are already spaced by the scheduler
//! and items within a pass by the inter-item delay.

use reportsync_types::{ItemStatus, QueueItem};

/// What happens next to an item that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A later automatic pass will try again.
    RetryLater,
    /// The retry budget is spent; only a manual retry revives the item.
    Exhausted,
    /// The failure is not retryable (permanent or validation).
    NeedsAttention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns true if an automatic pass may attempt `item` now.
    pub fn should_attempt(&self, item: &QueueItem) -> bool {
        if item.retry_count >= self.max_retries {
            return false;
        }
        match item.status {
            ItemStatus::Pending => true,
            ItemStatus::Failed => item.last_error_kind.is_none_or(|kind| kind.is_retryable()),
            ItemStatus::Processing | ItemStatus::Completed => false,
        }
    }

    /// Classifies a failed item for logging.
    pub fn classify(&self, item: &QueueItem) -> Disposition {
        if item.last_error_kind.is_some_and(|kind| !kind.is_retryable()) {
            Disposition::NeedsAttention
        } else if item.retry_count >= self.max_retries {
            Disposition::Exhausted
        } else {
            Disposition::RetryLater
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
