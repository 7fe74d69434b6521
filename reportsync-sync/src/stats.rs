use reportsync_types::{ItemStatus, QueueItem};
use serde::{Deserialize, Serialize};

/// Counts derived from a queue snapshot.
///
/// `completed` is always 0: delivered items are removed, not retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
    pub completed: usize,
    /// Sum of `retry_count` across all items.
    pub retry_count: u64,
}

impl QueueStats {
    pub fn from_items(items: &[QueueItem]) -> Self {
        items.iter().fold(Self::default(), |mut stats, item| {
            stats.total += 1;
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Failed => stats.failed += 1,
                ItemStatus::Completed => {}
            }
            stats.retry_count += u64::from(item.retry_count);
            stats
        })
    }
}
