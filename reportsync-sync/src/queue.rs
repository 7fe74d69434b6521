//! Caller-facing queue operations.
//!
//! Every operation goes through [`QueueStore`] and announces its effect on
//! the [`EventNotifier`]. Store failures are logged and turned into safe
//! defaults (empty list, `false`, `0`) wherever the operation has one.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventKind, EventNotifier, QueueEvent, SubscriptionId};
use crate::retry::RetryPolicy;
use crate::stats::QueueStats;
use crate::transfer::{self, ImportReport};
use chrono::Utc;
use reportsync_storage::{QueueStore, StorageError};
use reportsync_types::{
    ErrorKind, ItemId, ItemStatus, QueueItem, ReportPayload, TransitionError,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// The durable report queue plus its notification hub.
pub struct OfflineQueue {
    store: QueueStore,
    notifier: EventNotifier,
    policy: RetryPolicy,
}

impl OfflineQueue {
    pub fn new(store: QueueStore, config: &SyncConfig) -> Self {
        Self {
            store,
            notifier: EventNotifier::new(),
            policy: RetryPolicy::new(config.max_retries),
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.notifier
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Queues a new report and returns its id.
    pub fn add_to_queue(&self, payload: ReportPayload) -> SyncResult<ItemId> {
        let item = QueueItem::new(payload);
        let id = item.id.clone();
        self.store.append(item.clone())?;
        debug!("queued report {id}");
        self.notifier.emit(&QueueEvent::ItemAdded(item));
        Ok(id)
    }

    pub fn get_queue(&self) -> Vec<QueueItem> {
        self.store.load()
    }

    pub fn get_item(&self, id: &ItemId) -> Option<QueueItem> {
        self.store.get(id)
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        QueueStats::from_items(&self.store.load())
    }

    /// Returns true if any item is eligible for an automatic attempt.
    pub fn has_eligible_items(&self) -> bool {
        self.store
            .load()
            .iter()
            .any(|item| self.policy.should_attempt(item))
    }

    /// Deletes an item regardless of state. Returns false if it was absent
    /// or the store is unavailable.
    pub fn remove_from_queue(&self, id: &ItemId) -> bool {
        match self.store.remove(id) {
            Ok(Some(_)) => {
                self.notifier
                    .emit(&QueueEvent::ItemRemoved { id: id.clone() });
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("failed to remove item {id}: {e}");
                false
            }
        }
    }

    /// Moves an item to `status` through the state machine.
    ///
    /// - `Processing`: rejected, only a sync pass starts an attempt
    /// - `Failed`: records a transient failure with `error`
    /// - `Pending`: manual retry, resets the retry budget
    /// - `Completed`: delivery confirmed, the item is removed
    pub fn update_item_status(
        &self,
        id: &ItemId,
        status: ItemStatus,
        error: Option<String>,
    ) -> SyncResult<()> {
        let applied = match status {
            ItemStatus::Completed => self.complete_item(id)?,
            ItemStatus::Processing => {
                let item = self
                    .get_item(id)
                    .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
                return Err(SyncError::Transition(TransitionError {
                    id: id.to_string(),
                    from: item.status,
                    to: ItemStatus::Processing,
                }));
            }
            ItemStatus::Pending => self.apply(id, QueueItem::reset_for_retry)?.is_some(),
            ItemStatus::Failed => {
                let message = error.unwrap_or_else(|| "marked failed".to_string());
                self.mark_failed(id, ErrorKind::Transient, message)?
                    .is_some()
            }
        };
        if !applied {
            return Err(SyncError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Manual retry of one failed item. Returns false if the item is absent.
    pub fn retry_item(&self, id: &ItemId) -> SyncResult<bool> {
        Ok(self.apply(id, QueueItem::reset_for_retry)?.is_some())
    }

    pub(crate) fn mark_processing(&self, id: &ItemId) -> SyncResult<Option<QueueItem>> {
        let now = Utc::now();
        self.apply(id, |item| item.begin_attempt(now))
    }

    pub(crate) fn mark_failed(
        &self,
        id: &ItemId,
        kind: ErrorKind,
        message: String,
    ) -> SyncResult<Option<QueueItem>> {
        let now = Utc::now();
        self.apply(id, |item| item.record_failure(kind, message, now))
    }

    /// `processing -> completed`, then removes the item. Returns false if absent.
    pub(crate) fn complete_item(&self, id: &ItemId) -> SyncResult<bool> {
        let removed = self.store.modify(|items| {
            let Some(pos) = items.iter().position(|item| &item.id == id) else {
                return Ok(false);
            };
            items[pos].clone().complete()?;
            items.remove(pos);
            Ok(true)
        })?;
        if removed {
            self.notifier
                .emit(&QueueEvent::ItemRemoved { id: id.clone() });
        }
        Ok(removed)
    }

    fn apply<F>(&self, id: &ItemId, mutation: F) -> SyncResult<Option<QueueItem>>
    where
        F: FnOnce(&mut QueueItem) -> Result<(), TransitionError>,
    {
        let updated = self.store.update(id, mutation)?;
        if let Some(item) = &updated {
            self.notifier.emit(&QueueEvent::ItemUpdated(item.clone()));
        }
        Ok(updated)
    }

    /// Moves every failed item back to pending with a fresh retry budget.
    pub fn retry_failed_items(&self) -> usize {
        let result = self.store.modify(|items| {
            let mut reset = Vec::new();
            for item in items.iter_mut().filter(|i| i.status == ItemStatus::Failed) {
                item.reset_for_retry()?;
                reset.push(item.clone());
            }
            Ok(reset)
        });

        match result {
            Ok(reset) => {
                for item in &reset {
                    self.notifier.emit(&QueueEvent::ItemUpdated(item.clone()));
                }
                if !reset.is_empty() {
                    info!("reset {} failed items to pending", reset.len());
                }
                reset.len()
            }
            Err(e) => {
                warn!("failed to retry failed items: {e}");
                0
            }
        }
    }

    /// Deletes every failed item.
    pub fn clear_failed_items(&self) -> usize {
        let result = self.store.modify(|items| {
            let (failed, kept): (Vec<_>, Vec<_>) = std::mem::take(items)
                .into_iter()
                .partition(|item| item.status == ItemStatus::Failed);
            *items = kept;
            Ok(failed.into_iter().map(|item| item.id).collect::<Vec<_>>())
        });

        match result {
            Ok(removed) => {
                for id in &removed {
                    self.notifier
                        .emit(&QueueEvent::ItemRemoved { id: id.clone() });
                }
                if !removed.is_empty() {
                    info!("cleared {} failed items", removed.len());
                }
                removed.len()
            }
            Err(e) => {
                warn!("failed to clear failed items: {e}");
                0
            }
        }
    }

    /// Serializes the full queue for backup.
    pub fn export_queue(&self) -> SyncResult<String> {
        let items = self.store.try_load()?;
        transfer::export_items(&items)
    }

    /// Merges a backup into the queue. Existing items win on id conflicts.
    pub fn import_queue(&self, serialized: &str) -> SyncResult<ImportReport> {
        let (candidates, rejected) = transfer::parse_import(serialized)?;

        let (added, duplicates) = self.store.modify(|items| {
            let mut seen: HashSet<ItemId> = items.iter().map(|item| item.id.clone()).collect();
            let mut added = Vec::new();
            let mut duplicates = 0;
            for item in candidates {
                if seen.insert(item.id.clone()) {
                    added.push(item.clone());
                    items.push(item);
                } else {
                    duplicates += 1;
                }
            }
            Ok::<_, StorageError>((added, duplicates))
        })?;

        for item in &added {
            self.notifier.emit(&QueueEvent::ItemAdded(item.clone()));
        }

        let report = ImportReport {
            imported: added.len(),
            rejected,
            duplicates,
        };
        info!(
            "imported {} items ({} rejected, {} duplicates)",
            report.imported, report.rejected, report.duplicates
        );
        Ok(report)
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(kind, id)
    }
}
