//! In-process queue notifications.
//!
//! Delivery is synchronous and best-effort. Each handler runs in isolation:
//! a panicking handler is logged and skipped, the remaining handlers still
//! see the event.

use reportsync_types::{ItemId, QueueItem};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::error;

/// Kind of queue event, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ItemAdded,
    ItemUpdated,
    ItemRemoved,
}

/// A change to the queue contents.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    ItemAdded(QueueItem),
    ItemUpdated(QueueItem),
    ItemRemoved { id: ItemId },
}

impl QueueEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            QueueEvent::ItemAdded(_) => EventKind::ItemAdded,
            QueueEvent::ItemUpdated(_) => EventKind::ItemUpdated,
            QueueEvent::ItemRemoved { .. } => EventKind::ItemRemoved,
        }
    }

    pub fn item_id(&self) -> &ItemId {
        match self {
            QueueEvent::ItemAdded(item) | QueueEvent::ItemUpdated(item) => &item.id,
            QueueEvent::ItemRemoved { id } => id,
        }
    }
}

/// Token returned by [`EventNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

/// Pub/sub hub for queue events.
#[derive(Default)]
pub struct EventNotifier {
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscription. Returns false if it was not registered for `kind`.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        list.len() != before
    }

    /// Number of handlers registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Delivers `event` to every handler registered for its kind.
    pub fn emit(&self, event: &QueueEvent) {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let targets: Vec<(SubscriptionId, Handler)> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers.get(&event.kind()).cloned().unwrap_or_default()
        };

        for (id, handler) in targets {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(
                    "event handler {:?} panicked on {:?} for item {}",
                    id,
                    event.kind(),
                    event.item_id()
                );
            }
        }
    }
}
