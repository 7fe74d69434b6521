//! Versioned queue document over a [`KvStore`].
//!
//! The whole queue lives under one key as
//! `{"version": 1, "items": [...]}`. A bare JSON array is the unversioned
//! layout written by older builds; it is read as version 0 and rewritten as
//! version 1 on the next mutation.

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;
use crate::memory::MemoryStore;
use reportsync_types::{ItemId, ItemStatus, QueueItem, TransitionError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Well-known key the queue document is stored under.
pub const DEFAULT_STORE_KEY: &str = "report_queue";

#[derive(Serialize)]
struct StoredQueue<'a> {
    version: u32,
    items: &'a [QueueItem],
}

struct Decoded {
    items: Vec<QueueItem>,
    version: u32,
    /// Some records (or the whole document) could not be decoded.
    damaged: bool,
}

/// Durable list of queue items keyed by id.
///
/// Every mutation is a full read-modify-write under a process-local lock, so
/// no caller can observe a partially applied change.
pub struct QueueStore {
    backend: Arc<dyn KvStore>,
    key: String,
    lock: Mutex<()>,
}

impl QueueStore {
    pub fn new(backend: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a store over a fresh [`MemoryStore`] (for testing).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DEFAULT_STORE_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the underlying medium (shared with the pass lease).
    pub fn backend(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.backend)
    }

    /// Loads all items, returning an empty list if the medium is unavailable
    /// or unreadable.
    pub fn load(&self) -> Vec<QueueItem> {
        self.try_load().unwrap_or_else(|e| {
            warn!("queue store {} unavailable, treating as empty: {e}", self.key);
            Vec::new()
        })
    }

    /// Loads all items, surfacing I/O and version errors.
    pub fn try_load(&self) -> StorageResult<Vec<QueueItem>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(bytes) = self.backend.read(&self.key)? else {
            return Ok(Vec::new());
        };
        let decoded = decode(&bytes)?;
        if decoded.damaged {
            warn!(
                "queue store {} contains unreadable records; recovered {} items",
                self.key,
                decoded.items.len()
            );
        }
        Ok(decoded.items)
    }

    /// Returns a single item by id.
    pub fn get(&self, id: &ItemId) -> Option<QueueItem> {
        self.load().into_iter().find(|item| &item.id == id)
    }

    /// Replaces the entire queue.
    pub fn save(&self, items: &[QueueItem]) -> StorageResult<()> {
        self.modify(|current| {
            *current = items.to_vec();
            Ok(())
        })
    }

    /// Appends a new item. Fails if the id is already present.
    pub fn append(&self, item: QueueItem) -> StorageResult<()> {
        self.modify(|items| {
            if items.iter().any(|existing| existing.id == item.id) {
                return Err(StorageError::DuplicateId(item.id.to_string()));
            }
            items.push(item);
            Ok(())
        })
    }

    /// Removes an item, returning it if it existed.
    pub fn remove(&self, id: &ItemId) -> StorageResult<Option<QueueItem>> {
        self.modify(|items| {
            let pos = items.iter().position(|item| &item.id == id);
            Ok(pos.map(|pos| items.remove(pos)))
        })
    }

    /// Applies `mutation` to one item and persists the result.
    ///
    /// Returns `Ok(None)` if the item does not exist. A rejected transition
    /// aborts the update and nothing is written.
    pub fn update<F>(&self, id: &ItemId, mutation: F) -> StorageResult<Option<QueueItem>>
    where
        F: FnOnce(&mut QueueItem) -> Result<(), TransitionError>,
    {
        self.modify(|items| {
            let Some(item) = items.iter_mut().find(|item| &item.id == id) else {
                return Ok(None);
            };
            let mut updated = item.clone();
            mutation(&mut updated)?;
            *item = updated.clone();
            Ok(Some(updated))
        })
    }

    /// Runs `f` over the full item list as one atomic read-modify-write.
    ///
    /// If `f` returns an error nothing is written. Ids must still be unique
    /// after `f` runs.
    pub fn modify<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Vec<QueueItem>) -> StorageResult<T>,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut items, needs_rewrite) = self.read_for_write()?;
        let before = items.clone();

        let out = f(&mut items)?;

        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(&item.id) {
                return Err(StorageError::DuplicateId(item.id.to_string()));
            }
        }

        if needs_rewrite || items != before {
            self.write_items(&items)?;
        }
        Ok(out)
    }

    /// Reads the current list before a mutation.
    ///
    /// An I/O failure aborts the mutation so a transient outage can never be
    /// mistaken for an empty queue and overwrite it. Damaged content is
    /// copied to a quarantine key before it gets replaced.
    fn read_for_write(&self) -> StorageResult<(Vec<QueueItem>, bool)> {
        let Some(bytes) = self.backend.read(&self.key)? else {
            return Ok((Vec::new(), false));
        };
        let decoded = decode(&bytes)?;
        if decoded.damaged {
            let backup_key = format!(
                "{}.corrupt-{}",
                self.key,
                chrono::Utc::now().timestamp_millis()
            );
            self.backend.write(&backup_key, &bytes)?;
            warn!(
                "quarantined damaged queue data under {backup_key}; kept {} recoverable items",
                decoded.items.len()
            );
        }
        let needs_rewrite = decoded.damaged || decoded.version < SCHEMA_VERSION;
        if decoded.version < SCHEMA_VERSION {
            debug!(
                "migrating queue store {} from schema v{} to v{SCHEMA_VERSION}",
                self.key, decoded.version
            );
        }
        Ok((decoded.items, needs_rewrite))
    }

    fn write_items(&self, items: &[QueueItem]) -> StorageResult<()> {
        let doc = StoredQueue {
            version: SCHEMA_VERSION,
            items,
        };
        let bytes = serde_json::to_vec(&doc)?;
        self.backend.write(&self.key, &bytes)
    }
}

fn decode(bytes: &[u8]) -> StorageResult<Decoded> {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!("queue document is not valid JSON: {e}");
            return Ok(Decoded {
                items: Vec::new(),
                version: SCHEMA_VERSION,
                damaged: true,
            });
        }
    };

    match value {
        Value::Array(records) => {
            let (items, damaged) = recover_items(records);
            Ok(Decoded {
                items,
                version: 0,
                damaged,
            })
        }
        Value::Object(mut doc) => {
            let version = doc.get("version").and_then(Value::as_u64);
            if let Some(found) = version {
                if found > u64::from(SCHEMA_VERSION) {
                    return Err(StorageError::UnsupportedVersion {
                        found,
                        supported: SCHEMA_VERSION,
                    });
                }
            }
            match doc.remove("items") {
                Some(Value::Array(records)) => {
                    let (items, damaged) = recover_items(records);
                    Ok(Decoded {
                        items,
                        // Bounded by the check above.
                        version: version.unwrap_or(0) as u32,
                        damaged: damaged || version.is_none(),
                    })
                }
                _ => Ok(Decoded {
                    items: Vec::new(),
                    version: SCHEMA_VERSION,
                    damaged: true,
                }),
            }
        }
        _ => Ok(Decoded {
            items: Vec::new(),
            version: SCHEMA_VERSION,
            damaged: true,
        }),
    }
}

/// Decodes records one by one, keeping every record that still parses.
fn recover_items(records: Vec<Value>) -> (Vec<QueueItem>, bool) {
    let mut items = Vec::with_capacity(records.len());
    let mut seen = HashSet::new();
    let mut damaged = false;

    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<QueueItem>(record) {
            Ok(item) if item.status == ItemStatus::Completed => {
                debug!("dropping completed record {} at rest", item.id);
                damaged = true;
            }
            Ok(item) => {
                if seen.insert(item.id.clone()) {
                    items.push(item);
                } else {
                    warn!("dropping duplicate queue record {}", item.id);
                    damaged = true;
                }
            }
            Err(e) => {
                warn!("dropping unreadable queue record at index {index}: {e}");
                damaged = true;
            }
        }
    }

    (items, damaged)
}
