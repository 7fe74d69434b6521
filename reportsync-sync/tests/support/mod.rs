//! Shared helpers for sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use reportsync_storage::QueueStore;
use reportsync_sync::{
    AttachmentRef, ConnectivitySignal, ErrorKind, ItemId, OfflineQueue, Receipt,
    ReportPayload, ReportTransport, SubmitError, SyncConfig, SyncEngine,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn report(title: &str) -> ReportPayload {
    ReportPayload::new().with_field("title", title)
}

/// Defaults without the inter-item pause.
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        inter_item_delay_ms: 0,
        ..SyncConfig::default()
    }
}

pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub queue: Arc<OfflineQueue>,
    pub signal: Arc<ConnectivitySignal>,
}

pub fn harness(config: SyncConfig, online: bool) -> Harness {
    harness_over(QueueStore::in_memory(), config, online)
}

pub fn harness_over(store: QueueStore, config: SyncConfig, online: bool) -> Harness {
    init_tracing();
    let queue = Arc::new(OfflineQueue::new(store, &config));
    let signal = Arc::new(ConnectivitySignal::new(online));
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&queue),
        Arc::clone(&signal) as _,
        config,
    ));
    Harness {
        engine,
        queue,
        signal,
    }
}

/// Scriptable in-memory ingestion service.
#[derive(Default)]
pub struct MockTransport {
    submitted: Mutex<Vec<ItemId>>,
    uploaded: Mutex<Vec<(ItemId, String)>>,
    fail_all: Mutex<Option<ErrorKind>>,
    fail_ids: Mutex<HashSet<ItemId>>,
    panic_on_submit: AtomicBool,
    fail_uploads: AtomicBool,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(kind: ErrorKind) -> Self {
        let transport = Self::new();
        transport.fail_with(Some(kind));
        transport
    }

    pub fn panicking() -> Self {
        let transport = Self::new();
        transport.panic_on_submit.store(true, Ordering::SeqCst);
        transport
    }

    /// Every submit parks until `gate` is notified.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_with(&self, kind: Option<ErrorKind>) {
        *self.fail_all.lock().unwrap() = kind;
    }

    pub fn fail_id(&self, id: &ItemId) {
        self.fail_ids.lock().unwrap().insert(id.clone());
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Resolves once a submit call has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn submitted(&self) -> Vec<ItemId> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn uploaded(&self) -> Vec<(ItemId, String)> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportTransport for MockTransport {
    async fn submit(&self, id: &ItemId, _payload: &ReportPayload) -> Result<Receipt, SubmitError> {
        self.submitted.lock().unwrap().push(id.clone());
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.panic_on_submit.load(Ordering::SeqCst) {
            panic!("transport exploded");
        }
        if let Some(kind) = *self.fail_all.lock().unwrap() {
            return Err(SubmitError::new(kind, "service unavailable"));
        }
        if self.fail_ids.lock().unwrap().contains(id) {
            return Err(SubmitError::transient("rejected by mock"));
        }
        Ok(Receipt {
            receipt_id: Some(format!("rcpt-{id}")),
        })
    }

    async fn upload_attachment(
        &self,
        id: &ItemId,
        attachment: &AttachmentRef,
    ) -> Result<String, SubmitError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(SubmitError::transient("upload refused"));
        }
        self.uploaded
            .lock()
            .unwrap()
            .push((id.clone(), attachment.name.clone()));
        Ok(format!("https://files.test/{id}/{}", attachment.name))
    }
}
