//! Offline report queue and sync engine.
//!
//! Holds user reports durably while the device is offline and delivers them
//! once connectivity returns:
//! - [`OfflineQueue`]: caller-facing add/list/retry/clear/import/export
//! - [`SyncEngine`]: single-flight sync passes over eligible items
//! - [`SyncScheduler`]: runs passes on startup, reconnect, timer and demand
//! - [`EventNotifier`]: in-process item add/update/remove notifications
//! - [`HttpTransport`]: reqwest-based delivery to the ingestion service

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod http_transport;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod transfer;
pub mod transport;

pub use config::SyncConfig;
pub use connectivity::{Connectivity, ConnectivitySignal};
pub use engine::{PassOutcome, PassReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use events::{EventKind, EventNotifier, QueueEvent, SubscriptionId};
pub use guard::{FlightGuard, SingleFlight};
pub use http_transport::{HttpTransport, HttpTransportConfig};
pub use queue::OfflineQueue;
pub use retry::{Disposition, RetryPolicy};
pub use scheduler::{
    create_scheduler, IntervalTicker, ManualTicker, SchedulerHandle, SyncScheduler, TickSource,
    TriggerReason,
};
pub use stats::QueueStats;
pub use transfer::ImportReport;
pub use transport::{Receipt, ReportTransport, SubmitError};

pub use reportsync_types::{
    AttachmentRef, ErrorKind, ItemId, ItemStatus, QueueItem, ReportPayload,
};
