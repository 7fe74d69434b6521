//! Durable storage for the reportsync queue.
//!
//! Persists the queue through a minimal key-value interface so the same queue
//! logic runs on every platform.
//!
//! # Architecture
//!
//! - [`KvStore`] is the durable medium: `read`, `write`, `delete` by key
//! - Backends: [`MemoryStore`] (tests, ephemeral), [`FileStore`] (one file per
//!   key, atomic rename), [`SqliteStore`] (shared `kv` table)
//! - [`QueueStore`] keeps the whole queue as one versioned JSON document and
//!   serializes read-modify-write cycles within the process
//! - [`PassLease`] is an advisory cross-process lock stored next to the queue

mod error;
mod file;
mod kv;
mod lease;
mod memory;
mod queue_store;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use kv::KvStore;
pub use lease::{LeaseGuard, PassLease};
pub use memory::MemoryStore;
pub use queue_store::{QueueStore, DEFAULT_STORE_KEY, SCHEMA_VERSION};
pub use sqlite::SqliteStore;
