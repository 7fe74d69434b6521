//! Core types for the reportsync offline report queue.
//!
//! - [`ItemId`]: client-generated idempotency key for a queued report
//! - [`QueueItem`]: one durable unit of pending work, plus its state machine
//! - [`ReportPayload`]: opaque report fields and attachment references
//! - [`ErrorKind`]: failure taxonomy shared by the transport and retry policy

mod error;
mod id;
mod item;
mod payload;

pub use error::{ErrorKind, TransitionError};
pub use id::ItemId;
pub use item::{ItemStatus, QueueItem};
pub use payload::{AttachmentRef, ReportPayload};
