//! Advisory cross-process lease for sync passes.
//!
//! The lease record sits next to the queue document under `<key>.lease`.
//! [`KvStore`] has no compare-and-swap, so two processes racing on an expired
//! lease can both win; the lease narrows the window, the idempotent item id
//! covers the rest.
//!
//! A holder keeps its claim alive across a long pass by calling
//! [`LeaseGuard::renew`] more often than the TTL.

use crate::error::StorageResult;
use crate::kv::KvStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct LeaseRecord {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// A named holder's claim on the right to run sync passes against one store.
pub struct PassLease {
    backend: Arc<dyn KvStore>,
    key: String,
    holder: String,
    ttl: Duration,
}

impl PassLease {
    pub fn new(
        backend: Arc<dyn KvStore>,
        store_key: &str,
        holder: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            backend,
            key: format!("{store_key}.lease"),
            holder: holder.into(),
            ttl,
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Claims the lease unless another holder has an unexpired claim.
    ///
    /// Returns `Ok(None)` when the lease is held elsewhere.
    pub fn try_acquire(&self) -> StorageResult<Option<LeaseGuard<'_>>> {
        let now = Utc::now();
        if let Some(record) = self.read_record()? {
            if record.holder != self.holder && record.expires_at > now {
                debug!(
                    "pass lease {} held by {} until {}",
                    self.key, record.holder, record.expires_at
                );
                return Ok(None);
            }
        }

        self.claim(now)?;
        Ok(Some(LeaseGuard { lease: self }))
    }

    fn claim(&self, now: DateTime<Utc>) -> StorageResult<()> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let record = LeaseRecord {
            holder: self.holder.clone(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.backend.write(&self.key, &serde_json::to_vec(&record)?)
    }

    fn renew(&self) -> StorageResult<bool> {
        let now = Utc::now();
        if let Some(record) = self.read_record()? {
            if record.holder != self.holder && record.expires_at > now {
                warn!(
                    "pass lease {} taken over by {} while held by {}",
                    self.key, record.holder, self.holder
                );
                return Ok(false);
            }
        }
        self.claim(now)?;
        Ok(true)
    }

    /// Returns the holder of an unexpired lease, if any.
    pub fn current_holder(&self) -> StorageResult<Option<String>> {
        Ok(self
            .read_record()?
            .filter(|record| record.expires_at > Utc::now())
            .map(|record| record.holder))
    }

    fn read_record(&self) -> StorageResult<Option<LeaseRecord>> {
        let Some(bytes) = self.backend.read(&self.key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("ignoring unreadable lease record {}: {e}", self.key);
                Ok(None)
            }
        }
    }

    fn release(&self) -> StorageResult<()> {
        match self.read_record()? {
            Some(record) if record.holder == self.holder => self.backend.delete(&self.key),
            _ => Ok(()),
        }
    }
}

/// Releases the lease when dropped.
pub struct LeaseGuard<'a> {
    lease: &'a PassLease,
}

impl LeaseGuard<'_> {
    /// Pushes the expiry one TTL past now.
    ///
    /// Returns `Ok(false)` when another holder has claimed the lease since it
    /// lapsed; the claim is left with them.
    pub fn renew(&self) -> StorageResult<bool> {
        self.lease.renew()
    }

    pub fn ttl(&self) -> Duration {
        self.lease.ttl
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lease.release() {
            warn!("failed to release pass lease {}: {e}", self.lease.key);
        }
    }
}
