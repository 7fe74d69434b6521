//! Sync passes over the durable queue.
//!
//! A pass delivers every eligible item once, oldest first, strictly in
//! sequence. Delivery failures become item state; nothing raised by the
//! transport (errors, timeouts, panics) escapes a pass.

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::guard::SingleFlight;
use crate::queue::OfflineQueue;
use crate::retry::Disposition;
use crate::transport::{ReportTransport, SubmitError};
use chrono::Utc;
use futures::FutureExt;
use reportsync_storage::{LeaseGuard, PassLease};
use reportsync_types::{ErrorKind, ItemStatus, QueueItem};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Counters for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Items handed to the transport.
    pub attempted: usize,
    /// Items delivered and removed.
    pub succeeded: usize,
    /// Items moved to failed by this pass.
    pub failed: usize,
    /// Candidates that vanished, changed state, or were left when the pass
    /// lost its lease.
    pub skipped: usize,
    /// Items found stuck in processing and moved to failed.
    pub recovered: usize,
}

/// Result of a [`SyncEngine::run_pass`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass in this process is running.
    AlreadyRunning,
    Offline,
    /// Another process holds the pass lease.
    LeaseHeld,
    Completed(PassReport),
}

impl PassOutcome {
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Delivers queued reports through a [`ReportTransport`].
pub struct SyncEngine {
    queue: Arc<OfflineQueue>,
    connectivity: Arc<dyn Connectivity>,
    config: SyncConfig,
    in_flight: SingleFlight,
    lease: Option<PassLease>,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<OfflineQueue>,
        connectivity: Arc<dyn Connectivity>,
        config: SyncConfig,
    ) -> Self {
        let lease = config.lease_ttl().map(|ttl| {
            let store = queue.store();
            PassLease::new(
                store.backend(),
                store.key(),
                uuid::Uuid::new_v4().to_string(),
                ttl,
            )
        });
        Self {
            queue,
            connectivity,
            config,
            in_flight: SingleFlight::new(),
            lease,
        }
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &Arc<dyn Connectivity> {
        &self.connectivity
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Returns true while a pass is running in this process.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.is_busy()
    }

    /// Returns true if an automatic pass would attempt at least one item.
    pub fn has_work(&self) -> bool {
        self.queue.has_eligible_items()
    }

    pub fn retry_failed_items(&self) -> usize {
        self.queue.retry_failed_items()
    }

    pub fn clear_failed_items(&self) -> usize {
        self.queue.clear_failed_items()
    }

    /// Runs one sync pass.
    pub async fn run_pass(&self, transport: &dyn ReportTransport) -> PassOutcome {
        let Some(_flight) = self.in_flight.try_acquire() else {
            debug!("sync pass already running");
            return PassOutcome::AlreadyRunning;
        };
        if !self.connectivity.is_online() {
            debug!("offline, skipping sync pass");
            return PassOutcome::Offline;
        }

        let lease = match &self.lease {
            Some(lease) => match lease.try_acquire() {
                Ok(Some(guard)) => Some(guard),
                Ok(None) => return PassOutcome::LeaseHeld,
                Err(e) => {
                    warn!("pass lease unavailable, continuing without it: {e}");
                    None
                }
            },
            None => None,
        };

        // Without the lease another process may be mid-delivery.
        let recovered = if self.lease.is_some() && lease.is_none() {
            debug!("skipping stale recovery without the pass lease");
            0
        } else {
            self.recover_stale()
        };
        let mut report = PassReport {
            recovered,
            ..PassReport::default()
        };

        let policy = self.queue.policy();
        let mut candidates: Vec<QueueItem> = self
            .queue
            .get_queue()
            .into_iter()
            .filter(|item| policy.should_attempt(item))
            .collect();
        candidates.sort_by_key(|item| item.created_at);

        if candidates.is_empty() {
            debug!("sync pass found nothing to deliver");
            return PassOutcome::Completed(report);
        }
        info!("sync pass started: {} items eligible", candidates.len());

        let delay = self.config.inter_item_delay();
        let total = candidates.len();
        for (index, candidate) in candidates.into_iter().enumerate() {
            if let Some(guard) = &lease {
                match guard.renew() {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("pass lease lost, ending sync pass early");
                        report.skipped += total - index;
                        break;
                    }
                    Err(e) => warn!("could not renew pass lease: {e}"),
                }
            }

            let current = self.queue.get_item(&candidate.id);
            let Some(current) = current.filter(|item| {
                item.status == candidate.status && policy.should_attempt(item)
            }) else {
                debug!("item {} changed before its turn, skipping", candidate.id);
                report.skipped += 1;
                continue;
            };

            if report.attempted > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let attempt = self.attempt(transport, current);
            match with_heartbeat(lease.as_ref(), attempt).await {
                Some(true) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                }
                Some(false) => {
                    report.attempted += 1;
                    report.failed += 1;
                }
                None => report.skipped += 1,
            }
        }

        info!(
            "sync pass finished: {} attempted, {} delivered, {} failed, {} skipped",
            report.attempted, report.succeeded, report.failed, report.skipped
        );
        PassOutcome::Completed(report)
    }

    /// Moves items left in processing by an interrupted pass to failed.
    ///
    /// With a lease configured, an item whose attempt started less than one
    /// TTL ago may still belong to a live pass elsewhere and is left alone.
    fn recover_stale(&self) -> usize {
        let cutoff = self
            .config
            .lease_ttl()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
        let stale: Vec<_> = self
            .queue
            .get_queue()
            .into_iter()
            .filter(|item| item.status == ItemStatus::Processing)
            .filter(|item| match (cutoff, item.last_attempt_at) {
                (Some(cutoff), Some(started)) => started <= cutoff,
                _ => true,
            })
            .map(|item| item.id)
            .collect();

        let mut recovered = 0;
        for id in stale {
            match self.queue.mark_failed(
                &id,
                ErrorKind::Transient,
                "interrupted before completion".to_string(),
            ) {
                Ok(Some(_)) => recovered += 1,
                Ok(None) => {}
                Err(e) => warn!("could not recover stale item {id}: {e}"),
            }
        }
        if recovered > 0 {
            warn!("recovered {recovered} items left processing by an interrupted pass");
        }
        recovered
    }

    /// Attempts one item. `None` means it was never handed to the transport.
    async fn attempt(&self, transport: &dyn ReportTransport, item: QueueItem) -> Option<bool> {
        let id = item.id.clone();
        let item = match self.queue.mark_processing(&id) {
            Ok(Some(item)) => item,
            Ok(None) => return None,
            Err(e) => {
                warn!("could not start attempt for item {id}: {e}");
                return None;
            }
        };

        match self.deliver(transport, &item).await {
            Ok(()) => {
                if let Err(e) = self.queue.complete_item(&id) {
                    // Left in processing; the next pass recovers and resubmits it.
                    error!("report {id} delivered but could not be removed: {e}");
                }
                debug!("report {id} delivered");
                Some(true)
            }
            Err(err) => {
                match self.queue.mark_failed(&id, err.kind, err.message.clone()) {
                    Ok(Some(failed)) => match self.queue.policy().classify(&failed) {
                        Disposition::RetryLater => warn!(
                            "report {id} failed (attempt {}): {err}",
                            failed.retry_count
                        ),
                        Disposition::Exhausted => warn!(
                            "report {id} failed {} times, giving up until retried manually: {err}",
                            failed.retry_count
                        ),
                        Disposition::NeedsAttention => {
                            warn!("report {id} rejected, needs attention: {err}")
                        }
                    },
                    Ok(None) => debug!("report {id} removed while in flight"),
                    Err(e) => error!("could not record failure of report {id}: {e}"),
                }
                Some(false)
            }
        }
    }

    async fn deliver(
        &self,
        transport: &dyn ReportTransport,
        item: &QueueItem,
    ) -> Result<(), SubmitError> {
        let submit = AssertUnwindSafe(transport.submit(&item.id, &item.payload)).catch_unwind();
        let outcome = match self.config.submit_timeout() {
            Some(limit) => match tokio::time::timeout(limit, submit).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(SubmitError::transient(format!(
                        "submit timed out after {}s",
                        limit.as_secs()
                    )));
                }
            },
            None => submit.await,
        };

        let receipt = match outcome {
            Ok(result) => result?,
            Err(panic) => {
                return Err(SubmitError::transient(format!(
                    "transport panicked: {}",
                    panic_message(panic.as_ref())
                )));
            }
        };
        debug!("report {} accepted, receipt {:?}", item.id, receipt.receipt_id);

        for attachment in &item.payload.attachments {
            let upload = AssertUnwindSafe(transport.upload_attachment(&item.id, attachment))
                .catch_unwind()
                .await;
            let err = match upload {
                Ok(Ok(url)) => {
                    debug!("attachment {} of report {} stored at {url}", attachment.name, item.id);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(panic) => SubmitError::transient(format!(
                    "transport panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            if self.config.fail_on_attachment_error {
                return Err(err);
            }
            warn!(
                "attachment {} of report {} not uploaded: {err}",
                attachment.name, item.id
            );
        }
        Ok(())
    }
}

/// Drives `work` while renewing the pass lease every half TTL.
async fn with_heartbeat<F: Future>(lease: Option<&LeaseGuard<'_>>, work: F) -> F::Output {
    let Some(lease) = lease else {
        return work.await;
    };
    let period = (lease.ttl() / 2).max(Duration::from_millis(50));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(work);
    loop {
        tokio::select! {
            output = &mut work => return output,
            _ = heartbeat.tick() => match lease.renew() {
                Ok(true) => {}
                Ok(false) => warn!("pass lease lost while a delivery was in flight"),
                Err(e) => warn!("could not renew pass lease: {e}"),
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
