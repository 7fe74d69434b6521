//! Background trigger loop for sync passes.
//!
//! Passes run:
//! - once at startup if online
//! - on every offline to online transition
//! - on each timer tick while online, idle, and with eligible items
//! - on demand through [`SchedulerHandle::sync_now`]
//!
//! The loop runs passes inline, so triggers arriving during a pass are
//! handled after it finishes.

use crate::engine::{PassOutcome, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::transport::ReportTransport;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Periodic wake-up source for the timer trigger.
#[async_trait]
pub trait TickSource: Send {
    async fn tick(&mut self);
}

/// Wall-clock ticker. The first tick fires one period after creation.
///
/// Must be created inside a tokio runtime.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl TickSource for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Ticker driven by hand, for tests and host-controlled timers.
///
/// Once every sender is dropped it never ticks again.
pub struct ManualTicker {
    rx: mpsc::Receiver<()>,
}

impl ManualTicker {
    pub fn channel() -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(16);
        (tx, Self { rx })
    }
}

#[async_trait]
impl TickSource for ManualTicker {
    async fn tick(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Why a pass was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Startup,
    Reconnected,
    Timer,
    Manual,
}

enum SchedulerCommand {
    SyncNow(oneshot::Sender<PassOutcome>),
    Shutdown,
}

/// Handle for sending commands to a running [`SyncScheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Runs a pass now and waits for its outcome.
    pub async fn sync_now(&self) -> SyncResult<PassOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::SyncNow(reply_tx))
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.command_tx
            .send(SchedulerCommand::Shutdown)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// Owns the trigger loop. Drive it with [`SyncScheduler::run`].
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    transport: Arc<dyn ReportTransport>,
    ticker: Box<dyn TickSource>,
    connectivity: watch::Receiver<bool>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

/// Creates a scheduler and its command handle.
pub fn create_scheduler(
    engine: Arc<SyncEngine>,
    transport: Arc<dyn ReportTransport>,
    ticker: Box<dyn TickSource>,
) -> (SchedulerHandle, SyncScheduler) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let connectivity = engine.connectivity().watch();

    let handle = SchedulerHandle { command_tx };
    let scheduler = SyncScheduler {
        engine,
        transport,
        ticker,
        connectivity,
        command_rx,
    };
    (handle, scheduler)
}

impl SyncScheduler {
    /// Runs the trigger loop until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("sync scheduler started");
        let engine = Arc::clone(&self.engine);
        let transport = Arc::clone(&self.transport);

        let mut was_online = *self.connectivity.borrow_and_update();
        let mut watching = true;
        if was_online {
            trigger_pass(&engine, transport.as_ref(), TriggerReason::Startup).await;
        }

        loop {
            tokio::select! {
                _ = self.ticker.tick() => {
                    if engine.is_online() && !engine.is_syncing() && engine.has_work() {
                        trigger_pass(&engine, transport.as_ref(), TriggerReason::Timer).await;
                    }
                }
                changed = self.connectivity.changed(), if watching => {
                    if changed.is_err() {
                        debug!("connectivity signal dropped, reconnect trigger disabled");
                        watching = false;
                        continue;
                    }
                    let online = *self.connectivity.borrow_and_update();
                    if online && !was_online {
                        trigger_pass(&engine, transport.as_ref(), TriggerReason::Reconnected)
                            .await;
                    }
                    was_online = online;
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::SyncNow(reply)) => {
                            let outcome =
                                trigger_pass(&engine, transport.as_ref(), TriggerReason::Manual)
                                    .await;
                            let _ = reply.send(outcome);
                        }
                        Some(SchedulerCommand::Shutdown) => {
                            info!("sync scheduler stopping");
                            break;
                        }
                        None => {
                            info!("command channel closed, stopping sync scheduler");
                            break;
                        }
                    }
                }
            }
        }

        info!("sync scheduler stopped");
    }
}

async fn trigger_pass(
    engine: &SyncEngine,
    transport: &dyn ReportTransport,
    reason: TriggerReason,
) -> PassOutcome {
    debug!("sync pass triggered: {reason:?}");
    engine.run_pass(transport).await
}
