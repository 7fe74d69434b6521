mod support;

use pretty_assertions::assert_eq;
use reportsync_sync::{
    create_scheduler, IntervalTicker, ManualTicker, PassOutcome, SyncError, TickSource,
};
use std::sync::Arc;
use std::time::Duration;
use support::{fast_config, harness, report, Harness, MockTransport};
use tokio::task::JoinHandle;

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn start(
    h: &Harness,
    transport: &Arc<MockTransport>,
    ticker: Box<dyn TickSource>,
) -> (reportsync_sync::SchedulerHandle, JoinHandle<()>) {
    let (handle, scheduler) = create_scheduler(
        Arc::clone(&h.engine),
        Arc::clone(transport) as _,
        ticker,
    );
    (handle, tokio::spawn(scheduler.run()))
}

// ── Triggers ─────────────────────────────────────────────────────

#[tokio::test]
async fn runs_a_pass_at_startup_when_online() {
    let h = harness(fast_config(), true);
    let transport = Arc::new(MockTransport::new());
    let id = h.queue.add_to_queue(report("X")).unwrap();
    let (_tick_tx, ticker) = ManualTicker::channel();

    let (handle, task) = start(&h, &transport, Box::new(ticker));
    wait_until(|| h.queue.get_queue().is_empty()).await;

    assert_eq!(transport.submitted(), vec![id]);
    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn reconnect_triggers_a_pass() {
    let h = harness(fast_config(), false);
    let transport = Arc::new(MockTransport::new());
    h.queue.add_to_queue(report("X")).unwrap();
    let (_tick_tx, ticker) = ManualTicker::channel();

    let (handle, task) = start(&h, &transport, Box::new(ticker));
    assert_eq!(handle.sync_now().await.unwrap(), PassOutcome::Offline);
    assert!(transport.submitted().is_empty());

    h.signal.set_online(true);
    wait_until(|| h.queue.get_queue().is_empty()).await;
    assert_eq!(transport.submitted().len(), 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn timer_tick_delivers_new_items() {
    let h = harness(fast_config(), true);
    let transport = Arc::new(MockTransport::new());
    let (tick_tx, ticker) = ManualTicker::channel();
    let (handle, task) = start(&h, &transport, Box::new(ticker));
    // Returns only after the startup pass.
    handle.sync_now().await.unwrap();

    h.queue.add_to_queue(report("late")).unwrap();
    tick_tx.send(()).await.unwrap();
    wait_until(|| h.queue.get_queue().is_empty()).await;

    assert_eq!(transport.submitted().len(), 1);
    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn interval_ticker_drives_periodic_passes() {
    let h = harness(fast_config(), true);
    let transport = Arc::new(MockTransport::new());
    let ticker = IntervalTicker::new(h.engine.config().sync_interval());
    let (handle, task) = start(&h, &transport, Box::new(ticker));
    handle.sync_now().await.unwrap();

    h.queue.add_to_queue(report("periodic")).unwrap();
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(h.queue.get_queue().len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.queue.get_queue().is_empty());
    assert_eq!(transport.submitted().len(), 1);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn sync_now_returns_the_pass_outcome() {
    let h = harness(fast_config(), true);
    let transport = Arc::new(MockTransport::new());
    let (_tick_tx, ticker) = ManualTicker::channel();
    let (handle, task) = start(&h, &transport, Box::new(ticker));
    handle.sync_now().await.unwrap();

    h.queue.add_to_queue(report("a")).unwrap();
    h.queue.add_to_queue(report("b")).unwrap();
    let outcome = handle.sync_now().await.unwrap();

    let report = outcome.report().copied().unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert!(h.queue.get_queue().is_empty());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn handle_fails_after_shutdown() {
    let h = harness(fast_config(), true);
    let transport = Arc::new(MockTransport::new());
    let (_tick_tx, ticker) = ManualTicker::channel();
    let (handle, task) = start(&h, &transport, Box::new(ticker));

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(matches!(
        handle.sync_now().await,
        Err(SyncError::ChannelClosed)
    ));
}

#[tokio::test]
async fn dropping_every_handle_stops_the_scheduler() {
    let h = harness(fast_config(), true);
    let transport = Arc::new(MockTransport::new());
    let (_tick_tx, ticker) = ManualTicker::channel();
    let (handle, task) = start(&h, &transport, Box::new(ticker));

    drop(handle);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn interval_ticker_waits_one_period_first() {
    let mut ticker = IntervalTicker::new(Duration::from_secs(30));
    let start = tokio::time::Instant::now();
    ticker.tick().await;
    assert!(start.elapsed() >= Duration::from_secs(30));
}
