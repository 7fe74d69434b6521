use reportsync_storage::{KvStore, MemoryStore, PassLease};
use std::sync::Arc;
use std::time::Duration;

fn lease(backend: &Arc<MemoryStore>, holder: &str, ttl: Duration) -> PassLease {
    PassLease::new(backend.clone(), "report_queue", holder, ttl)
}

#[test]
fn acquire_free_lease() {
    let backend = Arc::new(MemoryStore::new());
    let a = lease(&backend, "device-a", Duration::from_secs(60));

    let guard = a.try_acquire().unwrap();
    assert!(guard.is_some());
    assert_eq!(a.current_holder().unwrap().as_deref(), Some("device-a"));
}

#[test]
fn second_holder_blocked_while_held() {
    let backend = Arc::new(MemoryStore::new());
    let a = lease(&backend, "device-a", Duration::from_secs(60));
    let b = lease(&backend, "device-b", Duration::from_secs(60));

    let _guard = a.try_acquire().unwrap().unwrap();
    assert!(b.try_acquire().unwrap().is_none());
}

#[test]
fn drop_releases_lease() {
    let backend = Arc::new(MemoryStore::new());
    let a = lease(&backend, "device-a", Duration::from_secs(60));
    let b = lease(&backend, "device-b", Duration::from_secs(60));

    {
        let _guard = a.try_acquire().unwrap().unwrap();
    }
    assert!(a.current_holder().unwrap().is_none());
    assert!(b.try_acquire().unwrap().is_some());
}

#[test]
fn expired_lease_can_be_taken_over() {
    let backend = Arc::new(MemoryStore::new());
    let a = lease(&backend, "device-a", Duration::ZERO);
    let b = lease(&backend, "device-b", Duration::from_secs(60));

    let held = a.try_acquire().unwrap().unwrap();
    std::mem::forget(held);
    assert!(b.try_acquire().unwrap().is_some());
}

#[test]
fn same_holder_can_reacquire() {
    let backend = Arc::new(MemoryStore::new());
    let a = lease(&backend, "device-a", Duration::from_secs(60));
    let first = a.try_acquire().unwrap();
    assert!(first.is_some());
    std::mem::forget(first);
    assert!(a.try_acquire().unwrap().is_some());
}

#[test]
fn unreadable_lease_record_is_ignored() {
    let backend = Arc::new(MemoryStore::new());
    backend.write("report_queue.lease", b"garbage").unwrap();
    let a = lease(&backend, "device-a", Duration::from_secs(60));
    assert!(a.try_acquire().unwrap().is_some());
}

#[test]
fn renew_extends_an_expiring_claim() {
    let backend = Arc::new(MemoryStore::new());
    let a = lease(&backend, "device-a", Duration::from_millis(200));
    let b = lease(&backend, "device-b", Duration::from_secs(60));

    let guard = a.try_acquire().unwrap().unwrap();
    std::thread::sleep(Duration::from_millis(120));
    assert!(guard.renew().unwrap());
    std::thread::sleep(Duration::from_millis(120));

    // 240ms after the first claim; only the renewal keeps it alive.
    assert!(b.try_acquire().unwrap().is_none());
    assert_eq!(a.current_holder().unwrap().as_deref(), Some("device-a"));
}

#[test]
fn renew_reports_a_lost_lease() {
    let backend = Arc::new(MemoryStore::new());
    let a = lease(&backend, "device-a", Duration::ZERO);
    let b = lease(&backend, "device-b", Duration::from_secs(60));

    let stale = a.try_acquire().unwrap().unwrap();
    let taken = b.try_acquire().unwrap().unwrap();

    assert!(!stale.renew().unwrap());
    assert_eq!(b.current_holder().unwrap().as_deref(), Some("device-b"));

    // Dropping the stale guard leaves the new holder's claim alone.
    drop(stale);
    assert_eq!(b.current_holder().unwrap().as_deref(), Some("device-b"));
    drop(taken);
}
