use reportsync_storage::{FileStore, KvStore, MemoryStore, QueueStore, SqliteStore, StorageError};
use reportsync_types::{QueueItem, ReportPayload};
use std::sync::Arc;

fn exercise_kv(store: &dyn KvStore) {
    assert!(store.read("alpha").unwrap().is_none());

    store.write("alpha", b"one").unwrap();
    assert_eq!(store.read("alpha").unwrap(), Some(b"one".to_vec()));

    store.write("alpha", b"two").unwrap();
    assert_eq!(store.read("alpha").unwrap(), Some(b"two".to_vec()));

    store.delete("alpha").unwrap();
    assert!(store.read("alpha").unwrap().is_none());

    // Deleting twice is fine.
    store.delete("alpha").unwrap();
}

// ── Memory ───────────────────────────────────────────────────────

#[test]
fn memory_store_contract() {
    exercise_kv(&MemoryStore::new());
}

// ── File ─────────────────────────────────────────────────────────

#[test]
fn file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    exercise_kv(&store);
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let item = QueueItem::new(ReportPayload::new().with_field("title", "Flooding"));
    {
        let store = QueueStore::new(
            Arc::new(FileStore::open(dir.path()).unwrap()),
            "report_queue",
        );
        store.append(item.clone()).unwrap();
    }

    let reopened = QueueStore::new(
        Arc::new(FileStore::open(dir.path()).unwrap()),
        "report_queue",
    );
    assert_eq!(reopened.load(), vec![item]);
}

#[test]
fn file_store_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    store.write("report_queue", b"[]").unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["report_queue".to_string()]);
}

#[test]
fn concurrent_file_writers_never_mix_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let payloads: Vec<Vec<u8>> = (0..4u8).map(|n| vec![b'a' + n; 64 * 1024]).collect();

    let writers: Vec<_> = payloads
        .iter()
        .cloned()
        .map(|payload| {
            let store = FileStore::open(dir.path()).unwrap();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    store.write("report_queue", &payload).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let store = FileStore::open(dir.path()).unwrap();
    let stored = store.read("report_queue").unwrap().unwrap();
    assert!(payloads.contains(&stored));

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["report_queue".to_string()]);
}

#[test]
fn file_store_rejects_path_like_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    for key in ["../escape", "a/b", "", ".hidden"] {
        assert!(matches!(
            store.write(key, b"x").unwrap_err(),
            StorageError::InvalidKey(_)
        ));
    }
}

// ── SQLite ───────────────────────────────────────────────────────

#[test]
fn sqlite_store_contract() {
    let store = SqliteStore::open_in_memory().unwrap();
    exercise_kv(&store);
}

#[test]
fn sqlite_store_tracks_update_time() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.updated_at("k").unwrap().is_none());
    store.write("k", b"v").unwrap();
    assert!(store.updated_at("k").unwrap().is_some());
}

#[test]
fn sqlite_store_shared_between_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let first = SqliteStore::open(&path).unwrap();
    let second = SqliteStore::open(&path).unwrap();

    first.write("report_queue", b"hello").unwrap();
    assert_eq!(second.read("report_queue").unwrap(), Some(b"hello".to_vec()));
}
