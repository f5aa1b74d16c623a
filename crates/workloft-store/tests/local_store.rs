//! Tiering behavior of the local store

use serde_json::json;
use tempfile::TempDir;

use workloft_store::{LocalStore, StoreError, TaskState};

fn entry_path(root: &TempDir, store: &str, key: &str) -> std::path::PathBuf {
    root.path()
        .join("stores")
        .join(urlencoding::encode(store).into_owned())
        .join(urlencoding::encode(key).into_owned())
}

#[tokio::test]
async fn test_get_issued_right_after_open_queues_behind_init() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalStore::open_in(root.path(), "fast", 64);

    // Neither tier is ready yet; both operations simply queue.
    let set = store.set("k", &json!({"n": 1}));
    let get = store.get::<serde_json::Value>("k");

    assert_eq!(set.wait().await, TaskState::Succeeded);
    assert_eq!(get.wait().await, TaskState::Succeeded);
    assert_eq!(get.result().as_deref(), Some(&Some(json!({"n": 1}))));
}

#[tokio::test]
async fn test_disk_fallback_repopulates_the_memory_tier() {
    let root = tempfile::tempdir().unwrap();
    // Budget fits one entry at a time, so the second set evicts the
    // first from memory while its file stays on disk.
    let store = LocalStore::open_in(root.path(), "tiered", 1);

    let big = "x".repeat(700);
    store.set("first", &big).wait().await;
    store.set("second", &big).wait().await;
    assert!(entry_path(&root, "tiered", "first").is_file());

    // Served from disk, and backfilled into memory.
    let task = store.get::<String>("first");
    task.wait().await;
    assert_eq!(task.result().as_deref(), Some(&Some(big.clone())));

    // Remove the file; the backfilled copy must now satisfy the read.
    std::fs::remove_file(entry_path(&root, "tiered", "first")).unwrap();
    let task = store.get::<String>("first");
    task.wait().await;
    assert_eq!(task.result().as_deref(), Some(&Some(big)));
}

#[tokio::test]
async fn test_free_keeps_disk_and_erase_removes_everything() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalStore::open_in(root.path(), "wipe me", 64);

    store.set("a", &1u32).wait().await;
    store.set("b", &2u32).wait().await;

    // Free drops memory only: values still come back from disk.
    assert_eq!(store.free().wait().await, TaskState::Succeeded);
    let task = store.get::<u32>("a");
    task.wait().await;
    assert_eq!(task.result().as_deref(), Some(&Some(1)));

    let dir = entry_path(&root, "wipe me", "a")
        .parent()
        .unwrap()
        .to_path_buf();
    assert!(dir.is_dir());

    assert_eq!(store.erase().wait().await, TaskState::Succeeded);
    assert!(!dir.exists());

    let task = store.get::<u32>("a");
    task.wait().await;
    assert!(matches!(task.error().as_deref(), Some(StoreError::Closed)));
}

#[tokio::test]
async fn test_operations_run_in_submission_order() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalStore::open_in(root.path(), "ordered", 64);

    for n in 0..10u32 {
        store.set("counter", &n);
    }
    let task = store.get::<u32>("counter");
    task.wait().await;
    assert_eq!(task.result().as_deref(), Some(&Some(9)));
}

#[tokio::test]
async fn test_remove_deletes_from_both_tiers() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalStore::open_in(root.path(), "rm", 64);

    store.set("k", &json!([1, 2, 3])).wait().await;
    assert!(entry_path(&root, "rm", "k").is_file());

    store.remove("k").wait().await;
    assert!(!entry_path(&root, "rm", "k").exists());

    let task = store.get::<serde_json::Value>("k");
    task.wait().await;
    assert_eq!(task.result().as_deref(), Some(&None));
}
