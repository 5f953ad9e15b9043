// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex as PlMutex;
use std::time::Duration;
use yare::parameterized;

#[parameterized(
    plain = { "T123", "T123" },
    slashes = { "feat/login", "feat-login" },
    dots = { "a.b.c", "a-b-c" },
    collapse = { "a//b", "a-b" },
    unicode = { "tâche", "t-che" },
    underscore = { "a_b-c", "a_b-c" },
)]
fn sanitize_cases(input: &str, expected: &str) {
    assert_eq!(sanitize_task_id(input), expected);
}

#[test]
fn sanitize_caps_length() {
    let long = "x".repeat(200);
    let sanitized = sanitize_task_id(&long);
    assert_eq!(sanitized.len(), 64);
}

#[tokio::test]
async fn merge_lock_serializes_in_fifo_order() {
    let lock = MergeLock::new();
    let order = Arc::new(PlMutex::new(Vec::new()));

    // First holder occupies the lock briefly; two more queue behind it.
    let mut handles = Vec::new();
    for i in 0..3u32 {
        let lock = lock.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            // Stagger entry so the queue order is deterministic
            tokio::time::sleep(Duration::from_millis(i as u64 * 20)).await;
            lock.with_merge_lock(|| async {
                order.lock().push(i);
                tokio::time::sleep(Duration::from_millis(30)).await;
            })
            .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn merge_lock_releases_on_failure() {
    let lock = MergeLock::new();
    let result: Result<(), &str> = lock.with_merge_lock(|| async { Err("merge failed") }).await;
    assert!(result.is_err());
    // Lock must be free again
    lock.with_merge_lock(|| async {}).await;
}

#[test]
fn disabled_store_reports_disabled() {
    let store = DisabledReplicaStore;
    assert!(!store.enabled());
    assert!(!store.exists(&oms_core::TaskId::new("T1")));
    assert!(store.list().is_empty());
}

#[tokio::test]
async fn disabled_store_refuses_create() {
    let store = DisabledReplicaStore;
    assert!(matches!(
        store.create(&oms_core::TaskId::new("T1")).await,
        Err(ReplicaError::Disabled)
    ));
}

#[tokio::test]
async fn fake_store_tracks_lifecycle() {
    let store = FakeReplicaStore::new();
    let task = oms_core::TaskId::new("T1");
    assert!(!store.exists(&task));

    store.create(&task).await.unwrap();
    assert!(store.exists(&task));
    assert_eq!(store.list(), vec!["T1"]);

    store.destroy(&task).await.unwrap();
    assert!(!store.exists(&task));
    assert_eq!(store.destroyed(), vec!["T1"]);
}
