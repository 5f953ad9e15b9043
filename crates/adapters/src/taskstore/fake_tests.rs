// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oms_core::TaskScope;

fn open_task(id: &str) -> TaskRef {
    TaskRef::new(id, format!("task {}", id), TaskStatus::Open)
}

#[tokio::test]
async fn try_claim_wins_once() {
    let store = FakeTaskStore::new();
    store.put_task(open_task("T1"));

    assert!(store.try_claim(&TaskId::new("T1")).await.unwrap());
    assert_eq!(store.task_status("T1"), Some(TaskStatus::InProgress));
    assert!(!store.try_claim(&TaskId::new("T1")).await.unwrap());
}

#[tokio::test]
async fn close_flips_status_and_records_reason() {
    let store = FakeTaskStore::new();
    store.put_task(open_task("T1"));
    store.close(&TaskId::new("T1"), "done").await.unwrap();
    assert_eq!(store.task_status("T1"), Some(TaskStatus::Closed));
    assert_eq!(store.close_reasons("T1"), vec!["done"]);
}

#[tokio::test]
async fn next_tasks_respect_dependencies_and_order() {
    let store = FakeTaskStore::new();
    store.put_task(open_task("T2"));
    let mut blocked = open_task("T3");
    blocked.depends_on_ids = vec![TaskId::new("T9")];
    store.put_task(blocked);
    store.put_task(TaskRef::new("T9", "dep", TaskStatus::InProgress));
    store.put_task(open_task("T1"));

    let next = store.get_next_tasks(10).await.unwrap();
    let ids: Vec<&str> = next.iter().map(|t| t.id.as_str()).collect();
    // T3 is dependency-blocked; T1 sorts before T2
    assert_eq!(ids, vec!["T1", "T2"]);
}

#[tokio::test]
async fn resume_candidates_are_scripted_and_status_filtered() {
    let store = FakeTaskStore::new();
    store.put_task(TaskRef::new("T1", "a", TaskStatus::InProgress));
    store.put_task(TaskRef::new("T2", "b", TaskStatus::Closed));
    store.set_resume_candidates(vec!["T1", "T2"]);

    let candidates = store
        .get_in_progress_tasks_without_agent(10)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, "T1");
}

#[tokio::test]
async fn unblocked_by_requires_all_other_deps_closed() {
    let store = FakeTaskStore::new();

    let mut t2 = TaskRef::new("T2", "waits on T1", TaskStatus::Blocked);
    t2.depends_on_ids = vec![TaskId::new("T1")];
    store.put_task(t2);

    let mut t3 = TaskRef::new("T3", "waits on T1 and T4", TaskStatus::Blocked);
    t3.depends_on_ids = vec![TaskId::new("T1"), TaskId::new("T4")];
    store.put_task(t3);
    store.put_task(TaskRef::new("T4", "open dep", TaskStatus::Open));

    let unblocked = store.find_tasks_unblocked_by(&TaskId::new("T1")).await.unwrap();
    let ids: Vec<&str> = unblocked.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["T2"]);
}

#[tokio::test]
async fn scripted_failures_fire_once() {
    let store = FakeTaskStore::new();
    store.put_task(open_task("T1"));
    store.fail_next("comment");

    assert!(store.comment(&TaskId::new("T1"), "x").await.is_err());
    assert!(store.comment(&TaskId::new("T1"), "y").await.is_ok());
    assert_eq!(store.comments("T1"), vec!["x", "y"]);
}

#[tokio::test]
async fn created_tasks_default_scope() {
    let store = FakeTaskStore::new();
    let task = store.create("new thing", "details").await.unwrap();
    assert_eq!(task.scope, TaskScope::Medium);
    assert_eq!(store.task(task.id.as_str()).unwrap().description, "details");
}
