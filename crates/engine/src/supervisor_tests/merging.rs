// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merger queue: FIFO order, strict serialization, external closes.

use super::*;
use oms_core::{AgentType, TaskId};

fn seeded(ctx: &TestContext, id: &str) {
    ctx.store.put_task(in_progress_task(id));
    ctx.replicas.seed(id);
}

/// Finisher closes two tasks; mergers run strictly one at a time, in FIFO
/// order, and each close happens only after its replica is destroyed.
#[tokio::test]
async fn merge_queue_is_fifo_and_serial() {
    let ctx = setup_with_replicas();
    seeded(&ctx, "T4");
    seeded(&ctx, "T5");

    assert!(ctx.sup.handle_finisher_close_task(&TaskId::new("T4"), "done", None).await);
    assert!(ctx.sup.handle_finisher_close_task(&TaskId::new("T5"), "done", None).await);

    // Only T4's merger is alive.
    let (first_merger, _rpc) = nth_launch(&ctx, 0).await;
    assert!(first_merger.label.starts_with("merger:T4:"), "{}", first_merger.label);
    assert_no_more_launches(&ctx, 1).await;
    let active_mergers = ctx
        .sup
        .registry()
        .get_active()
        .into_iter()
        .filter(|a| a.agent_type == AgentType::Merger)
        .count();
    assert_eq!(active_mergers, 1);

    // Neither task is closed yet; both are queued/merging.
    assert_eq!(ctx.store.task_status("T4"), Some(TaskStatus::InProgress));
    assert_eq!(ctx.store.task_status("T5"), Some(TaskStatus::InProgress));

    ctx.sup
        .handle_merger_complete(&TaskId::new("T4"), "merged cleanly")
        .await;

    // destroy → close ordering held for T4, and T5's merger only now spawns.
    assert_eq!(ctx.replicas.destroyed(), vec!["T4"]);
    assert_eq!(ctx.store.task_status("T4"), Some(TaskStatus::Closed));
    let (second_merger, _rpc) = nth_launch(&ctx, 1).await;
    assert!(second_merger.label.starts_with("merger:T5:"), "{}", second_merger.label);

    ctx.sup
        .handle_merger_complete(&TaskId::new("T5"), "merged cleanly")
        .await;
    assert_eq!(ctx.store.task_status("T5"), Some(TaskStatus::Closed));
    assert_eq!(ctx.replicas.destroyed(), vec!["T4", "T5"]);
    assert_no_more_launches(&ctx, 2).await;
}

/// A task closed externally while queued is dropped without a merger.
#[tokio::test]
async fn external_close_removes_queued_task() {
    let ctx = setup_with_replicas();
    seeded(&ctx, "T7");
    seeded(&ctx, "T6");

    // T6 queues behind T7.
    ctx.sup.handle_finisher_close_task(&TaskId::new("T7"), "done", None).await;
    ctx.sup.handle_finisher_close_task(&TaskId::new("T6"), "done", None).await;
    let (first, _rpc) = nth_launch(&ctx, 0).await;
    assert!(first.label.starts_with("merger:T7:"));

    ctx.sup.handle_external_task_close(&TaskId::new("T6")).await;
    assert!(ctx.replicas.destroyed().contains(&"T6".to_string()));

    ctx.sup
        .handle_merger_complete(&TaskId::new("T7"), "merged")
        .await;

    // No merger was ever spawned for T6.
    assert_no_more_launches(&ctx, 1).await;
    assert!(ctx.sup.merger_queue.lock().is_empty());
}

/// Merger conflicts block the task and keep the replica for humans.
#[tokio::test]
async fn merge_conflict_blocks_and_keeps_replica() {
    let ctx = setup_with_replicas();
    seeded(&ctx, "T8");

    ctx.sup.handle_finisher_close_task(&TaskId::new("T8"), "done", None).await;
    nth_launch(&ctx, 0).await;

    ctx.sup
        .handle_merger_conflict(&TaskId::new("T8"), "overlapping edits in src/lib.rs")
        .await;

    assert_eq!(ctx.store.task_status("T8"), Some(TaskStatus::Blocked));
    assert!(ctx
        .store
        .comments("T8")
        .iter()
        .any(|c| c.starts_with("Blocked by merger conflict.") && c.contains("overlapping")));
    // Replica retained for human resolution
    assert!(ctx.replicas.destroyed().is_empty());
    assert!(ctx.replicas.exists(&TaskId::new("T8")));
}

/// Without a live replica the finisher close falls through to a direct
/// close and unblock.
#[tokio::test]
async fn finisher_close_without_replica_closes_directly() {
    let ctx = setup_with_replicas();
    ctx.store.put_task(in_progress_task("T9"));

    let queued = ctx
        .sup
        .handle_finisher_close_task(&TaskId::new("T9"), "nothing to merge", None)
        .await;
    assert!(!queued);
    assert_eq!(ctx.store.task_status("T9"), Some(TaskStatus::Closed));
    assert_no_more_launches(&ctx, 0).await;
}

/// A queued task whose status left in_progress is dropped with its replica.
#[tokio::test]
async fn queue_drops_tasks_no_longer_in_progress() {
    let ctx = setup_with_replicas();
    seeded(&ctx, "T10");
    // Externally closed before the queue got to it
    ctx.store
        .close(&TaskId::new("T10"), "superseded")
        .await
        .unwrap_or_else(|e| panic!("{}", e));

    ctx.sup.merger_queue.lock().enqueue(crate::merger_queue::MergerEntry {
        task_id: TaskId::new("T10"),
        replica_dir: ctx.replicas.replica_dir(&TaskId::new("T10")),
    });
    ctx.sup.process_merger_queue().await;

    assert!(ctx.sup.merger_queue.lock().is_empty());
    assert_eq!(ctx.replicas.destroyed(), vec!["T10"]);
    assert_no_more_launches(&ctx, 0).await;
}

/// A queued task whose replica vanished closes with the canonical reason.
#[tokio::test]
async fn missing_replica_closes_without_merge() {
    let ctx = setup_with_replicas();
    ctx.store.put_task(in_progress_task("T11"));

    ctx.sup.merger_queue.lock().enqueue(crate::merger_queue::MergerEntry {
        task_id: TaskId::new("T11"),
        replica_dir: ctx.replicas.replica_dir(&TaskId::new("T11")),
    });
    ctx.sup.process_merger_queue().await;

    assert_eq!(ctx.store.task_status("T11"), Some(TaskStatus::Closed));
    assert!(ctx
        .store
        .close_reasons("T11")
        .iter()
        .any(|r| r == "Closed without merge (replica directory missing)"));
}

/// Startup restore: live replicas requeue, stale ones are destroyed.
#[tokio::test]
async fn restore_requeues_live_replicas_only() {
    let ctx = setup_with_replicas();
    seeded(&ctx, "T12");
    ctx.replicas.seed("T13");
    ctx.store.put_task(task("T13", TaskScope::Small)); // open, not in_progress
    ctx.replicas.seed("T14"); // unknown to the store

    ctx.sup.restore_merger_queue_from_replicas().await;

    assert!(ctx.sup.merger_queue.lock().has_task(&TaskId::new("T12")));
    assert!(!ctx.sup.merger_queue.lock().has_task(&TaskId::new("T13")));
    let destroyed = ctx.replicas.destroyed();
    assert!(destroyed.contains(&"T13".to_string()));
    assert!(destroyed.contains(&"T14".to_string()));
}
