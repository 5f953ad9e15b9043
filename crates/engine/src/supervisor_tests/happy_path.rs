// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end pipelines on the happy path.

use super::*;
use oms_core::TaskId;

/// Small task: issuer → worker → finisher → closed, replicas disabled.
#[tokio::test]
async fn small_task_runs_the_full_pipeline_to_close() {
    let ctx = setup();
    ctx.store.put_task(task("T1", TaskScope::Small));

    assert_eq!(ctx.sup.start_tasks(Some(1)).await, 1);

    // Issuer decides a worker is needed.
    let (issuer_spec, issuer) = nth_launch(&ctx, 0).await;
    assert!(issuer_spec.label.starts_with("issuer:T1:"), "{}", issuer_spec.label);
    assert_eq!(ctx.store.task_status("T1"), Some(TaskStatus::InProgress));
    ctx.sup
        .advance_lifecycle(lc_with("issuer", "T1", "advance", Some("worker"), "do it", "ready"))
        .unwrap_or_else(|e| panic!("{}", e));
    issuer.end_turn();

    // Worker is kicked off with the issuer's message.
    let (worker_spec, worker) = nth_launch(&ctx, 1).await;
    assert!(worker_spec.label.starts_with("worker:T1:"), "{}", worker_spec.label);
    worker.wait_for_command("prompt").await;
    assert!(first_prompt(&worker).contains("do it"));
    ctx.sup
        .advance_lifecycle(lc("worker", "T1", "advance", Some("finisher")))
        .unwrap_or_else(|e| panic!("{}", e));
    worker.end_turn();

    // Finisher verifies and closes.
    let (finisher_spec, finisher) = nth_launch(&ctx, 2).await;
    assert!(finisher_spec.label.starts_with("finisher:T1:"));
    ctx.sup
        .advance_lifecycle(lc_with("finisher", "T1", "close", None, "", "done"))
        .unwrap_or_else(|e| panic!("{}", e));
    finisher.end_turn();

    wait_until("task close", || {
        ctx.store.task_status("T1") == Some(TaskStatus::Closed)
    })
    .await;
    assert!(ctx
        .store
        .comments("T1")
        .iter()
        .any(|c| c == "Finisher close recorded for T1"));

    wait_until("registry drain", || {
        ctx.sup.registry().get_active_by_task(&TaskId::new("T1")).is_empty()
    })
    .await;
    assert_no_more_launches(&ctx, 3).await;
}

/// Tiny task: speedy closes directly, no worker or finisher.
#[tokio::test]
async fn tiny_task_takes_the_speedy_fast_path() {
    let ctx = setup();
    ctx.store.put_task(task("T2", TaskScope::Tiny));

    assert_eq!(ctx.sup.start_tasks(Some(1)).await, 1);

    let (speedy_spec, speedy) = nth_launch(&ctx, 0).await;
    assert!(speedy_spec.label.starts_with("speedy:T2:"), "{}", speedy_spec.label);

    ctx.sup
        .advance_lifecycle(lc_with("speedy", "T2", "close", None, "", "trivial fix"))
        .unwrap_or_else(|e| panic!("{}", e));
    speedy.end_turn();

    wait_until("task close", || {
        ctx.store.task_status("T2") == Some(TaskStatus::Closed)
    })
    .await;
    assert_no_more_launches(&ctx, 1).await;
}

/// Speedy escalation hands the task to a full issuer pipeline.
#[tokio::test]
async fn speedy_escalation_reaches_the_issuer() {
    let ctx = setup();
    ctx.store.put_task(task("T3", TaskScope::Tiny));

    ctx.sup.start_tasks(Some(1)).await;
    let (_spec, speedy) = nth_launch(&ctx, 0).await;
    ctx.sup
        .advance_lifecycle(lc_with(
            "speedy",
            "T3",
            "advance",
            Some("issuer"),
            "this is not tiny",
            "needs design work",
        ))
        .unwrap_or_else(|e| panic!("{}", e));
    speedy.end_turn();

    let (issuer_spec, issuer) = nth_launch(&ctx, 1).await;
    assert!(issuer_spec.label.starts_with("issuer:T3:"));
    issuer.wait_for_command("prompt").await;
    assert!(first_prompt(&issuer).contains("escalated"));
}

/// Issuer close means "no worker needed": the finisher still verifies.
#[tokio::test]
async fn issuer_skip_goes_straight_to_finisher() {
    let ctx = setup();
    ctx.store.put_task(task("T4", TaskScope::Small));

    ctx.sup.start_tasks(Some(1)).await;
    let (_spec, issuer) = nth_launch(&ctx, 0).await;
    ctx.sup
        .advance_lifecycle(lc_with(
            "issuer",
            "T4",
            "close",
            None,
            "already fixed upstream",
            "",
        ))
        .unwrap_or_else(|e| panic!("{}", e));
    issuer.end_turn();

    let (finisher_spec, finisher) = nth_launch(&ctx, 1).await;
    assert!(finisher_spec.label.starts_with("finisher:T4:"));
    finisher.wait_for_command("prompt").await;
    assert!(first_prompt(&finisher).contains("No worker was needed"));
}

/// Issuer block marks the task blocked with the canonical comment.
#[tokio::test]
async fn issuer_block_blocks_the_task() {
    let ctx = setup();
    ctx.store.put_task(task("T5", TaskScope::Small));

    ctx.sup.start_tasks(Some(1)).await;
    let (_spec, issuer) = nth_launch(&ctx, 0).await;
    ctx.sup
        .advance_lifecycle(lc_with(
            "issuer",
            "T5",
            "block",
            None,
            "",
            "needs credentials from a human",
        ))
        .unwrap_or_else(|e| panic!("{}", e));
    issuer.end_turn();

    wait_until("block", || {
        ctx.store.task_status("T5") == Some(TaskStatus::Blocked)
    })
    .await;
    assert!(ctx
        .store
        .comments("T5")
        .iter()
        .any(|c| c.starts_with("Blocked by issuer.") && c.contains("credentials")));
    assert_no_more_launches(&ctx, 1).await;
}

/// Label rules route design-labelled tasks to a designer when the issuer
/// does not name a target.
#[tokio::test]
async fn design_labels_select_the_designer() {
    let ctx = setup();
    let mut t = task("T6", TaskScope::Small);
    t.labels = vec!["visual-polish".to_string()];
    ctx.store.put_task(t);

    ctx.sup.start_tasks(Some(1)).await;
    let (_spec, issuer) = nth_launch(&ctx, 0).await;
    ctx.sup
        .advance_lifecycle(lc("issuer", "T6", "advance", Some("designer")))
        .unwrap_or_else(|e| panic!("{}", e));
    issuer.end_turn();

    let (worker_spec, _worker) = nth_launch(&ctx, 1).await;
    assert!(worker_spec.label.starts_with("designer:T6:"), "{}", worker_spec.label);
}

/// Closing a task reopens its blocked dependents and starts them.
#[tokio::test]
async fn close_unblocks_dependents() {
    let ctx = setup();
    ctx.store.put_task(in_progress_task("T7"));
    let mut dependent = task("T8", TaskScope::Small);
    dependent.status = TaskStatus::Blocked;
    dependent.depends_on_ids = vec![TaskId::new("T7")];
    ctx.store.put_task(dependent);

    ctx.sup
        .close_task_and_unblock_dependents(&TaskId::new("T7"), "done")
        .await;

    wait_until("dependent pipeline", || ctx.launcher.launch_count() >= 1).await;
    let (spec, _issuer) = nth_launch(&ctx, 0).await;
    assert!(spec.label.starts_with("issuer:T8:"), "{}", spec.label);
}
