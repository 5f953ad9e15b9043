// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery of agents that exit without a lifecycle hand-off.

use super::*;
use oms_core::rpc::RpcEvent;
use serde_json::json;

/// Missing hand-off: the issuer is resumed once with its captured session
/// and the recovery nudge, then proceeds normally.
#[tokio::test]
async fn missing_handoff_resumes_with_captured_session() {
    let ctx = setup();
    ctx.store.put_task(task("T3", TaskScope::Small));

    ctx.sup.start_tasks(Some(1)).await;

    // First issuer run: leaks its session id, ends without a hand-off.
    let (first_spec, first_issuer) = nth_launch(&ctx, 0).await;
    assert!(first_spec.label.starts_with("issuer:T3:"));
    assert!(!first_spec.args.contains(&"--resume".to_string()));
    first_issuer.emit(RpcEvent::from_value(
        json!({"type": "turn_start", "session_id": "sess-3"}),
    ));
    first_issuer.end_turn();

    // Second run resumes the same session with the recovery steer.
    let (second_spec, second_issuer) = nth_launch(&ctx, 1).await;
    assert!(second_spec.label.starts_with("issuer:T3:"));
    let resume_at = second_spec
        .args
        .iter()
        .position(|a| a == "--resume")
        .unwrap_or_else(|| panic!("no --resume in {:?}", second_spec.args));
    assert_eq!(second_spec.args[resume_at + 1], "sess-3");
    second_issuer.wait_for_command("prompt").await;
    assert!(first_prompt(&second_issuer).contains("SYSTEM RECOVERY"));

    // Resumed issuer hands off; exactly one worker appears.
    ctx.sup
        .advance_lifecycle(lc_with("issuer", "T3", "advance", Some("worker"), "ship it", "ready"))
        .unwrap_or_else(|e| panic!("{}", e));
    second_issuer.end_turn();

    let (worker_spec, _worker) = nth_launch(&ctx, 2).await;
    assert!(worker_spec.label.starts_with("worker:T3:"));

    assert_no_more_launches(&ctx, 3).await;
    let issuer_runs = ctx
        .launcher
        .launches()
        .iter()
        .filter(|(spec, _)| spec.label.starts_with("issuer:"))
        .count();
    assert_eq!(issuer_runs, 2, "issuer retried exactly once");
}

/// Without a leaked session id, the retry is a fresh spawn carrying the
/// recovery context.
#[tokio::test]
async fn missing_handoff_without_session_spawns_fresh() {
    let ctx = setup();
    ctx.store.put_task(task("T1", TaskScope::Small));

    ctx.sup.start_tasks(Some(1)).await;
    let (_spec, first_issuer) = nth_launch(&ctx, 0).await;
    first_issuer.end_turn();

    let (second_spec, second_issuer) = nth_launch(&ctx, 1).await;
    assert!(!second_spec.args.contains(&"--resume".to_string()));
    second_issuer.wait_for_command("prompt").await;
    assert!(first_prompt(&second_issuer).contains("SYSTEM RECOVERY"));
}

/// The retry budget is a hard cap; exhaustion blocks the task.
#[tokio::test]
async fn retry_budget_exhaustion_blocks_the_task() {
    let ctx = setup();
    ctx.store.put_task(task("T2", TaskScope::Small));

    ctx.sup.start_tasks(Some(1)).await;
    for attempt in 0..3 {
        let (_spec, issuer) = nth_launch(&ctx, attempt).await;
        issuer.end_turn();
    }

    wait_until("block after budget", || {
        ctx.store.task_status("T2") == Some(TaskStatus::Blocked)
    })
    .await;
    assert!(ctx
        .store
        .comments("T2")
        .iter()
        .any(|c| c.contains("failed after 3 attempts")));
    assert_no_more_launches(&ctx, 3).await;
}

/// Recovery stops quietly when the task is closed out from under it.
#[tokio::test]
async fn recovery_abandons_closed_tasks() {
    let ctx = setup();
    ctx.store.put_task(task("T4", TaskScope::Small));

    ctx.sup.start_tasks(Some(1)).await;
    let (_spec, issuer) = nth_launch(&ctx, 0).await;

    // Task is closed externally while the issuer flounders.
    ctx.store
        .close(&oms_core::TaskId::new("T4"), "superseded")
        .await
        .unwrap_or_else(|e| panic!("{}", e));
    issuer.end_turn();

    assert_no_more_launches(&ctx, 1).await;
    assert_eq!(ctx.store.task_status("T4"), Some(TaskStatus::Closed));
}

/// A worker exiting without a hand-off leaves the task resumable; the next
/// tick re-runs the issuer.
#[tokio::test]
async fn dead_worker_is_picked_up_by_resume() {
    let ctx = setup();
    ctx.store.put_task(task("T5", TaskScope::Small));

    ctx.sup.start_tasks(Some(1)).await;
    let (_ispec, issuer) = nth_launch(&ctx, 0).await;
    ctx.sup
        .advance_lifecycle(lc("issuer", "T5", "advance", Some("worker")))
        .unwrap_or_else(|e| panic!("{}", e));
    issuer.end_turn();

    let (_wspec, worker) = nth_launch(&ctx, 1).await;
    // Worker process dies with no hand-off.
    worker.exit(Some(1));

    wait_until("worker finalized", || {
        ctx.sup
            .registry()
            .get_active_by_task(&oms_core::TaskId::new("T5"))
            .is_empty()
    })
    .await;

    // The resume tick finds the orphaned in-progress task.
    ctx.store.set_resume_candidates(vec!["T5"]);
    ctx.sup.tick().await;

    let (resume_spec, _issuer2) = nth_launch(&ctx, 2).await;
    assert!(resume_spec.label.starts_with("issuer:T5:"), "{}", resume_spec.label);
}
