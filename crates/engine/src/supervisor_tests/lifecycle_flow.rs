// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle recording: exactly-once consumption, overwrite semantics,
//! and control-message dispatch.

use super::*;
use oms_core::{AgentType, ControlMessage, LifecycleAction, TaskId};

/// Invariant: a record is consumed exactly once; consuming removes it.
#[tokio::test]
async fn record_is_consumed_exactly_once() {
    let ctx = setup();
    ctx.sup
        .advance_lifecycle(lc("issuer", "T1", "advance", Some("worker")))
        .unwrap_or_else(|e| panic!("{}", e));

    let first = ctx.sup.take_lifecycle(&TaskId::new("T1"));
    assert!(first.is_some());
    let record = first.unwrap_or_else(|| panic!("no record"));
    assert_eq!(record.action, LifecycleAction::Advance);
    assert_eq!(record.target, Some(AgentType::Worker));

    assert!(ctx.sup.take_lifecycle(&TaskId::new("T1")).is_none());
    assert!(ctx.sup.lifecycle_by_task.lock().is_empty());
}

/// A second recording replaces the first (observable overwrite).
#[tokio::test]
async fn second_recording_overwrites_the_first() {
    let ctx = setup();
    ctx.sup
        .advance_lifecycle(lc("issuer", "T1", "advance", Some("worker")))
        .unwrap_or_else(|e| panic!("{}", e));
    ctx.sup
        .advance_lifecycle(lc_with("issuer", "T1", "block", None, "", "second thoughts"))
        .unwrap_or_else(|e| panic!("{}", e));

    let record = ctx
        .sup
        .take_lifecycle(&TaskId::new("T1"))
        .unwrap_or_else(|| panic!("no record"));
    assert_eq!(record.action, LifecycleAction::Block);
    assert_eq!(record.reason.as_deref(), Some("second thoughts"));
}

/// Invalid calls are rejected synchronously and record nothing.
#[tokio::test]
async fn invalid_calls_record_nothing() {
    let ctx = setup();

    assert!(ctx
        .sup
        .advance_lifecycle(lc("merger", "T1", "close", None))
        .is_err());
    assert!(ctx
        .sup
        .advance_lifecycle(lc("issuer", "T1", "advance", Some("merger")))
        .is_err());
    assert!(ctx
        .sup
        .advance_lifecycle(lc("issuer", "T1", "destroy", None))
        .is_err());

    assert!(ctx.sup.take_lifecycle(&TaskId::new("T1")).is_none());
}

/// Recording a hand-off aborts live issuers on the task (their job is done).
#[tokio::test]
async fn recording_aborts_live_issuers() {
    let ctx = setup();
    let t = in_progress_task("T1");
    ctx.store.put_task(t.clone());
    ctx.sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Issuer,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    let issuer_rpc = ctx.launcher.nth_launch(0).await.1;

    ctx.sup
        .advance_lifecycle(lc("issuer", "T1", "advance", Some("worker")))
        .unwrap_or_else(|e| panic!("{}", e));

    issuer_rpc.wait_for_command("abort").await;
}

/// Round-trip (invariant 8): record then agent exit ⇒ the pipeline observes
/// exactly that record before its next decision.
#[tokio::test]
async fn round_trip_record_reaches_the_pipeline_decision() {
    let ctx = setup();
    ctx.store.put_task(task("T1", TaskScope::Small));

    ctx.sup.start_tasks(Some(1)).await;
    let (_spec, issuer) = nth_launch(&ctx, 0).await;

    ctx.sup
        .advance_lifecycle(lc_with(
            "issuer",
            "T1",
            "advance",
            Some("designer"),
            "pixel work",
            "",
        ))
        .unwrap_or_else(|e| panic!("{}", e));
    issuer.end_turn();

    // The decision honors action and target exactly.
    let (spec, worker) = nth_launch(&ctx, 1).await;
    assert!(spec.label.starts_with("designer:T1:"), "{}", spec.label);
    worker.wait_for_command("prompt").await;
    assert!(first_prompt(&worker).contains("pixel work"));
    // And the record is gone.
    assert!(ctx.sup.take_lifecycle(&TaskId::new("T1")).is_none());
}

/// Control-socket dispatch covers the lifecycle and merge signals.
#[tokio::test]
async fn control_messages_dispatch_to_handlers() {
    let ctx = setup();
    ctx.store.put_task(in_progress_task("T1"));

    ctx.sup
        .handle_control_message(ControlMessage::AdvanceLifecycle {
            input: lc("issuer", "T1", "advance", Some("worker")),
        })
        .await;
    assert!(ctx.sup.take_lifecycle(&TaskId::new("T1")).is_some());

    // Rejections are swallowed (logged), not fatal.
    ctx.sup
        .handle_control_message(ControlMessage::AdvanceLifecycle {
            input: lc("merger", "T1", "close", None),
        })
        .await;
    assert!(ctx.sup.take_lifecycle(&TaskId::new("T1")).is_none());

    // Interrupt with no agents queues the kickoff.
    ctx.sup
        .handle_control_message(ControlMessage::InterruptAgent {
            task_id: "T1".to_string(),
            message: "halt".to_string(),
            ts: None,
        })
        .await;
    assert_eq!(
        ctx.sup.pending_kickoffs.lock().get(&TaskId::new("T1")).map(String::as_str),
        Some("[URGENT MESSAGE]\n\nhalt")
    );
}
