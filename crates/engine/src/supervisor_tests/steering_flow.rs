// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Steering, interrupts, and pending kickoffs.

use super::*;
use oms_core::rpc::RpcCommand;
use oms_core::{AgentType, TaskId};
use serde_json::json;
use std::time::Duration;

/// Interrupting a task with no live agent queues the urgent message; the
/// next resume pipeline passes it verbatim to a worker, skipping the issuer.
#[tokio::test]
async fn interrupt_without_agents_queues_kickoff_for_resume() {
    let ctx = setup();
    ctx.store.put_task(in_progress_task("T8"));

    let delivered = ctx
        .sup
        .interrupt_agent(&TaskId::new("T8"), "stop doing X")
        .await;
    assert!(!delivered);

    ctx.store.set_resume_candidates(vec!["T8"]);
    ctx.sup.tick().await;

    let (spec, worker) = nth_launch(&ctx, 0).await;
    assert!(spec.label.starts_with("worker:T8:"), "issuer was not skipped: {}", spec.label);
    worker.wait_for_command("prompt").await;
    assert_eq!(first_prompt(&worker), "[URGENT MESSAGE]\n\nstop doing X");
    assert_no_more_launches(&ctx, 1).await;
}

/// Interrupting live agents suppresses the aborted turn's end and delivers
/// abort_and_prompt (invariant 7: suppression consumes exactly one end).
#[tokio::test]
async fn interrupt_with_live_agent_suppresses_and_reprompts() {
    let ctx = setup();
    let t = in_progress_task("T1");
    ctx.store.put_task(t.clone());

    let worker = ctx
        .sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    let rpc = ctx.launcher.nth_launch(0).await.1;

    let delivered = ctx
        .sup
        .interrupt_agent(&TaskId::new("T1"), "change course")
        .await;
    assert!(delivered);

    rpc.wait_for_command("abort_and_prompt").await;
    let urgent = rpc
        .commands()
        .into_iter()
        .find_map(|c| match c {
            RpcCommand::AbortAndPrompt { message } => Some(message),
            _ => None,
        })
        .unwrap();
    assert_eq!(urgent, "[URGENT MESSAGE]\n\nchange course");

    // The abort's own turn-end is swallowed; the next one resolves waiters.
    let waiter = {
        let rpc = std::sync::Arc::clone(&worker.rpc);
        tokio::spawn(async move { rpc.wait_for_agent_end(Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;
    rpc.end_turn_with(json!({"aborted_turn": true}));
    rpc.end_turn_with(json!({"real_turn": true}));
    let resolved = waiter.await.unwrap().unwrap();
    assert_eq!(resolved["real_turn"], true);
}

/// steer_agent reaches every active non-finisher agent on the task.
#[tokio::test]
async fn steer_agent_targets_non_finishers_only() {
    let ctx = setup();
    let t = in_progress_task("T1");
    ctx.store.put_task(t.clone());

    ctx.sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    ctx.sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Finisher,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();

    assert!(ctx.sup.steer_agent(&TaskId::new("T1"), "focus on tests").await);

    let worker_rpc = ctx.launcher.nth_launch(0).await.1;
    let finisher_rpc = ctx.launcher.nth_launch(1).await.1;
    worker_rpc.wait_for_command("steer").await;
    assert_eq!(finisher_rpc.count_command("steer"), 0);
}

#[tokio::test]
async fn steer_agent_without_targets_returns_false() {
    let ctx = setup();
    ctx.store.put_task(in_progress_task("T1"));
    assert!(!ctx.sup.steer_agent(&TaskId::new("T1"), "hello").await);
}

/// Periodic steering: a worker due for review gets a steering agent whose
/// verdict is applied as a steer.
#[tokio::test]
async fn steering_review_applies_steer_verdict() {
    let ctx = setup();
    let t = in_progress_task("T1");
    ctx.store.put_task(t.clone());

    let _worker = ctx
        .sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    let worker_rpc = ctx.launcher.nth_launch(0).await.1;
    worker_rpc.push_response(
        "get_messages",
        Ok(Some(json!({"messages": [
            {"role": "assistant", "content": "I keep rewriting the same file"}
        ]}))),
    );

    // First sighting arms the clock; the second pass (past the interval)
    // starts the review.
    ctx.sup.maybe_steer_workers().await;
    ctx.clock.advance(ctx.sup.config().steering_interval + Duration::from_secs(1));
    ctx.sup.maybe_steer_workers().await;

    let (steering_spec, steering_rpc) = nth_launch(&ctx, 1).await;
    assert!(steering_spec.label.starts_with("steering:T1:"), "{}", steering_spec.label);

    steering_rpc.push_response(
        "get_last_assistant_text",
        Ok(Some(json!({"text": "{\"action\":\"steer\",\"message\":\"stop rewriting\"}"}))),
    );
    steering_rpc.end_turn();

    worker_rpc.wait_for_command("steer").await;
    let steers: Vec<String> = worker_rpc
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            RpcCommand::Steer { message } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(steers, vec!["stop rewriting".to_string()]);

    // The steering agent is force-killed after its single turn.
    wait_until("steering agent cleanup", || {
        !steering_rpc.is_running()
    })
    .await;
}

/// No steering while a finisher owns the task.
#[tokio::test]
async fn steering_skips_tasks_with_finisher_takeover() {
    let ctx = setup();
    let t = in_progress_task("T1");
    ctx.store.put_task(t.clone());

    ctx.sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    ctx.sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Finisher,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();

    ctx.sup.maybe_steer_workers().await;
    ctx.clock.advance(ctx.sup.config().steering_interval + Duration::from_secs(1));
    ctx.sup.maybe_steer_workers().await;

    // Only the worker and finisher were ever launched.
    assert_no_more_launches(&ctx, 2).await;
}

/// Broadcast steering applies per-worker decisions.
#[tokio::test]
async fn broadcast_applies_decisions_per_worker() {
    let ctx = setup();
    let t1 = in_progress_task("T1");
    let t2 = in_progress_task("T2");
    ctx.store.put_task(t1.clone());
    ctx.store.put_task(t2.clone());

    ctx.sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t1,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    ctx.sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t2,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    let worker1 = ctx.launcher.nth_launch(0).await.1;
    let worker2 = ctx.launcher.nth_launch(1).await.1;

    let broadcast = {
        let sup = std::sync::Arc::clone(&ctx.sup);
        tokio::spawn(async move {
            sup.broadcast_to_workers("deploy freeze until tomorrow").await;
        })
    };

    let (_spec, broadcast_rpc) = nth_launch(&ctx, 2).await;
    broadcast_rpc.push_response(
        "get_last_assistant_text",
        Ok(Some(json!({"text": "[\
            {\"task_id\":\"T1\",\"action\":\"steer\",\"message\":\"pause deploy steps\"},\
            {\"task_id\":\"T2\",\"action\":\"abort\",\"reason\":\"mid-deploy\"}]"}))),
    );
    broadcast_rpc.end_turn();
    broadcast.await.unwrap();

    assert_eq!(worker1.count_command("steer"), 1);
    assert_eq!(worker2.count_command("abort"), 1);
}
