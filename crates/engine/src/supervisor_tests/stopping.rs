// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop sweeps: terminal-before-abort ordering and idempotent finalization.

use super::*;
use oms_core::{AgentStatus, AgentType, TaskId};

#[tokio::test]
async fn stop_marks_stopped_and_blocks_with_canonical_comment() {
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

    let stopped = ctx
        .sup
        .stop_agents_for_task(&TaskId::new("T1"), true, true)
        .await;
    assert_eq!(stopped, 1);
    assert_eq!(worker.status(), AgentStatus::Stopped);
    assert_eq!(ctx.store.task_status("T1"), Some(TaskStatus::Blocked));
    assert!(ctx.store.comments("T1").iter().any(|c| c
        == "Blocked by user via Stop. Ask Singularity for guidance, then unblock when ready."));
}

/// A late `agent_end` after a stop sweep must not re-finalize the agent.
#[tokio::test]
async fn late_agent_end_after_stop_is_inert() {
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

    ctx.sup
        .stop_agents_for_task(&TaskId::new("T1"), true, false)
        .await;
    assert_eq!(worker.status(), AgentStatus::Stopped);

    // Late turn-end from the dying process
    rpc.end_turn();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Status remains Stopped; nothing was resurrected.
    assert_eq!(worker.status(), AgentStatus::Stopped);
    assert!(ctx.sup.registry().get(&worker.id).is_none());
    // The stop produced exactly one terminal state push for this agent.
    let stopped_pushes = ctx
        .store
        .calls()
        .into_iter()
        .filter(|c| {
            matches!(c, oms_adapters::StoreCall::SetAgentState(_, state) if state == "stopped")
        })
        .count();
    assert_eq!(stopped_pushes, 1);
}

#[tokio::test]
async fn stop_can_exclude_finishers() {
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
    let finisher = ctx
        .sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Finisher,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();

    let stopped = ctx
        .sup
        .stop_agents_for_task(&TaskId::new("T1"), false, false)
        .await;
    assert_eq!(stopped, 1);
    assert!(finisher.is_active());
}

#[tokio::test]
async fn stop_all_pauses_the_loop() {
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

    let stopped = ctx.sup.stop_all_agents_and_pause().await;
    assert_eq!(stopped, 2);
    assert!(ctx.sup.is_paused());
    assert!(ctx.sup.registry().get_active().is_empty());

    // A paused supervisor ticks to nothing.
    ctx.store.set_resume_candidates(vec!["T1", "T2"]);
    ctx.sup.tick().await;
    assert_no_more_launches(&ctx, 2).await;
}

/// Replacement via the control surface stops the incumbents first.
#[tokio::test]
async fn replace_agent_stops_existing_agents_and_spawns_requested_type() {
    let ctx = setup();
    let t = in_progress_task("T1");
    ctx.store.put_task(t.clone());

    let old_worker = ctx
        .sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();

    ctx.sup
        .spawn_agent_by_singularity(
            AgentType::Worker,
            &TaskId::new("T1"),
            Some("start over, the approach was wrong".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(old_worker.status(), AgentStatus::Stopped);
    let (replacement, rpc) = nth_launch(&ctx, 1).await;
    assert!(replacement.label.starts_with("worker:T1:"));
    rpc.wait_for_command("prompt").await;
    assert!(first_prompt(&rpc).contains("start over"));
}

/// Replacing an agent on a blocked task unblocks it first.
#[tokio::test]
async fn replace_agent_unblocks_blocked_tasks() {
    let ctx = setup();
    let mut t = task("T1", TaskScope::Small);
    t.status = TaskStatus::Blocked;
    ctx.store.put_task(t);

    ctx.sup
        .spawn_agent_by_singularity(AgentType::Worker, &TaskId::new("T1"), None)
        .await
        .unwrap();

    assert_eq!(ctx.store.task_status("T1"), Some(TaskStatus::InProgress));
    let (spec, _rpc) = nth_launch(&ctx, 0).await;
    assert!(spec.label.starts_with("worker:T1:"));
}
