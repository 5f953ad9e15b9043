// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission control and spawn-guard dedup.

use super::*;
use oms_core::{AgentType, TaskId};

/// Slot math: active workers and in-flight pipelines both consume slots,
/// and the result never underflows.
#[tokio::test]
async fn available_slots_account_for_workers_and_pipelines() {
    let ctx = setup();
    assert_eq!(ctx.sup.available_worker_slots(), 4);

    ctx.sup.pipeline_inc(&TaskId::new("T1"));
    ctx.sup.pipeline_inc(&TaskId::new("T2"));
    assert_eq!(ctx.sup.available_worker_slots(), 2);

    // The same task again is not a new distinct pipeline
    ctx.sup.pipeline_inc(&TaskId::new("T1"));
    assert_eq!(ctx.sup.available_worker_slots(), 2);

    ctx.sup.pipeline_inc(&TaskId::new("T3"));
    ctx.sup.pipeline_inc(&TaskId::new("T4"));
    ctx.sup.pipeline_inc(&TaskId::new("T5"));
    // 5 distinct pipelines against 4 slots: clamped at zero
    assert_eq!(ctx.sup.available_worker_slots(), 0);

    ctx.sup.pipeline_dec(&TaskId::new("T1"));
    // T1 still has one reference in flight
    assert_eq!(ctx.sup.available_worker_slots(), 0);
    ctx.sup.pipeline_dec(&TaskId::new("T1"));
    assert_eq!(ctx.sup.available_worker_slots(), 1);
}

/// start_tasks never starts more than the available slots.
#[tokio::test]
async fn start_tasks_is_bounded_by_slots() {
    let ctx = setup();
    for i in 1..=6 {
        ctx.store.put_task(task(&format!("T{}", i), TaskScope::Small));
    }

    let started = ctx.sup.start_tasks(None).await;
    assert_eq!(started, 4);

    // All slots spoken for: nothing further starts.
    assert_eq!(ctx.sup.start_tasks(Some(2)).await, 0);
}

/// Two concurrent spawns with the same guard identity collapse into one
/// agent (invariant: ≤1 worker-class agent per task).
#[tokio::test]
async fn concurrent_worker_spawns_collapse() {
    let ctx = setup();
    let t = in_progress_task("T1");
    ctx.store.put_task(t.clone());

    let a = {
        let sup = std::sync::Arc::clone(&ctx.sup);
        let t = t.clone();
        tokio::spawn(async move {
            sup.spawn_agent(SpawnRequest::for_task(
                AgentType::Worker,
                &t,
                PromptSource::Task { extra: None },
            ))
            .await
        })
    };
    let b = {
        let sup = std::sync::Arc::clone(&ctx.sup);
        let t = t.clone();
        tokio::spawn(async move {
            sup.spawn_agent(SpawnRequest::for_task(
                AgentType::Worker,
                &t,
                PromptSource::Task { extra: None },
            ))
            .await
        })
    };

    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(ctx.launcher.launch_count(), 1);
}

/// A designer and a speedy share the worker guard: the second spawn returns
/// the existing agent instead of doubling up.
#[tokio::test]
async fn worker_class_exclusivity_across_types() {
    let ctx = setup();
    let t = in_progress_task("T1");
    ctx.store.put_task(t.clone());

    let designer = ctx
        .sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Designer,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    let speedy = ctx
        .sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Speedy,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();

    assert_eq!(designer.id, speedy.id);
    assert_eq!(ctx.launcher.launch_count(), 1);

    let workers = ctx
        .sup
        .registry()
        .get_active_by_task(&TaskId::new("T1"))
        .into_iter()
        .filter(|a| a.agent_type.is_worker_class())
        .count();
    assert_eq!(workers, 1);
}

/// Different guard identities coexist on one task (issuer + worker).
#[tokio::test]
async fn issuer_and_worker_guards_are_independent() {
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
    ctx.sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();

    assert_eq!(ctx.launcher.launch_count(), 2);
}

/// Kickoff guards release their slot on every exit path, including a lost
/// claim.
#[tokio::test]
async fn kickoff_releases_slot_after_lost_claim() {
    let ctx = setup();
    let t = task("T1", TaskScope::Small);
    ctx.store.put_task(t.clone());
    ctx.store.preclaim("T1");

    ctx.sup.kickoff_new_task_pipeline(t);
    wait_until("slot release", || ctx.sup.available_worker_slots() == 4).await;
    assert_eq!(ctx.launcher.launch_count(), 0);
}
