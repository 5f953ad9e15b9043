// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Complaints: freeze, resolve, circular pairs, revoke.

use super::*;
use oms_core::{AgentId, AgentType, ComplaintStatus, TaskId};
use serde_json::json;

async fn spawn_worker_on(ctx: &TestContext, id: &str) -> (AgentId, std::sync::Arc<oms_adapters::FakeRpc>) {
    let t = in_progress_task(id);
    ctx.store.put_task(t.clone());
    let record = ctx
        .sup
        .spawn_agent(SpawnRequest::for_task(
            AgentType::Worker,
            &t,
            PromptSource::Task { extra: None },
        ))
        .await
        .unwrap();
    let index = ctx.launcher.launch_count() - 1;
    let rpc = ctx.launcher.nth_launch(index).await.1;
    (record.id.clone(), rpc)
}

#[tokio::test]
async fn complaint_freezes_others_and_steers_the_identified_target() {
    let ctx = setup();
    let (complainant, _complainant_rpc) = spawn_worker_on(&ctx, "T1").await;
    let (conflicting, conflicting_rpc) = spawn_worker_on(&ctx, "T2").await;

    let id = ctx
        .sup
        .complain(
            complainant.clone(),
            TaskId::new("T1"),
            vec!["src/shared.rs".to_string()],
            "file keeps changing under me".to_string(),
        )
        .await;

    // The other worker was frozen with a hold steer.
    conflicting_rpc.wait_for_command("steer").await;

    // Resolver agent names the conflicting worker.
    let (resolver_spec, resolver_rpc) = nth_launch(&ctx, 2).await;
    assert!(resolver_spec.label.starts_with("steering:T1:"), "{}", resolver_spec.label);
    resolver_rpc.push_response(
        "get_last_assistant_text",
        Ok(Some(json!({"text": format!("{{\"conflicting_agent_id\": \"{}\"}}", conflicting)}))),
    );
    resolver_rpc.end_turn();

    wait_until("resolution", || {
        ctx.sup
            .complaints
            .lock()
            .get(&id)
            .and_then(|c| c.status)
            == Some(ComplaintStatus::Resolved)
    })
    .await;

    let complaint = ctx.sup.complaints.lock().get(&id).cloned().unwrap();
    assert_eq!(complaint.target_agent_id, Some(conflicting));
    // Frozen agents got a yield + unfreeze pair of steers
    wait_until("unfreeze steer", || conflicting_rpc.count_command("steer") >= 2).await;
}

#[tokio::test]
async fn unidentified_resolution_settles_without_a_target() {
    let ctx = setup();
    let (complainant, _rpc) = spawn_worker_on(&ctx, "T1").await;

    let id = ctx
        .sup
        .complain(
            complainant,
            TaskId::new("T1"),
            vec!["README.md".to_string()],
            "ghost edits".to_string(),
        )
        .await;

    let (_spec, resolver_rpc) = nth_launch(&ctx, 1).await;
    resolver_rpc.push_response(
        "get_last_assistant_text",
        Ok(Some(json!({"text": "{\"unidentified\": true}"}))),
    );
    resolver_rpc.end_turn();

    wait_until("settled", || {
        ctx.sup.complaints.lock().get(&id).and_then(|c| c.status)
            == Some(ComplaintStatus::Unidentified)
    })
    .await;
}

/// Two complaints pointing at each other: the later complainant loses.
#[tokio::test]
async fn circular_complaints_settle_against_the_later_complainant() {
    let ctx = setup();
    let (agent_a, _rpc_a) = spawn_worker_on(&ctx, "T1").await;
    let (agent_b, _rpc_b) = spawn_worker_on(&ctx, "T2").await;

    // A's complaint is open (its resolver never answers).
    let first = ctx
        .sup
        .complain(
            agent_a.clone(),
            TaskId::new("T1"),
            vec!["src/x.rs".to_string()],
            "conflict".to_string(),
        )
        .await;

    // B complains back; B's resolver names A.
    let second = ctx
        .sup
        .complain(
            agent_b,
            TaskId::new("T2"),
            vec!["src/x.rs".to_string()],
            "counter-conflict".to_string(),
        )
        .await;

    // Resolvers spawn asynchronously; find the one reviewing B's complaint.
    wait_until("second resolver", || {
        ctx.launcher
            .launches()
            .iter()
            .any(|(spec, _)| spec.label.starts_with("steering:T2:"))
    })
    .await;
    let resolver_rpc = ctx
        .launcher
        .launches()
        .into_iter()
        .find(|(spec, _)| spec.label.starts_with("steering:T2:"))
        .map(|(_, rpc)| rpc)
        .unwrap();
    resolver_rpc.push_response(
        "get_last_assistant_text",
        Ok(Some(json!({"text": format!("{{\"conflicting_agent_id\": \"{}\"}}", agent_a)}))),
    );
    resolver_rpc.end_turn();

    wait_until("circular settle", || {
        ctx.sup.complaints.lock().get(&second).and_then(|c| c.status)
            == Some(ComplaintStatus::CircularLoser)
    })
    .await;
    // The earlier complaint is untouched.
    assert!(ctx.sup.complaints.lock().get(&first).map(|c| c.is_open()).unwrap_or(false));
}

#[tokio::test]
async fn revoke_unfreezes_and_drops_the_record() {
    let ctx = setup();
    let (complainant, _rpc) = spawn_worker_on(&ctx, "T1").await;
    let (_other, other_rpc) = spawn_worker_on(&ctx, "T2").await;

    let id = ctx
        .sup
        .complain(
            complainant,
            TaskId::new("T1"),
            vec!["src/y.rs".to_string()],
            "noise".to_string(),
        )
        .await;
    other_rpc.wait_for_command("steer").await;

    ctx.sup.revoke_complaint(&id).await;
    assert!(ctx.sup.complaints.lock().get(&id).is_none());
    wait_until("resume steer", || other_rpc.count_command("steer") >= 2).await;
}
