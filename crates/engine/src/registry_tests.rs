// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oms_adapters::FakeRpc;
use oms_core::AgentEvent;

fn record(id: &str, agent_type: AgentType, task: Option<&str>) -> Arc<AgentRecord> {
    AgentRecord::new(
        AgentId::new(id),
        agent_type,
        task.map(TaskId::new),
        Some(StoreAgentId::new(format!("sa-{}", id))),
        FakeRpc::new(id),
        None,
        None,
        ThinkingLevel::Medium,
    )
}

#[test]
fn register_get_remove() {
    let registry = AgentRegistry::new();
    let worker = record("worker:T1:a", AgentType::Worker, Some("T1"));
    registry.register(Arc::clone(&worker));

    assert!(registry.get(&worker.id).is_some());
    assert_eq!(registry.get_all().len(), 1);

    worker.set_status(AgentStatus::Done);
    registry.remove(&worker.id);
    assert!(registry.get(&worker.id).is_none());
}

#[test]
fn active_filters_terminal_statuses() {
    let registry = AgentRegistry::new();
    let live = record("worker:T1:a", AgentType::Worker, Some("T1"));
    let dead = record("issuer:T1:b", AgentType::Issuer, Some("T1"));
    dead.set_status(AgentStatus::Dead);
    registry.register(live);
    registry.register(dead);

    assert_eq!(registry.get_active().len(), 1);
    assert_eq!(registry.get_by_task(&TaskId::new("T1")).len(), 2);
    assert_eq!(registry.get_active_by_task(&TaskId::new("T1")).len(), 1);
}

#[test]
fn worker_counts_cover_worker_class_only() {
    let registry = AgentRegistry::new();
    registry.register(record("worker:T1:a", AgentType::Worker, Some("T1")));
    registry.register(record("speedy:T2:b", AgentType::Speedy, Some("T2")));
    registry.register(record("designer:T3:c", AgentType::Designer, Some("T3")));
    registry.register(record("issuer:T4:d", AgentType::Issuer, Some("T4")));
    registry.register(record("finisher:T5:e", AgentType::Finisher, Some("T5")));

    assert_eq!(registry.active_worker_count(), 3);
    assert!(registry
        .active_worker_for_task(&TaskId::new("T2"))
        .is_some());
    assert!(registry
        .active_worker_for_task(&TaskId::new("T4"))
        .is_none());
}

#[test]
fn guard_lookup_collapses_worker_class() {
    let registry = AgentRegistry::new();
    registry.register(record("designer:T1:a", AgentType::Designer, Some("T1")));

    // A designer occupies the shared "worker" guard identity
    assert!(registry.active_by_guard("worker", &TaskId::new("T1")).is_some());
    assert!(registry.active_by_guard("issuer", &TaskId::new("T1")).is_none());
    assert!(registry.active_by_guard("worker", &TaskId::new("T2")).is_none());
}

#[test]
fn transition_if_active_respects_terminal_states() {
    let worker = record("worker:T1:a", AgentType::Worker, Some("T1"));
    assert!(worker.transition_if_active(AgentStatus::Stopped));
    // A late handler cannot resurrect or re-finalize the agent
    assert!(!worker.transition_if_active(AgentStatus::Dead));
    assert_eq!(worker.status(), AgentStatus::Stopped);
}

#[test]
fn event_ring_is_bounded() {
    let worker = record("worker:T1:a", AgentType::Worker, Some("T1"));
    for i in 0..(EVENT_RING_CAPACITY + 10) {
        worker.push_event(AgentEvent::new(i as u64, "message_end"));
    }
    let events = worker.events();
    assert_eq!(events.len(), EVENT_RING_CAPACITY);
    // Oldest entries were dropped
    assert_eq!(events[0].ts_ms, 10);
}

#[test]
fn summaries_are_sorted_and_active_only() {
    let registry = AgentRegistry::new();
    registry.register(record("worker:T2:b", AgentType::Worker, Some("T2")));
    registry.register(record("worker:T1:a", AgentType::Worker, Some("T1")));
    let done = record("worker:T3:c", AgentType::Worker, Some("T3"));
    done.set_status(AgentStatus::Done);
    registry.register(done);

    let summaries = registry.active_summaries();
    assert_eq!(summaries.len(), 2);
    assert!(summaries[0].id < summaries[1].id);
}

#[tokio::test]
async fn heartbeat_flush_pushes_final_state() {
    let registry = AgentRegistry::new();
    let store = Arc::new(oms_adapters::FakeTaskStore::new());
    let worker = record("worker:T1:a", AgentType::Worker, Some("T1"));
    worker.set_status(AgentStatus::Working);
    registry.register(worker);

    registry.stop_heartbeat(Arc::clone(&store)).await;

    let pushed: Vec<_> = store
        .calls()
        .into_iter()
        .filter(|c| matches!(c, oms_adapters::StoreCall::SetAgentState(_, state) if state == "working"))
        .collect();
    assert_eq!(pushed.len(), 1);
}
