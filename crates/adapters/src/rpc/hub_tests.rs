// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[tokio::test]
async fn agent_end_resolves_registered_waiter() {
    let hub = EventHub::new();
    let rx = hub.register_end_waiter().unwrap();
    hub.dispatch(RpcEvent::AgentEnd {
        data: json!({"turn": 1}),
    });
    let data = rx.await.unwrap().unwrap();
    assert_eq!(data["turn"], 1);
}

#[tokio::test]
async fn suppression_consumes_exactly_one_agent_end() {
    let hub = EventHub::new();
    let mut events = hub.subscribe();
    hub.suppress_next_agent_end();

    let rx = hub.register_end_waiter().unwrap();

    // First end is swallowed entirely: no waiter resolution, no fan-out.
    hub.dispatch(RpcEvent::AgentEnd { data: json!({"n": 1}) });
    assert_eq!(hub.suppress_count(), 0);
    assert!(events.try_recv().is_err());

    // Second end resolves the waiter and reaches listeners.
    hub.dispatch(RpcEvent::AgentEnd { data: json!({"n": 2}) });
    let data = rx.await.unwrap().unwrap();
    assert_eq!(data["n"], 2);
    assert!(matches!(
        events.try_recv(),
        Ok(RpcEvent::AgentEnd { .. })
    ));
}

#[tokio::test]
async fn suppressions_are_fifo_one_per_event() {
    let hub = EventHub::new();
    hub.suppress_next_agent_end();
    hub.suppress_next_agent_end();

    hub.dispatch(RpcEvent::AgentEnd { data: json!({}) });
    assert_eq!(hub.suppress_count(), 1);
    hub.dispatch(RpcEvent::AgentEnd { data: json!({}) });
    assert_eq!(hub.suppress_count(), 0);

    // Third one flows through
    let rx = hub.register_end_waiter().unwrap();
    hub.dispatch(RpcEvent::AgentEnd { data: json!({}) });
    assert!(rx.await.unwrap().is_ok());
}

#[tokio::test]
async fn rpc_exit_rejects_waiters_and_blocks_new_ones() {
    let hub = EventHub::new();
    let rx = hub.register_end_waiter().unwrap();
    hub.dispatch(RpcEvent::RpcExit {
        code: Some(1),
        error: Some("boom".to_string()),
    });
    let err = rx.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("exited"), "{}", err);
    assert!(err.to_string().contains("boom"), "{}", err);

    assert!(hub.register_end_waiter().is_err());
    assert!(hub.has_exited());
}

#[tokio::test]
async fn early_agent_end_resolves_a_late_waiter() {
    let hub = EventHub::new();
    // Turn ends before anyone waits
    hub.dispatch(RpcEvent::AgentEnd { data: json!({"n": 1}) });
    let rx = hub.register_end_waiter().unwrap();
    let data = rx.await.unwrap().unwrap();
    assert_eq!(data["n"], 1);

    // Each buffered end satisfies exactly one waiter
    let rx = hub.register_end_waiter().unwrap();
    hub.dispatch(RpcEvent::AgentEnd { data: json!({"n": 2}) });
    assert_eq!(rx.await.unwrap().unwrap()["n"], 2);
}

#[tokio::test]
async fn suppression_beats_buffering() {
    let hub = EventHub::new();
    hub.suppress_next_agent_end();
    // Suppressed end is consumed, not buffered
    hub.dispatch(RpcEvent::AgentEnd { data: json!({"n": 1}) });
    let rx = hub.register_end_waiter().unwrap();
    hub.dispatch(RpcEvent::AgentEnd { data: json!({"n": 2}) });
    assert_eq!(rx.await.unwrap().unwrap()["n"], 2);
}

#[test]
fn session_id_is_captured_from_event_payloads() {
    let hub = EventHub::new();
    assert_eq!(hub.session_id(), None);
    hub.dispatch(RpcEvent::AgentEnd {
        data: json!({"sessionId": "s-9"}),
    });
    assert_eq!(hub.session_id().unwrap(), "s-9");
}

#[test]
fn session_id_is_captured_from_unknown_events() {
    let hub = EventHub::new();
    hub.dispatch(RpcEvent::from_value(
        json!({"type": "turn_start", "session_id": "s-42"}),
    ));
    assert_eq!(hub.session_id().unwrap(), "s-42");
}

#[test]
fn dead_listeners_are_pruned() {
    let hub = EventHub::new();
    let events = hub.subscribe();
    drop(events);
    // Dispatch must not fail with a closed listener
    hub.dispatch(RpcEvent::AgentEnd { data: json!({}) });
    let mut live = hub.subscribe();
    hub.dispatch(RpcEvent::AgentEnd { data: json!({}) });
    assert!(live.try_recv().is_ok());
}
