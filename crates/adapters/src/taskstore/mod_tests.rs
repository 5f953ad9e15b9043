// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn agent_state_update_omits_empty_fields() {
    let update = AgentStateUpdate::state("working");
    let json = serde_json::to_string(&update).unwrap();
    assert_eq!(json, r#"{"state":"working"}"#);
}

#[test]
fn agent_state_update_with_usage_roundtrips() {
    let update = AgentStateUpdate {
        state: "working".to_string(),
        usage: Some(AgentUsage {
            input_tokens: 5,
            output_tokens: 1,
            cost_usd: 0.0,
        }),
        last_activity_ms: Some(99),
    };
    let json = serde_json::to_string(&update).unwrap();
    let parsed: AgentStateUpdate = serde_json::from_str(&json).unwrap();
    assert_eq!(update, parsed);
}

#[test]
fn store_errors_render_context() {
    let err = TaskStoreError::NotFound(TaskId::new("T7"));
    assert_eq!(err.to_string(), "task not found: T7");
    let err = TaskStoreError::CallFailed("tasks show T7 exited with Some(1)".to_string());
    assert!(err.to_string().contains("call failed"));
}
