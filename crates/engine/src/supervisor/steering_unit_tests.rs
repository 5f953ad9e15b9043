// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oms_core::ToolCallSummary;

fn msg(role: &str, content: &str) -> AgentMessage {
    AgentMessage {
        role: role.to_string(),
        content: content.to_string(),
        tool_calls: Vec::new(),
    }
}

#[test]
fn history_keeps_last_five_assistant_turns() {
    let mut messages = Vec::new();
    for i in 0..8 {
        messages.push(msg("user", &format!("u{}", i)));
        messages.push(msg("assistant", &format!("turn number {}", i)));
    }
    let summary = format_worker_history(&messages);
    assert!(!summary.contains("turn number 2"));
    assert!(summary.contains("turn number 3"));
    assert!(summary.contains("turn number 7"));
    assert_eq!(summary.matches("[turn ").count(), 5);
}

#[test]
fn history_includes_tool_calls() {
    let mut message = msg("assistant", "running tests");
    message.tool_calls.push(ToolCallSummary {
        name: "bash".to_string(),
        arguments: None,
        result: Some("32 passed\n\n0   failed".to_string()),
    });
    let summary = format_worker_history(&[message]);
    assert!(summary.contains("tool bash: 32 passed 0 failed"));
}

#[test]
fn squash_collapses_and_truncates() {
    assert_eq!(squash_whitespace("a\n\n  b\t c", 100), "a b c");
    let squashed = squash_whitespace(&"word ".repeat(100), 20);
    assert!(squashed.len() <= 24, "{}", squashed);
    assert!(squashed.ends_with('…'));
}

#[test]
fn extract_json_handles_surrounding_prose() {
    let value = extract_json("Here is my verdict:\n{\"action\": \"steer\", \"message\": \"focus\"}\nThanks").unwrap();
    assert_eq!(value["action"], "steer");

    let value = extract_json("[{\"task_id\": \"T1\", \"action\": \"none\"}]").unwrap();
    assert!(value.is_array());

    assert!(extract_json("no json here").is_none());
}

#[test]
fn steering_decision_deserializes() {
    let value = extract_json("{\"action\": \"interrupt\"}").unwrap();
    let decision: SteeringDecision = serde_json::from_value(value).unwrap();
    assert_eq!(decision.action, "interrupt");
    assert_eq!(decision.message, None);
}

#[test]
fn broadcast_decision_accepts_camel_case() {
    let value = extract_json("[{\"taskId\": \"T1\", \"action\": \"steer\", \"message\": \"m\"}]").unwrap();
    let decisions: Vec<BroadcastDecision> = serde_json::from_value(value).unwrap();
    assert_eq!(decisions[0].task_id, "T1");
}
