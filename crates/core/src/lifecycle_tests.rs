// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::AgentType;
use yare::parameterized;

fn input(agent_type: &str, action: &str, target: Option<&str>) -> LifecycleInput {
    LifecycleInput {
        agent_type: agent_type.to_string(),
        task_id: "T1".to_string(),
        action: action.to_string(),
        target: target.map(str::to_string),
        message: Some("do it".to_string()),
        reason: Some("ready".to_string()),
        agent_id: Some("issuer:T1:1".to_string()),
    }
}

#[parameterized(
    issuer_to_worker = { "issuer", "advance", "worker" },
    issuer_to_designer = { "issuer", "advance", "designer" },
    worker_to_finisher = { "worker", "advance", "finisher" },
    designer_to_finisher = { "designer", "advance", "finisher" },
    speedy_to_issuer = { "speedy", "advance", "issuer" },
    speedy_to_finisher = { "speedy", "advance", "finisher" },
    finisher_to_worker = { "finisher", "advance", "worker" },
    finisher_to_issuer = { "finisher", "advance", "issuer" },
)]
fn advance_with_allowed_target_is_recorded(agent: &str, action: &str, target: &str) {
    let record = input(agent, action, Some(target)).validate(42).unwrap();
    assert_eq!(record.action, LifecycleAction::Advance);
    assert_eq!(record.target, AgentType::parse(target));
    assert_eq!(record.task_id, "T1");
    assert_eq!(record.ts_ms, 42);
}

#[parameterized(
    issuer_to_finisher = { "issuer", "finisher" },
    issuer_to_merger = { "issuer", "merger" },
    worker_to_worker = { "worker", "worker" },
    finisher_to_speedy = { "finisher", "speedy" },
)]
fn advance_with_disallowed_target_is_rejected(agent: &str, target: &str) {
    let err = input(agent, "advance", Some(target)).validate(0).unwrap_err();
    assert!(err.summary.contains("may not advance"), "{}", err.summary);
}

#[test]
fn advance_without_target_is_rejected() {
    let err = input("issuer", "advance", None).validate(0).unwrap_err();
    assert!(err.summary.contains("requires a target"), "{}", err.summary);
}

#[parameterized(
    worker_close = { "worker", "close" },
    designer_close = { "designer", "close" },
    merger_anything = { "merger", "close" },
    steering_anything = { "steering", "advance" },
    singularity_anything = { "singularity", "block" },
)]
fn disallowed_actions_are_rejected(agent: &str, action: &str) {
    let err = input(agent, action, Some("finisher")).validate(0).unwrap_err();
    assert!(err.summary.contains("may not record"), "{}", err.summary);
}

#[test]
fn close_and_block_drop_any_target() {
    let record = input("finisher", "close", Some("worker")).validate(0).unwrap();
    assert_eq!(record.action, LifecycleAction::Close);
    assert_eq!(record.target, None);

    let record = input("speedy", "block", Some("issuer")).validate(0).unwrap();
    assert_eq!(record.action, LifecycleAction::Block);
    assert_eq!(record.target, None);
}

#[test]
fn unknown_agent_type_is_rejected_not_coerced() {
    let err = input("reviewer", "close", None).validate(0).unwrap_err();
    assert!(err.summary.contains("unknown agent_type"), "{}", err.summary);
}

#[test]
fn unknown_action_is_rejected_not_coerced() {
    let err = input("issuer", "finish", None).validate(0).unwrap_err();
    assert!(err.summary.contains("unknown action"), "{}", err.summary);
}

#[test]
fn empty_task_id_is_rejected() {
    let mut bad = input("issuer", "close", None);
    bad.task_id = "  ".to_string();
    let err = bad.validate(0).unwrap_err();
    assert!(err.summary.contains("task_id"), "{}", err.summary);
}

#[test]
fn empty_message_and_reason_become_none() {
    let mut raw = input("issuer", "close", None);
    raw.message = Some(String::new());
    raw.reason = None;
    let record = raw.validate(0).unwrap();
    assert_eq!(record.message, None);
    assert_eq!(record.reason, None);
}

#[test]
fn record_serde_roundtrip() {
    let record = input("issuer", "advance", Some("worker")).validate(7).unwrap();
    let json = serde_json::to_string(&record).unwrap();
    let parsed: LifecycleRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(record, parsed);
}

#[test]
fn capability_table_matches_contract() {
    assert_eq!(
        allowed_actions(AgentType::Issuer),
        &[
            LifecycleAction::Advance,
            LifecycleAction::Close,
            LifecycleAction::Block
        ]
    );
    assert_eq!(
        allowed_actions(AgentType::Worker),
        &[LifecycleAction::Block, LifecycleAction::Advance]
    );
    assert!(allowed_actions(AgentType::Merger).is_empty());
    assert!(allowed_targets(AgentType::Singularity).is_empty());
}
