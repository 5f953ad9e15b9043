// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    issuer = { AgentType::Issuer, "issuer" },
    worker = { AgentType::Worker, "worker" },
    designer = { AgentType::Designer, "designer" },
    speedy = { AgentType::Speedy, "speedy" },
    finisher = { AgentType::Finisher, "finisher" },
    merger = { AgentType::Merger, "merger" },
    steering = { AgentType::Steering, "steering" },
    singularity = { AgentType::Singularity, "singularity" },
)]
fn agent_type_round_trips_through_str(t: AgentType, s: &str) {
    assert_eq!(t.as_str(), s);
    assert_eq!(AgentType::parse(s), Some(t));
    assert_eq!(t.to_string(), s);
}

#[test]
fn agent_type_parse_rejects_unknown() {
    assert_eq!(AgentType::parse("reviewer"), None);
    assert_eq!(AgentType::parse(""), None);
}

#[test]
fn worker_class_membership() {
    assert!(AgentType::Worker.is_worker_class());
    assert!(AgentType::Designer.is_worker_class());
    assert!(AgentType::Speedy.is_worker_class());
    assert!(!AgentType::Issuer.is_worker_class());
    assert!(!AgentType::Finisher.is_worker_class());
}

#[test]
fn worker_class_shares_guard_identity() {
    assert_eq!(AgentType::Worker.guard_identity(), Some("worker"));
    assert_eq!(AgentType::Designer.guard_identity(), Some("worker"));
    assert_eq!(AgentType::Speedy.guard_identity(), Some("worker"));
    assert_eq!(AgentType::Steering.guard_identity(), None);
}

#[test]
fn lifecycle_participation() {
    assert!(AgentType::Issuer.has_lifecycle());
    assert!(AgentType::Finisher.has_lifecycle());
    assert!(!AgentType::Merger.has_lifecycle());
    assert!(!AgentType::Steering.has_lifecycle());
    assert!(!AgentType::Singularity.has_lifecycle());
}

#[parameterized(
    spawning = { AgentStatus::Spawning, false },
    working = { AgentStatus::Working, false },
    done = { AgentStatus::Done, true },
    failed = { AgentStatus::Failed, true },
    aborted = { AgentStatus::Aborted, true },
    stopped = { AgentStatus::Stopped, true },
    dead = { AgentStatus::Dead, true },
)]
fn status_terminality(status: AgentStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn agent_status_serde_is_snake_case() {
    let json = serde_json::to_string(&AgentStatus::Spawning).unwrap();
    assert_eq!(json, "\"spawning\"");
}

#[test]
fn usage_accumulates() {
    let mut usage = AgentUsage::default();
    usage.add(&AgentUsage {
        input_tokens: 100,
        output_tokens: 20,
        cost_usd: 0.5,
    });
    usage.add(&AgentUsage {
        input_tokens: 1,
        output_tokens: 2,
        cost_usd: 0.25,
    });
    assert_eq!(usage.input_tokens, 101);
    assert_eq!(usage.output_tokens, 22);
    assert!((usage.cost_usd - 0.75).abs() < f64::EPSILON);
}

#[test]
fn agent_event_detail_is_optional_in_json() {
    let event = AgentEvent::new(1, "agent_end");
    let json = serde_json::to_string(&event).unwrap();
    assert!(!json.contains("detail"));

    let event = AgentEvent::with_detail(2, "rpc_exit", "code=1");
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("code=1"));
}
