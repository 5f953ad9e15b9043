// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::AgentId;
use crate::task::TaskId;

fn complaint() -> Complaint {
    Complaint {
        id: ComplaintId::new("c-1"),
        complainant_agent_id: AgentId::new("worker:T1:a"),
        complainant_task_id: TaskId::new("T1"),
        files: vec!["src/lib.rs".to_string()],
        reason: "file keeps changing under me".to_string(),
        frozen_agents: vec![],
        resolver_agent_id: None,
        target_agent_id: None,
        status: None,
    }
}

#[test]
fn complaint_is_open_until_status_set() {
    let mut c = complaint();
    assert!(c.is_open());
    c.status = Some(ComplaintStatus::Resolved);
    assert!(!c.is_open());
}

#[test]
fn complaint_serde_roundtrip() {
    let mut c = complaint();
    c.frozen_agents = vec![AgentId::new("worker:T2:b")];
    c.status = Some(ComplaintStatus::CircularLoser);
    let json = serde_json::to_string(&c).unwrap();
    assert!(json.contains("circular_loser"));
    let parsed: Complaint = serde_json::from_str(&json).unwrap();
    assert_eq!(c, parsed);
}
