// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oms_core::AgentType;
use yare::parameterized;

#[test]
fn worker_class_creates_replicas() {
    assert_eq!(
        AgentProfile::for_type(AgentType::Worker).replica,
        ReplicaStrategy::Create
    );
    assert_eq!(
        AgentProfile::for_type(AgentType::Designer).replica,
        ReplicaStrategy::Create
    );
    assert_eq!(
        AgentProfile::for_type(AgentType::Speedy).replica,
        ReplicaStrategy::Create
    );
}

#[test]
fn finisher_resolves_existing_replica() {
    assert_eq!(
        AgentProfile::for_type(AgentType::Finisher).replica,
        ReplicaStrategy::Resolve
    );
}

#[test]
fn read_only_types_strip_bash() {
    for agent_type in [AgentType::Issuer, AgentType::Steering] {
        let profile = AgentProfile::for_type(agent_type);
        assert!(profile.strip_bash, "{} should strip bash", agent_type);
        assert!(!profile.tools.contains(&"bash"));
    }
}

#[test]
fn lifecycle_types_load_the_lifecycle_extension() {
    for agent_type in [
        AgentType::Issuer,
        AgentType::Worker,
        AgentType::Designer,
        AgentType::Speedy,
        AgentType::Finisher,
    ] {
        let profile = AgentProfile::for_type(agent_type);
        assert!(
            profile.extensions.contains(&"lifecycle"),
            "{} is missing the lifecycle extension",
            agent_type
        );
    }
}

#[test]
fn extension_table_is_closed() {
    assert!(extension_file("lifecycle").is_some());
    assert!(extension_file("tasks").is_some());
    assert!(extension_file("merger").is_some());
    assert!(extension_file("nope").is_none());
}

#[parameterized(
    design = { &["design"], AgentType::Designer },
    ui = { &["frontend-ui"], AgentType::Designer },
    figma = { &["Figma-import"], AgentType::Designer },
    brand = { &["brand"], AgentType::Designer },
    backend = { &["backend", "db"], AgentType::Worker },
    empty = { &[], AgentType::Worker },
)]
fn label_rules_pick_worker_type(labels: &[&str], expected: AgentType) {
    let labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
    assert_eq!(worker_type_for_labels(&labels), expected);
}
