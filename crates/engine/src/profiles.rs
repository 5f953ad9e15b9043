// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative per-type spawn configuration.
//!
//! Agent prompts and extension contents are opaque to the supervisor; this
//! table only names which extension files each type loads, which tools it
//! may use, and how its workspace is resolved.

use crate::timeouts;
use oms_core::{AgentType, ThinkingLevel};
use std::time::Duration;

/// How an agent's working directory is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaStrategy {
    /// Create (or reuse) the task's replica; cwd is its working view
    Create,
    /// Reuse an existing worker replica if present, else the project root
    Resolve,
    /// Work directly in the project root
    None,
}

/// Static spawn configuration for one agent type.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub agent_type: AgentType,
    /// Tool allowlist passed as `--tools`
    pub tools: &'static [&'static str],
    /// Whether `bash` is stripped from the default tool set
    pub strip_bash: bool,
    /// Extension keys, resolved to files via [`extension_file`]
    pub extensions: &'static [&'static str],
    pub replica: ReplicaStrategy,
    pub model: Option<&'static str>,
    pub thinking: ThinkingLevel,
    /// How long the pipeline waits for this agent's turn to end
    pub end_wait: Duration,
    /// Optional custom system-prompt file name
    pub prompt_file: Option<&'static str>,
}

impl AgentProfile {
    pub fn for_type(agent_type: AgentType) -> Self {
        match agent_type {
            AgentType::Issuer => Self {
                agent_type,
                tools: &["read", "grep", "glob", "tasks"],
                strip_bash: true,
                extensions: &["tasks", "lifecycle"],
                replica: ReplicaStrategy::None,
                model: None,
                thinking: ThinkingLevel::Medium,
                end_wait: timeouts::PIPELINE_END_WAIT,
                prompt_file: Some("issuer.md"),
            },
            AgentType::Worker => Self {
                agent_type,
                tools: &["read", "write", "edit", "bash", "grep", "glob", "tasks"],
                strip_bash: false,
                extensions: &["tasks", "lifecycle", "complaint"],
                replica: ReplicaStrategy::Create,
                model: None,
                thinking: ThinkingLevel::Medium,
                end_wait: timeouts::PIPELINE_END_WAIT,
                prompt_file: Some("worker.md"),
            },
            AgentType::Designer => Self {
                agent_type,
                tools: &["read", "write", "edit", "bash", "grep", "glob", "tasks"],
                strip_bash: false,
                extensions: &["tasks", "lifecycle", "complaint"],
                replica: ReplicaStrategy::Create,
                model: None,
                thinking: ThinkingLevel::Medium,
                end_wait: timeouts::PIPELINE_END_WAIT,
                prompt_file: Some("designer.md"),
            },
            AgentType::Speedy => Self {
                agent_type,
                tools: &["read", "write", "edit", "bash", "grep", "glob", "tasks"],
                strip_bash: false,
                extensions: &["tasks", "lifecycle"],
                replica: ReplicaStrategy::Create,
                model: Some("fast"),
                thinking: ThinkingLevel::Low,
                end_wait: timeouts::PIPELINE_END_WAIT,
                prompt_file: Some("speedy.md"),
            },
            AgentType::Finisher => Self {
                agent_type,
                tools: &["read", "write", "edit", "bash", "grep", "glob", "tasks"],
                strip_bash: false,
                extensions: &["tasks", "lifecycle"],
                replica: ReplicaStrategy::Resolve,
                model: None,
                thinking: ThinkingLevel::Medium,
                end_wait: timeouts::PIPELINE_END_WAIT,
                prompt_file: Some("finisher.md"),
            },
            AgentType::Merger => Self {
                agent_type,
                tools: &["read", "write", "edit", "bash", "grep", "glob"],
                strip_bash: false,
                extensions: &["merger"],
                replica: ReplicaStrategy::None,
                model: None,
                thinking: ThinkingLevel::Low,
                end_wait: timeouts::PIPELINE_END_WAIT,
                prompt_file: Some("merger.md"),
            },
            AgentType::Steering => Self {
                agent_type,
                tools: &["read", "grep"],
                strip_bash: true,
                extensions: &[],
                replica: ReplicaStrategy::None,
                model: Some("fast"),
                thinking: ThinkingLevel::Low,
                end_wait: timeouts::STEERING_END_WAIT,
                prompt_file: Some("steering.md"),
            },
            AgentType::Singularity => Self {
                agent_type,
                tools: &[],
                strip_bash: true,
                extensions: &[],
                replica: ReplicaStrategy::None,
                model: None,
                thinking: ThinkingLevel::Medium,
                end_wait: timeouts::PIPELINE_END_WAIT,
                prompt_file: None,
            },
        }
    }
}

/// Fixed table mapping extension keys to their file names.
pub fn extension_file(key: &str) -> Option<&'static str> {
    match key {
        "tasks" => Some("tasks-extension.js"),
        "lifecycle" => Some("lifecycle-extension.js"),
        "complaint" => Some("complaint-extension.js"),
        "merger" => Some("merger-extension.js"),
        _ => None,
    }
}

/// Label rules mapping a task to a worker type when the issuer does not
/// name a target.
pub fn worker_type_for_labels(labels: &[String]) -> AgentType {
    const DESIGN_MARKERS: &[&str] = &["design", "ui", "ux", "figma", "visual", "brand"];
    for label in labels {
        let lower = label.to_lowercase();
        if DESIGN_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return AgentType::Designer;
        }
    }
    AgentType::Worker
}

#[cfg(test)]
#[path = "profiles_tests.rs"]
mod tests;
