// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `advance_lifecycle` contract.
//!
//! Agents hand off execution exactly once, by calling the `advance_lifecycle`
//! tool before they exit. The raw tool payload is validated here against a
//! closed per-type capability table; anything outside the table is rejected
//! with a structured summary and nothing is recorded.

use crate::agent::{AgentId, AgentType};
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an agent asks the pipeline to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Hand the task to the next stage named in `target`
    Advance,
    /// Close the task
    Close,
    /// Block the task for human attention
    Block,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Advance => "advance",
            LifecycleAction::Close => "close",
            LifecycleAction::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "advance" => Some(LifecycleAction::Advance),
            "close" => Some(LifecycleAction::Close),
            "block" => Some(LifecycleAction::Block),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Actions each agent type may take.
pub fn allowed_actions(agent_type: AgentType) -> &'static [LifecycleAction] {
    use LifecycleAction::*;
    match agent_type {
        AgentType::Issuer => &[Advance, Close, Block],
        AgentType::Worker | AgentType::Designer => &[Block, Advance],
        AgentType::Speedy => &[Close, Block, Advance],
        AgentType::Finisher => &[Close, Block, Advance],
        AgentType::Merger | AgentType::Steering | AgentType::Singularity => &[],
    }
}

/// Advance targets each agent type may name.
pub fn allowed_targets(agent_type: AgentType) -> &'static [AgentType] {
    use AgentType::*;
    match agent_type {
        Issuer => &[Worker, Designer],
        Worker | Designer => &[Finisher],
        Speedy => &[Issuer, Finisher],
        Finisher => &[Worker, Issuer],
        Merger | Steering | Singularity => &[],
    }
}

/// A validated lifecycle hand-off, recorded at most once per task and
/// consumed exactly once by the pipeline after the emitting agent exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub task_id: TaskId,
    pub agent_type: AgentType,
    pub action: LifecycleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<AgentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub ts_ms: u64,
}

/// Raw `advance_lifecycle` tool payload, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleInput {
    pub agent_type: String,
    pub task_id: String,
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Structured rejection of an invalid `advance_lifecycle` call.
///
/// Serialized back to the calling agent as `{ok: false, summary}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{summary}")]
pub struct LifecycleRejection {
    pub summary: String,
}

impl LifecycleRejection {
    fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

impl LifecycleInput {
    /// Validate against the capability table, producing a record to store.
    ///
    /// Unknown agent types, unknown actions, and disallowed targets are all
    /// rejected; no coercion is attempted.
    pub fn validate(&self, ts_ms: u64) -> Result<LifecycleRecord, LifecycleRejection> {
        if self.task_id.trim().is_empty() {
            return Err(LifecycleRejection::new("advance_lifecycle requires a task_id"));
        }

        let agent_type = AgentType::parse(&self.agent_type).ok_or_else(|| {
            LifecycleRejection::new(format!("unknown agent_type '{}'", self.agent_type))
        })?;

        let action = LifecycleAction::parse(&self.action).ok_or_else(|| {
            LifecycleRejection::new(format!(
                "unknown action '{}' (expected advance, close, or block)",
                self.action
            ))
        })?;

        if !allowed_actions(agent_type).contains(&action) {
            return Err(LifecycleRejection::new(format!(
                "{} agents may not record action '{}'",
                agent_type, action
            )));
        }

        let target = match action {
            LifecycleAction::Advance => {
                let raw = self.target.as_deref().ok_or_else(|| {
                    LifecycleRejection::new(format!(
                        "{} advance requires a target (one of: {})",
                        agent_type,
                        target_list(agent_type)
                    ))
                })?;
                let target = AgentType::parse(raw).ok_or_else(|| {
                    LifecycleRejection::new(format!("unknown advance target '{}'", raw))
                })?;
                if !allowed_targets(agent_type).contains(&target) {
                    return Err(LifecycleRejection::new(format!(
                        "{} may not advance to {} (allowed: {})",
                        agent_type,
                        target,
                        target_list(agent_type)
                    )));
                }
                Some(target)
            }
            // A target on close/block is meaningless; drop it rather than record it.
            LifecycleAction::Close | LifecycleAction::Block => None,
        };

        Ok(LifecycleRecord {
            task_id: TaskId::new(&self.task_id),
            agent_type,
            action,
            target,
            message: self.message.clone().filter(|m| !m.is_empty()),
            reason: self.reason.clone().filter(|r| !r.is_empty()),
            agent_id: self.agent_id.as_deref().map(AgentId::new),
            ts_ms,
        })
    }
}

fn target_list(agent_type: AgentType) -> String {
    allowed_targets(agent_type)
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
