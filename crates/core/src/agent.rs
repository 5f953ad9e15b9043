// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identifiers, roles, and observable state.
//!
//! An agent is one child process running the LLM CLI under the supervisor.
//! `AgentId` (`<type>:<task>:<uniq>`) is distinct from `SessionId`, which is
//! the CLI's own conversation handle and may only be learnt lazily from RPC
//! traffic.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an agent instance.
    ///
    /// Formatted as `{type}:{task_id}:{uniq}` but opaque to consumers.
    pub struct AgentId;
}

crate::define_id! {
    /// LLM CLI session handle, used for `--resume`.
    pub struct SessionId;
}

crate::define_id! {
    /// Identifier of the agent's record in the external task store.
    pub struct StoreAgentId;
}

/// Role of an agent within the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Reads the task and decides who should work it
    Issuer,
    /// General implementation agent
    Worker,
    /// Worker variant for design-labelled tasks
    Designer,
    /// Fast single-shot agent for tiny-scope tasks
    Speedy,
    /// Verifies the work and closes or bounces the task
    Finisher,
    /// Merges a task's replica back into the project root
    Merger,
    /// Short-lived reviewer of a running worker
    Steering,
    /// The supervisor itself, acting through the control surface
    Singularity,
}

impl AgentType {
    /// Worker-class agents own a task's workspace and count against slots.
    pub fn is_worker_class(&self) -> bool {
        matches!(self, AgentType::Worker | AgentType::Designer | AgentType::Speedy)
    }

    /// Spawn-guard identity: concurrent spawns with the same identity on the
    /// same task collapse into one. Worker-class types share one identity so
    /// a designer and a worker can never coexist on a task.
    pub fn guard_identity(&self) -> Option<&'static str> {
        match self {
            AgentType::Worker | AgentType::Designer | AgentType::Speedy => Some("worker"),
            AgentType::Issuer => Some("issuer"),
            AgentType::Finisher => Some("finisher"),
            AgentType::Merger => Some("merger"),
            AgentType::Steering | AgentType::Singularity => None,
        }
    }

    /// Whether this type participates in the `advance_lifecycle` contract.
    pub fn has_lifecycle(&self) -> bool {
        !matches!(
            self,
            AgentType::Merger | AgentType::Steering | AgentType::Singularity
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Issuer => "issuer",
            AgentType::Worker => "worker",
            AgentType::Designer => "designer",
            AgentType::Speedy => "speedy",
            AgentType::Finisher => "finisher",
            AgentType::Merger => "merger",
            AgentType::Steering => "steering",
            AgentType::Singularity => "singularity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "issuer" => Some(AgentType::Issuer),
            "worker" => Some(AgentType::Worker),
            "designer" => Some(AgentType::Designer),
            "speedy" => Some(AgentType::Speedy),
            "finisher" => Some(AgentType::Finisher),
            "merger" => Some(AgentType::Merger),
            "steering" => Some(AgentType::Steering),
            "singularity" => Some(AgentType::Singularity),
            _ => None,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable status of an agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Child process is being launched
    Spawning,
    /// Prompt delivered, agent is working
    Working,
    /// Completed its lifecycle hand-off
    Done,
    /// Spawn or RPC failure
    Failed,
    /// Aborted by the supervisor
    Aborted,
    /// Stopped externally (user stop / replacement)
    Stopped,
    /// Exited without completing its hand-off
    Dead,
}

impl AgentStatus {
    /// An agent is active iff its status is non-terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Done
                | AgentStatus::Failed
                | AgentStatus::Aborted
                | AgentStatus::Stopped
                | AgentStatus::Dead
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Spawning => "spawning",
            AgentStatus::Working => "working",
            AgentStatus::Done => "done",
            AgentStatus::Failed => "failed",
            AgentStatus::Aborted => "aborted",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requested reasoning effort for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingLevel {
    Off,
    Low,
    #[default]
    Medium,
    High,
}

impl ThinkingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingLevel::Off => "off",
            ThinkingLevel::Low => "low",
            ThinkingLevel::Medium => "medium",
            ThinkingLevel::High => "high",
        }
    }
}

impl fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token/cost counters accumulated from `message_end` events.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

impl AgentUsage {
    pub fn add(&mut self, other: &AgentUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost_usd += other.cost_usd;
    }
}

/// One entry in an agent's bounded event ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub ts_ms: u64,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AgentEvent {
    pub fn new(ts_ms: u64, kind: impl Into<String>) -> Self {
        Self {
            ts_ms,
            kind: kind.into(),
            detail: None,
        }
    }

    pub fn with_detail(ts_ms: u64, kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            ts_ms,
            kind: kind.into(),
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
