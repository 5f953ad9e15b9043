// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-agent file-conflict complaints.

use crate::agent::AgentId;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Identifier of a filed complaint.
    pub struct ComplaintId;
}

/// Terminal outcome of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    /// A conflicting agent was identified and steered to yield
    Resolved,
    /// The resolver could not name a conflicting agent
    Unidentified,
    /// Two agents complained about each other; this complainant lost
    CircularLoser,
    /// Resolution itself failed
    Error,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Unidentified => "unidentified",
            ComplaintStatus::CircularLoser => "circular_loser",
            ComplaintStatus::Error => "error",
        }
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One complaint filed by a running agent about contested files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub complainant_agent_id: AgentId,
    pub complainant_task_id: TaskId,
    pub files: Vec<String>,
    pub reason: String,
    /// Agents frozen while the complaint is open
    #[serde(default)]
    pub frozen_agents: Vec<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver_agent_id: Option<AgentId>,
    /// The agent the resolver identified as conflicting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ComplaintStatus>,
}

impl Complaint {
    pub fn is_open(&self) -> bool {
        self.status.is_none()
    }
}

#[cfg(test)]
#[path = "complaint_tests.rs"]
mod tests;
