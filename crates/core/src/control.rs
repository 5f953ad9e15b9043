// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound control-socket messages.
//!
//! Extensions running inside child processes reach the supervisor over a
//! Unix-domain socket (`OMS_SINGULARITY_SOCK`), newline-delimited JSON, one
//! message per line, best-effort with no response channel. This is how an
//! agent's `advance_lifecycle` tool call, a merger's completion signal, and
//! file-conflict complaints arrive.

use crate::lifecycle::LifecycleInput;
use serde::{Deserialize, Serialize};

/// Messages accepted on the control socket. Unknown `type` tags fail
/// deserialization and the offending line is logged and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Urgent course-correction for whatever is running on a task
    InterruptAgent {
        task_id: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts: Option<u64>,
    },

    /// An agent's lifecycle hand-off (validated before recording)
    AdvanceLifecycle {
        #[serde(flatten)]
        input: LifecycleInput,
    },

    /// Merger finished merging a task's replica
    MergeComplete {
        task_id: String,
        #[serde(default)]
        reason: String,
    },

    /// Merger hit a conflict it could not resolve
    MergeConflict {
        task_id: String,
        #[serde(default)]
        reason: String,
    },

    /// A running agent complains about contested files
    Complain {
        agent_id: String,
        task_id: String,
        #[serde(default)]
        files: Vec<String>,
        reason: String,
    },

    /// Withdraw a previously filed complaint
    RevokeComplaint { complaint_id: String },
}

impl ControlMessage {
    /// Parse one socket line.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
