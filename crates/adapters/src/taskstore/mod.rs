// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client interface to the external task store.
//!
//! The store itself (CRUD over issues, comments, status, slots, per-agent
//! state) is another program. The supervisor consumes this narrow interface
//! and treats call failures as transient: logged, never fatal.

mod command;

pub use command::{CommandTaskStore, CommandTaskStoreConfig};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTaskStore, StoreCall};

use async_trait::async_trait;
use oms_core::{AgentId, AgentType, AgentUsage, StoreAgentId, TaskId, TaskRef, TaskStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from task-store calls.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task store call failed: {0}")]
    CallFailed(String),

    #[error("task store returned invalid data: {0}")]
    InvalidData(String),
}

/// Observable agent state pushed to the store (heartbeat and transitions).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentStateUpdate {
    /// Free-form state label ("spawning", "working", "failed", ...)
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<AgentUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_ms: Option<u64>,
}

impl AgentStateUpdate {
    pub fn state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            usage: None,
            last_activity_ms: None,
        }
    }
}

/// Narrow interface over the external task store.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Probe that the store is reachable.
    async fn ready(&self) -> Result<(), TaskStoreError>;

    /// Create a task; returns the stored reference.
    async fn create(&self, title: &str, description: &str) -> Result<TaskRef, TaskStoreError>;

    async fn show(&self, id: &TaskId) -> Result<TaskRef, TaskStoreError>;

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), TaskStoreError>;

    async fn comment(&self, id: &TaskId, text: &str) -> Result<(), TaskStoreError>;

    async fn close(&self, id: &TaskId, reason: &str) -> Result<(), TaskStoreError>;

    /// Adopt ownership of a task (errors if already owned elsewhere).
    async fn claim(&self, id: &TaskId) -> Result<(), TaskStoreError>;

    /// Attempt to claim; `false` means someone else won the race.
    async fn try_claim(&self, id: &TaskId) -> Result<bool, TaskStoreError>;

    /// Create the store-side record for a live agent.
    async fn create_agent(
        &self,
        agent_id: &AgentId,
        agent_type: AgentType,
        task_id: Option<&TaskId>,
    ) -> Result<StoreAgentId, TaskStoreError>;

    async fn set_agent_state(
        &self,
        store_agent_id: &StoreAgentId,
        update: AgentStateUpdate,
    ) -> Result<(), TaskStoreError>;

    /// Mark a named slot on a task (e.g. the callback handler).
    async fn set_slot(&self, id: &TaskId, slot: &str, value: &str) -> Result<(), TaskStoreError>;

    async fn clear_slot(&self, id: &TaskId, slot: &str) -> Result<(), TaskStoreError>;

    /// Root directory of the store's own files.
    fn working_dir(&self) -> PathBuf;

    // --- scheduler queries ---

    /// Next claimable open tasks, dependency-ready, oldest first.
    async fn get_next_tasks(&self, n: usize) -> Result<Vec<TaskRef>, TaskStoreError>;

    /// In-progress tasks with no live agent slot (resume candidates).
    async fn get_in_progress_tasks_without_agent(
        &self,
        n: usize,
    ) -> Result<Vec<TaskRef>, TaskStoreError>;

    /// Blocked tasks whose only unresolved dependency was `id`.
    async fn find_tasks_unblocked_by(&self, id: &TaskId)
        -> Result<Vec<TaskRef>, TaskStoreError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
