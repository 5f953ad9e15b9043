// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task store client backed by the tasks CLI.
//!
//! Every call shells out to the configured binary with `--json` output,
//! under the store's working directory and with `TASKS_ACTOR` set to the
//! supervisor's identity.

use super::{AgentStateUpdate, TaskStore, TaskStoreError};
use crate::subprocess::{run_with_timeout, TASK_STORE_TIMEOUT};
use async_trait::async_trait;
use oms_core::{AgentId, AgentType, StoreAgentId, TaskId, TaskRef, TaskStatus};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tokio::process::Command;

/// Configuration for the CLI-backed store.
#[derive(Debug, Clone)]
pub struct CommandTaskStoreConfig {
    /// The tasks binary (e.g. `tasks`)
    pub program: String,
    /// Store working directory (`OMS_TASK_STORE_DIR`)
    pub dir: PathBuf,
    /// Actor identity recorded against every mutation
    pub actor: String,
}

/// CLI-backed task store client.
#[derive(Clone)]
pub struct CommandTaskStore {
    config: CommandTaskStoreConfig,
}

impl CommandTaskStore {
    pub fn new(config: CommandTaskStoreConfig) -> Self {
        Self { config }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(args)
            .arg("--json")
            .env("TASKS_ACTOR", &self.config.actor)
            .current_dir(&self.config.dir);
        cmd
    }

    /// Run a subcommand and ignore its output.
    async fn run(&self, args: &[&str]) -> Result<(), TaskStoreError> {
        self.run_raw(args).await.map(drop)
    }

    /// Run a subcommand and parse its stdout as JSON.
    async fn run_parsed<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, TaskStoreError> {
        let stdout = self.run_raw(args).await?;
        serde_json::from_str(&stdout).map_err(|e| {
            TaskStoreError::InvalidData(format!("{} (from `{}`)", e, args.join(" ")))
        })
    }

    async fn run_raw(&self, args: &[&str]) -> Result<String, TaskStoreError> {
        let description = format!("{} {}", self.config.program, args.join(" "));
        let output = run_with_timeout(self.command(args), TASK_STORE_TIMEOUT, &description)
            .await
            .map_err(TaskStoreError::CallFailed)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TaskStoreError::CallFailed(format!(
                "{} exited with {:?}: {}",
                description,
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TaskStore for CommandTaskStore {
    async fn ready(&self) -> Result<(), TaskStoreError> {
        self.run(&["ready"]).await
    }

    async fn create(&self, title: &str, description: &str) -> Result<TaskRef, TaskStoreError> {
        self.run_parsed(&["create", title, "--description", description])
            .await
    }

    async fn show(&self, id: &TaskId) -> Result<TaskRef, TaskStoreError> {
        self.run_parsed(&["show", id.as_str()]).await
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), TaskStoreError> {
        self.run(&["status", id.as_str(), status.as_str()]).await
    }

    async fn comment(&self, id: &TaskId, text: &str) -> Result<(), TaskStoreError> {
        self.run(&["comment", id.as_str(), text]).await
    }

    async fn close(&self, id: &TaskId, reason: &str) -> Result<(), TaskStoreError> {
        self.run(&["close", id.as_str(), "--reason", reason]).await
    }

    async fn claim(&self, id: &TaskId) -> Result<(), TaskStoreError> {
        self.run(&["claim", id.as_str()]).await
    }

    async fn try_claim(&self, id: &TaskId) -> Result<bool, TaskStoreError> {
        match self.run(&["claim", id.as_str()]).await {
            Ok(()) => Ok(true),
            // A losing claim is a normal outcome, not a store failure
            Err(TaskStoreError::CallFailed(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    async fn create_agent(
        &self,
        agent_id: &AgentId,
        agent_type: AgentType,
        task_id: Option<&TaskId>,
    ) -> Result<StoreAgentId, TaskStoreError> {
        let mut args = vec!["agent", "create", agent_id.as_str(), "--type", agent_type.as_str()];
        if let Some(task_id) = task_id {
            args.push("--task");
            args.push(task_id.as_str());
        }
        #[derive(serde::Deserialize)]
        struct Created {
            id: String,
        }
        let created: Created = self.run_parsed(&args).await?;
        Ok(StoreAgentId::new(created.id))
    }

    async fn set_agent_state(
        &self,
        store_agent_id: &StoreAgentId,
        update: AgentStateUpdate,
    ) -> Result<(), TaskStoreError> {
        let payload = serde_json::to_string(&update)
            .map_err(|e| TaskStoreError::InvalidData(e.to_string()))?;
        self.run(&["agent", "state", store_agent_id.as_str(), &payload])
            .await
    }

    async fn set_slot(&self, id: &TaskId, slot: &str, value: &str) -> Result<(), TaskStoreError> {
        self.run(&["slot", "set", id.as_str(), slot, value]).await
    }

    async fn clear_slot(&self, id: &TaskId, slot: &str) -> Result<(), TaskStoreError> {
        self.run(&["slot", "clear", id.as_str(), slot]).await
    }

    fn working_dir(&self) -> PathBuf {
        self.config.dir.clone()
    }

    async fn get_next_tasks(&self, n: usize) -> Result<Vec<TaskRef>, TaskStoreError> {
        let n = n.to_string();
        self.run_parsed(&["next", "--limit", &n]).await
    }

    async fn get_in_progress_tasks_without_agent(
        &self,
        n: usize,
    ) -> Result<Vec<TaskRef>, TaskStoreError> {
        let n = n.to_string();
        self.run_parsed(&["orphaned", "--limit", &n]).await
    }

    async fn find_tasks_unblocked_by(
        &self,
        id: &TaskId,
    ) -> Result<Vec<TaskRef>, TaskStoreError> {
        self.run_parsed(&["unblocked-by", id.as_str()]).await
    }
}
