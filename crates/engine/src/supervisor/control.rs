// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External control surface: control-socket dispatch, agent replacement,
//! and waiting on agents.

use super::spawn::PromptSource;
use super::Supervisor;
use crate::error::EngineError;
use crate::timeouts;
use oms_adapters::{AgentLauncher, TaskStore};
use oms_core::{AgentId, AgentType, Clock, ControlMessage, TaskId, TaskStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    /// Dispatch one inbound control-socket message.
    pub async fn handle_control_message(&self, message: ControlMessage) {
        match message {
            ControlMessage::InterruptAgent {
                task_id, message, ..
            } => {
                self.interrupt_agent(&TaskId::new(task_id), &message).await;
            }
            ControlMessage::AdvanceLifecycle { input } => {
                if let Err(rejection) = self.advance_lifecycle(input) {
                    tracing::warn!(summary = %rejection.summary, "lifecycle call rejected");
                }
            }
            ControlMessage::MergeComplete { task_id, reason } => {
                self.handle_merger_complete(&TaskId::new(task_id), &reason)
                    .await;
            }
            ControlMessage::MergeConflict { task_id, reason } => {
                self.handle_merger_conflict(&TaskId::new(task_id), &reason)
                    .await;
            }
            ControlMessage::Complain {
                agent_id,
                task_id,
                files,
                reason,
            } => {
                self.complain(
                    AgentId::new(agent_id),
                    TaskId::new(task_id),
                    files,
                    reason,
                )
                .await;
            }
            ControlMessage::RevokeComplaint { complaint_id } => {
                self.revoke_complaint(&oms_core::ComplaintId::new(complaint_id))
                    .await;
            }
        }
    }

    /// External "replace" entrypoint: stop whatever runs on the task and
    /// spawn the requested type in its place.
    pub async fn spawn_agent_by_singularity(
        &self,
        agent_type: AgentType,
        task_id: &TaskId,
        context: Option<String>,
    ) -> Result<(), EngineError> {
        let key = (agent_type, task_id.clone());
        {
            let mut in_flight = self.spawn_by_singularity_in_flight.lock();
            if !in_flight.insert(key.clone()) {
                return Err(EngineError::internal(format!(
                    "a {} replacement for {} is already in flight",
                    agent_type, task_id
                )));
            }
        }

        let result = self.replace_agent_inner(agent_type, task_id, context).await;
        self.spawn_by_singularity_in_flight.lock().remove(&key);
        result
    }

    async fn replace_agent_inner(
        &self,
        agent_type: AgentType,
        task_id: &TaskId,
        context: Option<String>,
    ) -> Result<(), EngineError> {
        self.pipeline_inc(task_id);
        if agent_type.is_worker_class() {
            self.pending_worker_replacements.lock().insert(task_id.clone());
        }

        let result = self
            .replace_agent_steps(agent_type, task_id, context)
            .await;

        self.pending_worker_replacements.lock().remove(task_id);
        self.pipeline_dec(task_id);
        result
    }

    async fn replace_agent_steps(
        &self,
        agent_type: AgentType,
        task_id: &TaskId,
        context: Option<String>,
    ) -> Result<(), EngineError> {
        let mut task = self.store.show(task_id).await?;

        if task.status == TaskStatus::Blocked {
            self.store.update_status(task_id, TaskStatus::Open).await?;
            task.status = TaskStatus::Open;
        }
        if task.status == TaskStatus::Open {
            // Re-adopt ownership; losing the race to someone else is fine
            if let Err(error) = self.store.claim(task_id).await {
                tracing::debug!(%error, task = %task_id, "re-claim failed");
            } else {
                task.status = TaskStatus::InProgress;
            }
        }

        self.stop_agents_for_task(task_id, true, false).await;

        self.log.info(
            "control",
            "replacing agent by singularity",
            json!({"task": task_id.as_str(), "type": agent_type.as_str()}),
        );

        match agent_type {
            AgentType::Worker | AgentType::Designer | AgentType::Speedy => {
                self.spawn_worker(&task, agent_type, PromptSource::Task { extra: context })
                    .await;
                Ok(())
            }
            AgentType::Issuer => {
                let decision = self
                    .run_issuer(&task, context, timeouts::SUB_ISSUER_END_WAIT)
                    .await;
                self.apply_issuer_decision(&task, decision).await;
                Ok(())
            }
            AgentType::Finisher => {
                let payload = context
                    .unwrap_or_else(|| "Verify the current state of this task.".to_string());
                self.spawn_finisher_for(&task, payload).await;
                Ok(())
            }
            other => Err(EngineError::internal(format!(
                "{} agents cannot be spawned via replace",
                other
            ))),
        }
    }

    /// Wait (polling) until an agent leaves the registry or goes terminal.
    pub async fn wait_for_agent(&self, agent_id: &AgentId, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.registry.get(agent_id) {
                None => return true,
                Some(record) if !record.is_active() => return true,
                Some(_) => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
