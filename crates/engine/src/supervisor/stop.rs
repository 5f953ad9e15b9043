// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop sweeps and shutdown.
//!
//! Every sweep marks matched agents `Stopped` in the registry *before*
//! dispatching aborts, so late `agent_end` handlers observe a terminal
//! status and never finalize twice.

use super::spawn::CALLBACK_SLOT;
use super::Supervisor;
use crate::registry::AgentRecord;
use crate::timeouts;
use oms_adapters::{AgentLauncher, TaskStore};
use oms_core::{AgentId, AgentStatus, AgentType, Clock, TaskId, TaskStatus};
use serde_json::json;
use std::sync::Arc;

/// Canonical comment left on tasks blocked by a user stop.
pub(crate) const STOP_BLOCK_COMMENT: &str =
    "Blocked by user via Stop. Ask Singularity for guidance, then unblock when ready.";

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    /// Stop every active agent matching `pred`: mark Stopped, abort, await
    /// exit, finalize. Returns the agents that were swept.
    pub(crate) async fn stop_agents_matching(
        &self,
        pred: impl Fn(&AgentRecord) -> bool,
    ) -> Vec<Arc<AgentRecord>> {
        let matched: Vec<Arc<AgentRecord>> = self
            .registry
            .get_active()
            .into_iter()
            .filter(|record| pred(record))
            .collect();

        // Terminal status first, so no other handler races the sweep.
        for record in &matched {
            record.set_status(AgentStatus::Stopped);
        }

        for record in &matched {
            let rpc = Arc::clone(&record.rpc);
            tokio::spawn(async move {
                let _ = rpc.abort().await;
            });
        }

        for record in &matched {
            if let Err(error) = record.rpc.stop(timeouts::STOP_WAIT).await {
                tracing::debug!(%error, agent = %record.id, "stop failed");
            }
            self.finalize_agent(record, AgentStatus::Stopped).await;
        }

        matched
    }

    /// Stop all agents on one task; block the task with the canonical stop
    /// comment if anything was actually stopped.
    pub async fn stop_agents_for_task(
        &self,
        task_id: &TaskId,
        include_finisher: bool,
        block_task: bool,
    ) -> usize {
        let task = task_id.clone();
        let stopped = self
            .stop_agents_matching(move |record| {
                record.task_id.as_ref() == Some(&task)
                    && (include_finisher || record.agent_type != AgentType::Finisher)
            })
            .await;

        if block_task && !stopped.is_empty() {
            if let Err(error) = self.store.update_status(task_id, TaskStatus::Blocked).await {
                tracing::warn!(%error, task = %task_id, "stop-block status update failed");
            }
            self.comment_best_effort(task_id, STOP_BLOCK_COMMENT).await;
        }

        self.log.info(
            "stop",
            "agents stopped for task",
            json!({"task": task_id.as_str(), "count": stopped.len(), "blocked": block_task}),
        );
        stopped.len()
    }

    /// Pause the loop, then stop agents for each listed task.
    pub async fn stop_agents_for_task_ids_and_pause(
        &self,
        task_ids: &[TaskId],
        block_stopped_tasks: bool,
    ) {
        self.pause();
        for task_id in task_ids {
            self.stop_agents_for_task(task_id, true, block_stopped_tasks)
                .await;
        }
    }

    pub async fn stop_agent_by_id(&self, agent_id: &AgentId) -> bool {
        let agent = agent_id.clone();
        let stopped = self
            .stop_agents_matching(move |record| record.id == agent)
            .await;
        !stopped.is_empty()
    }

    pub async fn stop_all_agents_and_pause(&self) -> usize {
        self.pause();
        self.stop_agents_matching(|_| true).await.len()
    }

    /// Full shutdown: stop the loop, stop every agent, clear slots, flush
    /// the heartbeat. The process owner force-kills whatever survives the
    /// grace window.
    pub async fn stop(&self) {
        self.pause();
        self.request_shutdown();

        let active = self.registry.get_active();
        for record in &active {
            record.set_status(AgentStatus::Stopped);
        }
        for record in &active {
            if let Err(error) = record.rpc.stop(timeouts::SHUTDOWN_GRACE).await {
                tracing::debug!(%error, agent = %record.id, "shutdown stop failed");
                record.rpc.force_kill();
            }
            if let Some(task_id) = &record.task_id {
                if let Err(error) = self.store.clear_slot(task_id, CALLBACK_SLOT).await {
                    tracing::debug!(%error, task = %task_id, "slot clear failed");
                }
            }
            self.finalize_agent(record, AgentStatus::Stopped).await;
        }

        self.registry.stop_heartbeat(Arc::clone(&self.store)).await;
        self.log.info(
            "stop",
            "supervisor stopped",
            json!({"agents": active.len()}),
        );
    }
}
