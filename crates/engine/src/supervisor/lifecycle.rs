// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording of `advance_lifecycle` calls.

use super::Supervisor;
use oms_adapters::{AgentLauncher, TaskStore};
use oms_core::time_fmt::now_epoch_ms;
use oms_core::{
    AgentType, Clock, LifecycleInput, LifecycleRecord, LifecycleRejection, TaskId,
};
use serde_json::json;
use std::sync::Arc;

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    /// Validate and record a lifecycle hand-off.
    ///
    /// At most one record exists per task; a second recording overwrites the
    /// first with a warning. The record is consumed exactly once by the
    /// pipeline after the emitting agent exits.
    pub fn advance_lifecycle(
        &self,
        input: LifecycleInput,
    ) -> Result<LifecycleRecord, LifecycleRejection> {
        let record = input.validate(now_epoch_ms())?;
        let task_id = record.task_id.clone();

        let previous = self
            .lifecycle_by_task
            .lock()
            .insert(task_id.clone(), record.clone());
        if let Some(previous) = previous {
            tracing::warn!(
                task = %task_id,
                first = %previous.agent_type,
                second = %record.agent_type,
                "lifecycle record overwritten"
            );
            self.log.warn(
                "lifecycle",
                "lifecycle record overwritten",
                json!({
                    "task": task_id.as_str(),
                    "first": previous.agent_type.as_str(),
                    "second": record.agent_type.as_str(),
                }),
            );
        }

        self.log.info(
            "lifecycle",
            "lifecycle recorded",
            json!({
                "task": task_id.as_str(),
                "agent_type": record.agent_type.as_str(),
                "action": record.action.as_str(),
                "target": record.target.map(|t| t.as_str()),
            }),
        );

        // The issuer's job ends the moment a hand-off lands; end its turn
        // promptly so the pipeline can consume the record.
        self.abort_issuers_on_task(&task_id);

        Ok(record)
    }

    /// Best-effort abort of live issuer RPCs on a task.
    fn abort_issuers_on_task(&self, task_id: &TaskId) {
        for record in self.registry.get_active_by_task(task_id) {
            if record.agent_type != AgentType::Issuer {
                continue;
            }
            let rpc = Arc::clone(&record.rpc);
            let agent_id = record.id.clone();
            tokio::spawn(async move {
                if let Err(error) = rpc.abort().await {
                    tracing::debug!(%error, agent = %agent_id, "issuer abort failed");
                }
            });
        }
    }
}
