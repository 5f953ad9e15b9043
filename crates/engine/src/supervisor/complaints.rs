// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-conflict complaints: freeze, resolve, unfreeze.
//!
//! A worker that finds its files contested files a complaint. Other workers
//! touching those files are frozen with a steer, a resolver agent names the
//! conflicting party, and the loser is told to yield. The resolver's
//! self-reported verdict is trusted as-is; a circular pair (two agents
//! complaining about each other) is settled against the later complainant.

use super::spawn::{PromptSource, SpawnRequest};
use super::steering::extract_json;
use super::Supervisor;
use crate::timeouts;
use oms_adapters::{AgentLauncher, TaskStore};
use oms_core::{
    AgentId, AgentStatus, AgentType, Clock, Complaint, ComplaintId, ComplaintStatus, TaskId,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ResolverVerdict {
    #[serde(default, alias = "conflictingAgentId")]
    conflicting_agent_id: Option<String>,
    #[serde(default)]
    unidentified: bool,
}

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    /// File a complaint: freeze the other workers touching the named files
    /// and start resolution in the background.
    pub async fn complain(
        &self,
        complainant_agent_id: AgentId,
        complainant_task_id: TaskId,
        files: Vec<String>,
        reason: String,
    ) -> ComplaintId {
        let seq = {
            let complaints = self.complaints.lock();
            complaints.len() as u64 + 1
        };
        let id = ComplaintId::new(format!(
            "c-{}-{}",
            seq,
            &uuid::Uuid::new_v4().simple().to_string()[..6]
        ));

        // Freeze every other active worker; whoever the conflict is with is
        // among them, and a frozen worker loses no work.
        let mut frozen = Vec::new();
        for worker in self.registry.get_active() {
            if !worker.agent_type.is_worker_class() || worker.id == complainant_agent_id {
                continue;
            }
            let hold = format!(
                "Another agent reported a conflict on: {}. Avoid touching those files until \
                 the conflict is resolved. Continue any unrelated work.",
                files.join(", ")
            );
            if worker.rpc.steer(&hold).await.is_ok() {
                frozen.push(worker.id.clone());
            }
        }

        let complaint = Complaint {
            id: id.clone(),
            complainant_agent_id,
            complainant_task_id,
            files,
            reason,
            frozen_agents: frozen,
            resolver_agent_id: None,
            target_agent_id: None,
            status: None,
        };
        self.complaints.lock().insert(id.clone(), complaint);
        self.log.info(
            "complaint",
            "complaint filed",
            json!({"complaint": id.as_str()}),
        );

        let complaint_id = id.clone();
        self.spawn_supervised(move |sup| async move {
            sup.resolve_complaint(complaint_id).await;
        });
        id
    }

    /// Withdraw a complaint: release frozen agents and drop the record.
    pub async fn revoke_complaint(&self, id: &ComplaintId) {
        let Some(complaint) = self.complaints.lock().remove(id) else {
            return;
        };
        self.unfreeze(&complaint.frozen_agents).await;
        self.log.info(
            "complaint",
            "complaint revoked",
            json!({"complaint": id.as_str()}),
        );
    }

    /// Open complaints, for inspection.
    pub fn open_complaints(&self) -> Vec<Complaint> {
        self.complaints
            .lock()
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect()
    }

    async fn resolve_complaint(&self, id: ComplaintId) {
        let Some(complaint) = self.complaints.lock().get(&id).cloned() else {
            return;
        };

        let verdict = self.run_resolver(&complaint).await;
        let Some(verdict) = verdict else {
            self.settle(&id, ComplaintStatus::Error, None).await;
            return;
        };

        if verdict.unidentified || verdict.conflicting_agent_id.is_none() {
            self.settle(&id, ComplaintStatus::Unidentified, None).await;
            return;
        }

        let target = AgentId::new(verdict.conflicting_agent_id.unwrap_or_default());

        // Circular pair: the target has an open complaint of its own. The
        // later complainant loses.
        let circular = {
            let complaints = self.complaints.lock();
            complaints
                .values()
                .any(|c| c.is_open() && c.id != id && c.complainant_agent_id == target)
        };
        if circular {
            self.settle(&id, ComplaintStatus::CircularLoser, Some(target.clone()))
                .await;
            if let Some(loser) = self.registry.get(&complaint.complainant_agent_id) {
                let _ = loser
                    .rpc
                    .steer(
                        "Your conflict complaint crossed with one filed against you; yield the \
                         contested files and rework around the other agent's changes.",
                    )
                    .await;
            }
            return;
        }

        self.settle(&id, ComplaintStatus::Resolved, Some(target.clone()))
            .await;
        if let Some(target_record) = self.registry.get(&target) {
            let yield_msg = format!(
                "A conflict complaint was resolved against you for: {}. Stop touching those \
                 files and let the other agent finish; pick up your remaining work afterwards.",
                complaint.files.join(", ")
            );
            if let Err(error) = target_record.rpc.steer(&yield_msg).await {
                tracing::debug!(%error, agent = %target, "yield steer failed");
            }
        }
    }

    /// Run the resolver agent and parse its verdict.
    async fn run_resolver(&self, complaint: &Complaint) -> Option<ResolverVerdict> {
        let workers: Vec<serde_json::Value> = self
            .registry
            .active_summaries()
            .into_iter()
            .map(|s| {
                json!({
                    "agent_id": s.id.as_str(),
                    "type": s.agent_type.as_str(),
                    "task": s.task_id.as_ref().map(|t| t.as_str().to_string()),
                })
            })
            .collect();

        let prompt = format!(
            "Agent {complainant} (task {task}) reports a conflict on these files:\n{files}\n\
             Reason: {reason}\n\nLive agents:\n{agents}\n\n\
             Identify which agent is conflicting. Respond with one JSON object: \
             {{\"conflicting_agent_id\": \"...\"}} or {{\"unidentified\": true}}.",
            complainant = complaint.complainant_agent_id,
            task = complaint.complainant_task_id,
            files = complaint.files.join("\n"),
            reason = complaint.reason,
            agents = serde_json::Value::Array(workers),
        );

        let mut request = SpawnRequest::new(AgentType::Steering, PromptSource::Raw(prompt));
        request.task_id = Some(complaint.complainant_task_id.clone());
        let resolver = match self.spawn_agent(request).await {
            Ok(resolver) => resolver,
            Err(error) => {
                tracing::warn!(%error, "resolver spawn failed");
                return None;
            }
        };

        {
            let mut complaints = self.complaints.lock();
            if let Some(record) = complaints.get_mut(&complaint.id) {
                record.resolver_agent_id = Some(resolver.id.clone());
            }
        }

        let waited = resolver
            .rpc
            .wait_for_agent_end(timeouts::RESOLVER_END_WAIT)
            .await;
        let text = resolver.rpc.get_last_assistant_text().await.ok().flatten();
        resolver.rpc.force_kill();
        self.finalize_agent(&resolver, AgentStatus::Done).await;

        if waited.is_err() {
            return None;
        }
        text.as_deref()
            .and_then(extract_json)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Record a terminal status and release the frozen agents.
    async fn settle(
        &self,
        id: &ComplaintId,
        status: ComplaintStatus,
        target: Option<AgentId>,
    ) {
        let frozen = {
            let mut complaints = self.complaints.lock();
            match complaints.get_mut(id) {
                Some(complaint) => {
                    complaint.status = Some(status);
                    complaint.target_agent_id = target;
                    complaint.frozen_agents.clone()
                }
                None => return,
            }
        };
        self.unfreeze(&frozen).await;
        self.log.info(
            "complaint",
            "complaint settled",
            json!({"complaint": id.as_str(), "status": status.as_str()}),
        );
    }

    async fn unfreeze(&self, frozen: &[AgentId]) {
        for agent_id in frozen {
            let Some(record) = self.registry.get(agent_id) else {
                continue;
            };
            if !record.is_active() {
                continue;
            }
            let _ = record
                .rpc
                .steer("The file conflict is resolved; resume normal work.")
                .await;
        }
    }
}
