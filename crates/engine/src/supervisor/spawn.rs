// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent spawning: argv/env assembly, replica resolution, spawn-guard
//! dedup, kickoff prompts, and store bookkeeping.

use super::Supervisor;
use crate::error::EngineError;
use crate::profiles::{extension_file, AgentProfile, ReplicaStrategy};
use crate::registry::AgentRecord;
use oms_adapters::{AgentLauncher, AgentStateUpdate, LaunchSpec, TaskStore};
use oms_core::rpc::RpcEvent;
use oms_core::time_fmt::now_epoch_ms;
use oms_core::{
    AgentEvent, AgentStatus, AgentType, Clock, SessionId, TaskId, TaskRef, TaskStatus,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Slot name marking which agent currently owns a task's callbacks.
pub(crate) const CALLBACK_SLOT: &str = "callbackHandler";

/// How the initial prompt is assembled.
pub(crate) enum PromptSource {
    /// Standardized task prompt built from the task reference
    Task { extra: Option<String> },
    /// Caller-supplied prompt, sent verbatim
    Raw(String),
}

/// One spawn request.
pub(crate) struct SpawnRequest {
    pub agent_type: AgentType,
    /// Task the agent is bound to (guard identity, env, slot marking)
    pub task_id: Option<TaskId>,
    /// Task reference for standardized prompt assembly
    pub task: Option<TaskRef>,
    pub prompt: PromptSource,
    /// Claim the task in the store before spawning
    pub claim: bool,
    /// On resume, assert the task is still open or in progress
    pub assert_resumable: bool,
    pub resume_session: Option<SessionId>,
    pub extra_env: Vec<(String, String)>,
}

impl SpawnRequest {
    pub(crate) fn new(agent_type: AgentType, prompt: PromptSource) -> Self {
        Self {
            agent_type,
            task_id: None,
            task: None,
            prompt,
            claim: false,
            assert_resumable: false,
            resume_session: None,
            extra_env: Vec::new(),
        }
    }

    pub(crate) fn for_task(agent_type: AgentType, task: &TaskRef, prompt: PromptSource) -> Self {
        let mut request = Self::new(agent_type, prompt);
        request.task_id = Some(task.id.clone());
        request.task = Some(task.clone());
        request
    }
}

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    /// Spawn one agent. Spawn-guarded types dedupe per task: a concurrent or
    /// pre-existing active agent with the same guard identity is returned
    /// instead of spawning a second one.
    pub(crate) async fn spawn_agent(
        &self,
        request: SpawnRequest,
    ) -> Result<Arc<AgentRecord>, EngineError> {
        let guard_key = match (request.agent_type.guard_identity(), &request.task_id) {
            (Some(guard), Some(task_id)) => Some((guard.to_string(), task_id.clone())),
            _ => None,
        };

        // Take the per-(guard, task) single-flight lock, then re-check the
        // registry so concurrent spawns collapse into one.
        let _guard_held = match &guard_key {
            Some(key) => {
                if let Some(existing) = self.registry.active_by_guard(&key.0, &key.1) {
                    return Ok(existing);
                }
                let lock = {
                    let mut guards = self.spawn_guards.lock();
                    Arc::clone(
                        guards
                            .entry(key.clone())
                            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
                    )
                };
                let held = lock.lock_owned().await;
                if let Some(existing) = self.registry.active_by_guard(&key.0, &key.1) {
                    return Ok(existing);
                }
                Some(held)
            }
            None => None,
        };

        if let Some(task_id) = &request.task_id {
            if request.claim {
                self.store.claim(task_id).await?;
            } else if request.assert_resumable {
                let task = self.store.show(task_id).await?;
                if !matches!(task.status, TaskStatus::Open | TaskStatus::InProgress) {
                    return Err(EngineError::internal(format!(
                        "task {} is {}, not resumable",
                        task_id, task.status
                    )));
                }
            }
        }

        let agent_id = self.next_agent_id(request.agent_type, request.task_id.as_ref());
        let store_agent_id = self
            .store
            .create_agent(&agent_id, request.agent_type, request.task_id.as_ref())
            .await?;
        if let Err(error) = self
            .store
            .set_agent_state(&store_agent_id, AgentStateUpdate::state("spawning"))
            .await
        {
            tracing::debug!(%error, agent = %agent_id, "spawning state push failed");
        }

        let profile = AgentProfile::for_type(request.agent_type);
        let (cwd, replica_dir) = self.resolve_cwd(&profile, request.task_id.as_ref()).await?;
        let args = self.build_args(&profile, request.resume_session.as_ref());
        let env = self.build_env(&agent_id, &request);

        let spec = LaunchSpec {
            label: agent_id.to_string(),
            program: self.config.llm_program.clone(),
            args,
            env,
            cwd,
        };

        let rpc = match self.launcher.launch(spec).await {
            Ok(rpc) => rpc,
            Err(error) => {
                self.spawn_failed(&request, &store_agent_id, &error.to_string())
                    .await;
                return Err(error.into());
            }
        };

        if let Some(session) = &request.resume_session {
            rpc.cache_session_id(session.clone());
        }

        let record = AgentRecord::new(
            agent_id.clone(),
            request.agent_type,
            request.task_id.clone(),
            Some(store_agent_id.clone()),
            Arc::clone(&rpc),
            replica_dir,
            profile.model.map(str::to_string),
            profile.thinking,
        );
        self.registry.register(Arc::clone(&record));
        self.attach_event_pump(&record);

        let kickoff = self.build_prompt(&request).await;
        if let Err(error) = rpc.prompt(&kickoff).await {
            self.finalize_agent(&record, AgentStatus::Failed).await;
            let _ = rpc.stop(Duration::from_secs(2)).await;
            self.spawn_failed(&request, &store_agent_id, &error.to_string())
                .await;
            return Err(error.into());
        }

        if let Some(task_id) = &request.task_id {
            if let Err(error) = self
                .store
                .set_slot(task_id, CALLBACK_SLOT, agent_id.as_str())
                .await
            {
                tracing::debug!(%error, task = %task_id, "slot marking failed");
            }
        }
        if let Err(error) = self
            .store
            .set_agent_state(&store_agent_id, AgentStateUpdate::state("working"))
            .await
        {
            tracing::debug!(%error, agent = %agent_id, "working state push failed");
        }

        record.set_status(AgentStatus::Working);
        self.log.info(
            "spawn",
            "agent spawned",
            json!({
                "agent": agent_id.as_str(),
                "type": request.agent_type.as_str(),
                "task": request.task_id.as_ref().map(TaskId::as_str),
                "resumed": request.resume_session.is_some(),
            }),
        );
        Ok(record)
    }

    /// Pump RPC events into the agent's ring buffer and usage counters.
    fn attach_event_pump(&self, record: &Arc<AgentRecord>) {
        let mut events = record.rpc.subscribe();
        let record = Arc::clone(record);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                record.touch();
                match &event {
                    RpcEvent::MessageEnd { usage: Some(usage) } => {
                        record.add_usage(&oms_core::AgentUsage {
                            input_tokens: usage.input_tokens,
                            output_tokens: usage.output_tokens,
                            cost_usd: usage.cost_usd,
                        });
                        record.push_event(AgentEvent::new(now_epoch_ms(), "message_end"));
                    }
                    RpcEvent::MessageUpdate { .. } => {}
                    RpcEvent::RpcExit { code, .. } => {
                        record.push_event(AgentEvent::with_detail(
                            now_epoch_ms(),
                            "rpc_exit",
                            format!("code={:?}", code),
                        ));
                        break;
                    }
                    other => {
                        record.push_event(AgentEvent::new(now_epoch_ms(), other.name()));
                    }
                }
                if let Some(session) = record.rpc.session_id() {
                    record.set_session_id(session);
                }
            }
        });
    }

    async fn resolve_cwd(
        &self,
        profile: &AgentProfile,
        task_id: Option<&TaskId>,
    ) -> Result<(PathBuf, Option<PathBuf>), EngineError> {
        let project_root = self.config.project_root.clone();
        match (profile.replica, task_id) {
            (ReplicaStrategy::Create, Some(task_id)) if self.replicas.enabled() => {
                let work = self.replicas.create(task_id).await?;
                Ok((work, Some(self.replicas.replica_dir(task_id))))
            }
            (ReplicaStrategy::Resolve, Some(task_id))
                if self.replicas.enabled() && self.replicas.exists(task_id) =>
            {
                Ok((
                    self.replicas.work_dir(task_id),
                    Some(self.replicas.replica_dir(task_id)),
                ))
            }
            _ => Ok((project_root, None)),
        }
    }

    fn build_args(&self, profile: &AgentProfile, resume: Option<&SessionId>) -> Vec<String> {
        let mut args = vec![
            "--thinking".to_string(),
            profile.thinking.as_str().to_string(),
            "--no-pty".to_string(),
        ];
        if let Some(model) = profile.model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        if let Some(session) = resume {
            args.push("--resume".to_string());
            args.push(session.to_string());
        }
        for key in profile.extensions {
            if let Some(file) = extension_file(key) {
                args.push("--extension".to_string());
                args.push(self.config.extensions_dir.join(file).display().to_string());
            } else {
                tracing::warn!(key, "unknown extension key in profile");
            }
        }
        let tools: Vec<&str> = profile
            .tools
            .iter()
            .copied()
            .filter(|tool| !(profile.strip_bash && *tool == "bash"))
            .collect();
        if !tools.is_empty() {
            args.push("--tools".to_string());
            args.push(tools.join(","));
        }
        if let Some(prompt_file) = profile.prompt_file {
            args.push("--append-system-prompt".to_string());
            args.push(self.config.prompts_dir.join(prompt_file).display().to_string());
        }
        args
    }

    fn build_env(&self, agent_id: &oms_core::AgentId, request: &SpawnRequest) -> Vec<(String, String)> {
        let mut env = vec![
            ("TASKS_ACTOR".to_string(), self.config.actor.clone()),
            (
                "OMS_AGENT_TYPE".to_string(),
                request.agent_type.as_str().to_string(),
            ),
            ("OMS_AGENT_ID".to_string(), agent_id.to_string()),
            (
                "OMS_SINGULARITY_SOCK".to_string(),
                self.config.socket_path.display().to_string(),
            ),
            (
                "OMS_TASK_STORE_DIR".to_string(),
                self.config.store_dir.display().to_string(),
            ),
        ];
        if let Some(task_id) = &request.task_id {
            env.push(("OMS_TASK_ID".to_string(), task_id.to_string()));
        }
        env.extend(request.extra_env.iter().cloned());
        env
    }

    async fn build_prompt(&self, request: &SpawnRequest) -> String {
        match &request.prompt {
            PromptSource::Raw(prompt) => prompt.clone(),
            PromptSource::Task { extra } => {
                let Some(task) = &request.task else {
                    return extra.clone().unwrap_or_default();
                };
                let mut prompt = format!(
                    "Task {id}: {title}\n\nDescription:\n{description}\n",
                    id = task.id,
                    title = task.title,
                    description = if task.description.is_empty() {
                        "(none)"
                    } else {
                        &task.description
                    },
                );
                if !task.acceptance.is_empty() {
                    prompt.push_str(&format!("\nAcceptance:\n{}\n", task.acceptance));
                }
                if !task.labels.is_empty() {
                    prompt.push_str(&format!("\nLabels: {}\n", task.labels.join(", ")));
                }
                if request.agent_type == AgentType::Issuer && !task.depends_on_ids.is_empty() {
                    prompt.push_str(&self.render_dependencies(task).await);
                }
                if let Some(extra) = extra {
                    if !extra.is_empty() {
                        prompt.push_str(&format!("\n{}\n", extra));
                    }
                }
                prompt
            }
        }
    }

    /// Render parent-dependency context for issuer prompts.
    async fn render_dependencies(&self, task: &TaskRef) -> String {
        let mut section = String::from("\nDependencies:\n");
        for dep_id in &task.depends_on_ids {
            match self.store.show(dep_id).await {
                Ok(dep) => {
                    section.push_str(&format!(
                        "- {} [{}] {}\n",
                        dep.id, dep.status, dep.title
                    ));
                }
                Err(error) => {
                    tracing::debug!(%error, dep = %dep_id, "dependency lookup failed");
                    section.push_str(&format!("- {} (unavailable)\n", dep_id));
                }
            }
        }
        section
    }

    /// Best-effort cleanup when a spawn fails partway.
    async fn spawn_failed(
        &self,
        request: &SpawnRequest,
        store_agent_id: &oms_core::StoreAgentId,
        error: &str,
    ) {
        if let Some(task_id) = &request.task_id {
            self.comment_best_effort(
                task_id,
                &format!("{} spawn failed: {}", request.agent_type, error),
            )
            .await;
        }
        if let Err(push_error) = self
            .store
            .set_agent_state(store_agent_id, AgentStateUpdate::state("failed"))
            .await
        {
            tracing::debug!(%push_error, "failed-state push failed");
        }
        self.log.error(
            "spawn",
            "agent spawn failed",
            json!({
                "type": request.agent_type.as_str(),
                "task": request.task_id.as_ref().map(TaskId::as_str),
                "error": error,
            }),
        );
    }
}
