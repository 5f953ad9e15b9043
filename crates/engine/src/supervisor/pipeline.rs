// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task pipelines: (optional speedy) → issuer → worker → finisher, with
//! retry and recovery for agents that exit without a lifecycle hand-off.

use super::spawn::{PromptSource, SpawnRequest};
use super::Supervisor;
use crate::profiles::worker_type_for_labels;
use crate::registry::AgentRecord;
use crate::timeouts;
use oms_adapters::{AgentLauncher, TaskStore};
use oms_core::{
    AgentStatus, AgentType, Clock, LifecycleAction, LifecycleRecord, SessionId, TaskId, TaskRef,
    TaskScope, TaskStatus,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one retried agent run.
pub(crate) enum RetryResult {
    Record(LifecycleRecord),
    /// Recovery was abandoned (task closed, replaced, etc.)
    Aborted(String),
    /// Budget exhausted without a hand-off
    Failed(String),
}

/// What the issuer decided for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum IssuerDecision {
    /// Spawn a worker (possibly of an overridden type)
    Start {
        target: Option<AgentType>,
        message: Option<String>,
    },
    /// No worker needed; hand straight to a finisher
    Skip { message: Option<String> },
    Block {
        message: Option<String>,
        reason: Option<String>,
    },
    Aborted(String),
    Failed(String),
}

/// What the speedy fast path produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeedyOutcome {
    Closed,
    /// Work done; hand to a finisher with this message
    Done { message: Option<String> },
    /// Too big for the fast path; run the full pipeline
    Escalate {
        message: Option<String>,
        reason: Option<String>,
    },
    Blocked { message: Option<String> },
    Aborted(String),
    Failed(String),
}

/// Recovery steer injected when an agent exits without calling
/// `advance_lifecycle`.
fn recovery_nudge(agent_type: AgentType) -> String {
    match agent_type {
        AgentType::Speedy => "SYSTEM RECOVERY: your previous run ended without a lifecycle \
             hand-off. Finish the task now if it truly is tiny, then call advance_lifecycle \
             (close, or advance to issuer/finisher). Do not skip the call again."
            .to_string(),
        _ => "SYSTEM RECOVERY: your previous run ended without calling advance_lifecycle. \
             Review the task state and record your decision with the advance_lifecycle tool \
             before ending your turn."
            .to_string(),
    }
}

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    // --- kickoff guards -------------------------------------------------

    /// Run a new-task pipeline in the background, holding a pipeline slot
    /// for the task until it finishes on any path.
    pub fn kickoff_new_task_pipeline(&self, task: TaskRef) {
        self.pipeline_inc(&task.id);
        self.spawn_supervised(move |sup| async move {
            let task_id = task.id.clone();
            sup.run_new_task_pipeline(task).await;
            sup.pipeline_dec(&task_id);
        });
    }

    /// Run a resume pipeline in the background with the same slot guarantee.
    pub fn kickoff_resume_pipeline(&self, task: TaskRef) {
        self.pipeline_inc(&task.id);
        self.spawn_supervised(move |sup| async move {
            let task_id = task.id.clone();
            sup.run_resume_pipeline(task).await;
            sup.pipeline_dec(&task_id);
        });
    }

    // --- pipelines ------------------------------------------------------

    pub(crate) async fn run_new_task_pipeline(&self, task: TaskRef) {
        match self.store.try_claim(&task.id).await {
            Ok(true) => {}
            Ok(false) => {
                self.log.info(
                    "pipeline",
                    "claim lost",
                    json!({"task": task.id.as_str()}),
                );
                return;
            }
            Err(error) => {
                tracing::warn!(%error, task = %task.id, "claim failed");
                return;
            }
        }

        let mut issuer_extra: Option<String> = None;
        if task.scope == TaskScope::Tiny {
            match self.run_speedy(&task).await {
                SpeedyOutcome::Closed => return,
                SpeedyOutcome::Done { message } => {
                    self.spawn_finisher_after_stopping_steering(
                        &task,
                        message.unwrap_or_else(|| "Fast-path work complete.".to_string()),
                    )
                    .await;
                    return;
                }
                SpeedyOutcome::Blocked { message } => {
                    self.block_task(&task.id, "Blocked by speedy", message.as_deref())
                        .await;
                    return;
                }
                SpeedyOutcome::Escalate { message, reason } => {
                    issuer_extra = Some(format!(
                        "A fast-path agent escalated this task to the full pipeline.\nReason: {}\n{}",
                        reason.unwrap_or_else(|| "(none given)".to_string()),
                        message.unwrap_or_default()
                    ));
                }
                SpeedyOutcome::Aborted(reason) => {
                    self.log.info(
                        "pipeline",
                        "speedy recovery abandoned",
                        json!({"task": task.id.as_str(), "reason": reason}),
                    );
                    return;
                }
                SpeedyOutcome::Failed(reason) => {
                    issuer_extra = Some(format!(
                        "A fast-path agent failed on this task ({}). Decide how to proceed.",
                        reason
                    ));
                }
            }
        }

        let decision = self
            .run_issuer(&task, issuer_extra, timeouts::PIPELINE_END_WAIT)
            .await;
        self.apply_issuer_decision(&task, decision).await;
    }

    /// Resume a task already `in_progress` with no live worker.
    pub(crate) async fn run_resume_pipeline(&self, task: TaskRef) {
        let pending = self.pending_kickoffs.lock().remove(&task.id);
        if let Some(kickoff) = pending {
            // A queued interrupt outranks the issuer: pass it verbatim.
            let worker_type = worker_type_for_labels(&task.labels);
            self.spawn_worker(&task, worker_type, PromptSource::Raw(kickoff))
                .await;
            return;
        }

        let nudge = "This task is already in progress but has no live agent. Resume from the \
             current state of the workspace and task comments, then hand off as usual."
            .to_string();
        let decision = self
            .run_issuer(&task, Some(nudge), timeouts::RESUME_PROBE_END_WAIT)
            .await;
        self.apply_issuer_decision(&task, decision).await;
    }

    pub(crate) async fn apply_issuer_decision(
        &self,
        task: &TaskRef,
        decision: IssuerDecision,
    ) {
        match decision {
            IssuerDecision::Start { target, message } => {
                let worker_type = target.unwrap_or_else(|| worker_type_for_labels(&task.labels));
                self.spawn_worker(task, worker_type, PromptSource::Task { extra: message })
                    .await;
            }
            IssuerDecision::Skip { message } => {
                let payload = format!(
                    "No worker was needed for this task. {}\nVerify and close it.",
                    message.unwrap_or_default()
                );
                self.spawn_finisher_for(task, payload).await;
            }
            IssuerDecision::Block { message, reason } => {
                // A live or incoming worker owns the task state; let it.
                if self.pending_worker_replacements.lock().contains(&task.id)
                    || self.registry.active_worker_for_task(&task.id).is_some()
                {
                    return;
                }
                let detail = reason.or(message);
                self.block_task(&task.id, "Blocked by issuer", detail.as_deref())
                    .await;
            }
            IssuerDecision::Aborted(reason) => {
                self.log.info(
                    "pipeline",
                    "issuer recovery abandoned",
                    json!({"task": task.id.as_str(), "reason": reason}),
                );
            }
            IssuerDecision::Failed(reason) => {
                if self.pending_worker_replacements.lock().contains(&task.id)
                    || self.registry.active_worker_for_task(&task.id).is_some()
                {
                    return;
                }
                self.block_task(&task.id, "Blocked by issuer", Some(&reason))
                    .await;
            }
        }
    }

    pub(crate) async fn run_issuer(
        &self,
        task: &TaskRef,
        extra: Option<String>,
        end_wait: Duration,
    ) -> IssuerDecision {
        match self
            .run_agent_with_retry(AgentType::Issuer, task, end_wait, extra)
            .await
        {
            RetryResult::Record(record) => match record.action {
                LifecycleAction::Close => IssuerDecision::Skip {
                    message: record.message,
                },
                LifecycleAction::Block => IssuerDecision::Block {
                    message: record.message,
                    reason: record.reason,
                },
                LifecycleAction::Advance => IssuerDecision::Start {
                    target: record.target,
                    message: record.message,
                },
            },
            RetryResult::Aborted(reason) => IssuerDecision::Aborted(reason),
            RetryResult::Failed(reason) => IssuerDecision::Failed(reason),
        }
    }

    pub(crate) async fn run_speedy(&self, task: &TaskRef) -> SpeedyOutcome {
        match self
            .run_agent_with_retry(AgentType::Speedy, task, timeouts::PIPELINE_END_WAIT, None)
            .await
        {
            RetryResult::Record(record) => match (record.action, record.target) {
                (LifecycleAction::Close, _) => {
                    let reason = record
                        .reason
                        .clone()
                        .unwrap_or_else(|| "Closed by fast-path agent".to_string());
                    self.handle_finisher_close_task(&task.id, &reason, None).await;
                    SpeedyOutcome::Closed
                }
                (LifecycleAction::Advance, Some(AgentType::Finisher)) => SpeedyOutcome::Done {
                    message: record.message,
                },
                (LifecycleAction::Advance, _) => SpeedyOutcome::Escalate {
                    message: record.message,
                    reason: record.reason,
                },
                (LifecycleAction::Block, _) => SpeedyOutcome::Blocked {
                    message: record.message.or(record.reason),
                },
            },
            RetryResult::Aborted(reason) => SpeedyOutcome::Aborted(reason),
            RetryResult::Failed(reason) => SpeedyOutcome::Failed(reason),
        }
    }

    // --- the retry driver (issuer & speedy) -----------------------------

    pub(crate) async fn run_agent_with_retry(
        &self,
        agent_type: AgentType,
        task: &TaskRef,
        end_wait: Duration,
        initial_extra: Option<String>,
    ) -> RetryResult {
        let budget = self.config.retry_budget.max(1);
        let mut resume: Option<SessionId> = None;

        for attempt in 1..=budget {
            // A stale record from an earlier run must not satisfy this one.
            self.take_lifecycle(&task.id);

            let spawn_result = if let Some(session) = resume.clone() {
                let mut request = SpawnRequest::for_task(
                    agent_type,
                    task,
                    PromptSource::Raw(recovery_nudge(agent_type)),
                );
                request.resume_session = Some(session);
                request.assert_resumable = true;
                self.spawn_agent(request).await
            } else {
                let extra = if attempt == 1 {
                    initial_extra.clone()
                } else {
                    Some(recovery_nudge(agent_type))
                };
                self.spawn_agent(SpawnRequest::for_task(
                    agent_type,
                    task,
                    PromptSource::Task { extra },
                ))
                .await
            };

            let record = match spawn_result {
                Ok(record) => record,
                Err(error) => {
                    tracing::warn!(%error, task = %task.id, attempt, "agent spawn failed");
                    if let Some(reason) = self.recovery_abort_reason(&task.id).await {
                        return RetryResult::Aborted(reason);
                    }
                    continue;
                }
            };

            let wait = record.rpc.wait_for_agent_end(end_wait).await;

            // The record is what matters, on both the success and the
            // failure path; the agent may even have been force-killed.
            if let Some(lifecycle) = self.take_lifecycle(&task.id) {
                self.finalize_agent(&record, AgentStatus::Done).await;
                return RetryResult::Record(lifecycle);
            }

            if record.status() == AgentStatus::Stopped {
                self.finalize_agent(&record, AgentStatus::Stopped).await;
                return RetryResult::Aborted("agent was stopped externally".to_string());
            }

            // Missing hand-off: capture the session for a resume, mark dead.
            resume = record
                .rpc
                .session_id()
                .or_else(|| record.session_id())
                .or(resume);
            if let Err(error) = wait {
                tracing::warn!(%error, task = %task.id, attempt, "agent ended without hand-off");
            }
            self.log.warn(
                "pipeline",
                "missing advance_lifecycle",
                json!({
                    "task": task.id.as_str(),
                    "type": agent_type.as_str(),
                    "attempt": attempt,
                    "session": resume.as_ref().map(SessionId::as_str),
                }),
            );
            self.finalize_agent(&record, AgentStatus::Dead).await;

            if let Some(reason) = self.recovery_abort_reason(&task.id).await {
                return RetryResult::Aborted(reason);
            }
        }

        RetryResult::Failed(format!(
            "{} failed after {} attempts (no advance_lifecycle recorded)",
            agent_type, budget
        ))
    }

    /// Why recovery of a task should stop, if it should.
    async fn recovery_abort_reason(&self, task_id: &TaskId) -> Option<String> {
        match self.store.show(task_id).await {
            Ok(task) => match task.status {
                TaskStatus::Closed => Some("task is closed".to_string()),
                TaskStatus::Blocked => Some("task is blocked".to_string()),
                TaskStatus::Deferred => Some("task is deferred".to_string()),
                _ => {
                    if self.pending_worker_replacements.lock().contains(task_id) {
                        Some("a worker replacement is pending".to_string())
                    } else if self.registry.active_worker_for_task(task_id).is_some() {
                        Some("a live worker owns the task".to_string())
                    } else {
                        None
                    }
                }
            },
            Err(oms_adapters::TaskStoreError::NotFound(_)) => {
                Some("task no longer exists".to_string())
            }
            // Transient store trouble is no reason to abandon recovery
            Err(_) => None,
        }
    }

    // --- worker & finisher stages ---------------------------------------

    pub(crate) async fn spawn_worker(
        &self,
        task: &TaskRef,
        worker_type: AgentType,
        prompt: PromptSource,
    ) {
        self.take_lifecycle(&task.id);
        match self
            .spawn_agent(SpawnRequest::for_task(worker_type, task, prompt))
            .await
        {
            Ok(record) => self.attach_worker_monitor(record, task.clone()),
            Err(error) => {
                tracing::warn!(%error, task = %task.id, "worker spawn failed");
            }
        }
    }

    /// Spawn a finisher and watch its hand-off. Used by the steering
    /// takeover path and the issuer skip path.
    pub(crate) async fn spawn_finisher_for(&self, task: &TaskRef, payload: String) {
        self.take_lifecycle(&task.id);
        let request = SpawnRequest::for_task(
            AgentType::Finisher,
            task,
            PromptSource::Task {
                extra: Some(payload),
            },
        );
        match self.spawn_agent(request).await {
            Ok(record) => self.attach_finisher_monitor(record, task.clone()),
            Err(error) => {
                tracing::warn!(%error, task = %task.id, "finisher spawn failed");
            }
        }
    }

    fn attach_worker_monitor(&self, record: Arc<AgentRecord>, task: TaskRef) {
        self.spawn_supervised(move |sup| async move {
            sup.monitor_worker(record, task).await;
        });
    }

    fn attach_finisher_monitor(&self, record: Arc<AgentRecord>, task: TaskRef) {
        self.spawn_supervised(move |sup| async move {
            sup.monitor_finisher(record, task).await;
        });
    }

    /// Watch a worker until it hands off, is stopped, or dies.
    async fn monitor_worker(&self, record: Arc<AgentRecord>, task: TaskRef) {
        let mut nudges = 0u32;
        loop {
            let wait = record.rpc.wait_for_agent_end(timeouts::PIPELINE_END_WAIT).await;

            if let Some(lifecycle) = self.take_lifecycle(&task.id) {
                self.apply_worker_lifecycle(&record, &task, lifecycle).await;
                return;
            }

            if record.status() == AgentStatus::Stopped {
                // A stop sweep owns the cleanup
                return;
            }

            match wait {
                Ok(_) => {
                    // Turn ended with no hand-off. Nudge a bounded number of
                    // times; a worker that keeps ending turns silently is dead
                    // weight and the resume pipeline will take over.
                    nudges += 1;
                    if nudges >= self.config.retry_budget.max(1) {
                        self.finalize_agent(&record, AgentStatus::Dead).await;
                        return;
                    }
                    if record
                        .rpc
                        .follow_up(
                            "Your turn ended without a lifecycle hand-off. Continue the task, \
                             and when you are done call advance_lifecycle.",
                        )
                        .await
                        .is_err()
                    {
                        self.finalize_agent(&record, AgentStatus::Dead).await;
                        return;
                    }
                }
                Err(error) => {
                    if record.rpc.is_running() && record.is_active() {
                        // Wait timed out while the worker is genuinely busy;
                        // keep watching.
                        tracing::debug!(agent = %record.id, %error, "worker still running");
                        continue;
                    }
                    self.log.warn(
                        "pipeline",
                        "worker exited without hand-off",
                        json!({"task": task.id.as_str(), "agent": record.id.as_str()}),
                    );
                    self.finalize_agent(&record, AgentStatus::Dead).await;
                    return;
                }
            }
        }
    }

    async fn apply_worker_lifecycle(
        &self,
        record: &Arc<AgentRecord>,
        task: &TaskRef,
        lifecycle: LifecycleRecord,
    ) {
        self.lifecycle_transition_in_flight
            .lock()
            .insert(task.id.clone());
        self.finalize_agent(record, AgentStatus::Done).await;

        match lifecycle.action {
            LifecycleAction::Advance => {
                let output = lifecycle
                    .message
                    .unwrap_or_else(|| "Worker reported the task complete.".to_string());
                self.spawn_finisher_after_stopping_steering(task, output).await;
            }
            LifecycleAction::Block => {
                let detail = lifecycle.reason.or(lifecycle.message);
                self.block_task(&task.id, "Blocked by worker", detail.as_deref())
                    .await;
            }
            // Validation keeps workers from recording a close
            LifecycleAction::Close => {}
        }

        self.lifecycle_transition_in_flight.lock().remove(&task.id);
    }

    /// Watch a finisher until it hands off.
    async fn monitor_finisher(&self, record: Arc<AgentRecord>, task: TaskRef) {
        loop {
            let wait = record.rpc.wait_for_agent_end(timeouts::PIPELINE_END_WAIT).await;

            if let Some(lifecycle) = self.take_lifecycle(&task.id) {
                self.apply_finisher_lifecycle(&record, &task, lifecycle).await;
                return;
            }

            if record.status() == AgentStatus::Stopped {
                return;
            }

            match wait {
                Ok(_) => {
                    if record
                        .rpc
                        .follow_up(
                            "Your turn ended without a lifecycle hand-off. Close the task, \
                             block it, or advance it with advance_lifecycle.",
                        )
                        .await
                        .is_err()
                    {
                        self.finalize_agent(&record, AgentStatus::Dead).await;
                        return;
                    }
                }
                Err(error) => {
                    if record.rpc.is_running() && record.is_active() {
                        tracing::debug!(agent = %record.id, %error, "finisher still running");
                        continue;
                    }
                    self.finalize_agent(&record, AgentStatus::Dead).await;
                    return;
                }
            }
        }
    }

    async fn apply_finisher_lifecycle(
        &self,
        record: &Arc<AgentRecord>,
        task: &TaskRef,
        lifecycle: LifecycleRecord,
    ) {
        self.lifecycle_transition_in_flight
            .lock()
            .insert(task.id.clone());
        let finisher_id = record.id.clone();
        self.finalize_agent(record, AgentStatus::Done).await;

        match (lifecycle.action, lifecycle.target) {
            (LifecycleAction::Close, _) => {
                let reason = lifecycle
                    .reason
                    .or(lifecycle.message)
                    .unwrap_or_else(|| "Closed by finisher".to_string());
                self.handle_finisher_close_task(&task.id, &reason, Some(&finisher_id))
                    .await;
            }
            (LifecycleAction::Advance, Some(AgentType::Worker)) => {
                let kickoff = lifecycle.message.clone();
                let worker_type = worker_type_for_labels(&task.labels);
                self.spawn_worker(task, worker_type, PromptSource::Task { extra: kickoff })
                    .await;
            }
            (LifecycleAction::Advance, _) => {
                // Back to the issuer for a fresh decision
                let extra = lifecycle.message.map(|m| {
                    format!("The finisher bounced this task back with the note:\n{}", m)
                });
                let decision = self
                    .run_issuer(task, extra, timeouts::PIPELINE_END_WAIT)
                    .await;
                self.apply_issuer_decision(task, decision).await;
            }
            (LifecycleAction::Block, _) => {
                let detail = lifecycle.reason.or(lifecycle.message);
                self.block_task(&task.id, "Blocked by finisher", detail.as_deref())
                    .await;
            }
        }

        self.lifecycle_transition_in_flight.lock().remove(&task.id);
    }

    /// Set a task blocked with its canonical comment.
    pub(crate) async fn block_task(&self, task_id: &TaskId, prefix: &str, detail: Option<&str>) {
        if let Err(error) = self.store.update_status(task_id, TaskStatus::Blocked).await {
            tracing::warn!(%error, task = %task_id, "block status update failed");
        }
        let comment = match detail {
            Some(detail) if !detail.is_empty() => format!("{}. {}", prefix, detail),
            _ => format!("{}.", prefix),
        };
        self.comment_best_effort(task_id, &comment).await;
        self.log.info(
            "pipeline",
            "task blocked",
            json!({"task": task_id.as_str(), "comment": comment}),
        );
    }
}
