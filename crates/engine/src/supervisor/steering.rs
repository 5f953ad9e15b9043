// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Steering: periodic course-correction of running workers, urgent
//! interrupts, and broadcast messages.

use super::spawn::{PromptSource, SpawnRequest};
use super::Supervisor;
use crate::registry::AgentRecord;
use crate::timeouts;
use oms_adapters::{AgentLauncher, TaskStore};
use oms_core::{AgentMessage, AgentStatus, AgentType, Clock, TaskId, TaskRef};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Verdict of a per-worker steering review.
#[derive(Debug, Deserialize, PartialEq)]
pub(crate) struct SteeringDecision {
    pub action: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// One decision from a broadcast-steering run.
#[derive(Debug, Deserialize, PartialEq)]
pub(crate) struct BroadcastDecision {
    #[serde(alias = "taskId")]
    pub task_id: String,
    pub action: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    /// Tick entry: start a steering review for every worker whose interval
    /// has elapsed and who is not already being reviewed or taken over.
    pub(crate) async fn maybe_steer_workers(&self) {
        let now = self.clock.now();
        let interval = self.config.steering_interval;

        for worker in self.registry.get_active() {
            if !worker.agent_type.is_worker_class() {
                continue;
            }
            let Some(task_id) = worker.task_id.clone() else {
                continue;
            };
            if self.task_has_active_finisher(&task_id)
                || self.finisher_takeover.lock().contains(&task_id)
            {
                continue;
            }

            let due = {
                let mut steering = self.steering.lock();
                let state = steering.entry(worker.id.clone()).or_default();
                if state.in_flight {
                    false
                } else {
                    match state.last_steering {
                        // First sighting starts the clock
                        None => {
                            state.last_steering = Some(now);
                            false
                        }
                        Some(last) if now.duration_since(last) >= interval => {
                            state.in_flight = true;
                            true
                        }
                        Some(_) => false,
                    }
                }
            };
            if !due {
                continue;
            }

            self.spawn_supervised(move |sup| async move {
                sup.run_steering_for_worker(worker).await;
            });
        }
    }

    /// Review one worker with a short-lived steering agent and apply its
    /// verdict.
    pub(crate) async fn run_steering_for_worker(&self, worker: Arc<AgentRecord>) {
        self.steering_review(&worker).await;

        let now = self.clock.now();
        let mut steering = self.steering.lock();
        if let Some(state) = steering.get_mut(&worker.id) {
            state.in_flight = false;
            state.last_steering = Some(now);
        }
    }

    async fn steering_review(&self, worker: &Arc<AgentRecord>) {
        let Some(task_id) = worker.task_id.clone() else {
            return;
        };

        let summary = self.worker_history_summary(worker).await;
        if summary.is_empty() {
            return;
        }

        let prompt = format!(
            "You are reviewing a coding agent working on task {task}. Below is a summary of \
             its recent turns. Decide whether to intervene.\n\
             Respond with exactly one JSON object: {{\"action\": \"steer\", \"message\": \"...\"}} \
             to nudge it, {{\"action\": \"interrupt\"}} to cut its current turn, or \
             {{\"action\": \"none\"}}.\n\n{summary}",
            task = task_id,
            summary = summary,
        );

        let mut request = SpawnRequest::new(AgentType::Steering, PromptSource::Raw(prompt));
        request.task_id = Some(task_id.clone());
        let steering_agent = match self.spawn_agent(request).await {
            Ok(agent) => agent,
            Err(error) => {
                tracing::warn!(%error, task = %task_id, "steering spawn failed");
                return;
            }
        };

        let waited = steering_agent
            .rpc
            .wait_for_agent_end(timeouts::STEERING_END_WAIT)
            .await;
        let text = steering_agent
            .rpc
            .get_last_assistant_text()
            .await
            .ok()
            .flatten();
        // One turn is all a steering agent gets
        steering_agent.rpc.force_kill();
        self.finalize_agent(&steering_agent, AgentStatus::Done).await;

        if waited.is_err() {
            tracing::debug!(task = %task_id, "steering agent produced no turn");
            return;
        }

        // A finisher takeover happened mid-review; its verdict is moot.
        if self.task_has_active_finisher(&task_id)
            || self.finisher_takeover.lock().contains(&task_id)
        {
            return;
        }

        let Some(decision) = text
            .as_deref()
            .and_then(extract_json)
            .and_then(|v| serde_json::from_value::<SteeringDecision>(v).ok())
        else {
            tracing::debug!(task = %task_id, "unparseable steering verdict");
            return;
        };

        match decision.action.as_str() {
            "steer" => {
                if let Some(message) = decision.message {
                    if let Err(error) = worker.rpc.steer(&message).await {
                        tracing::debug!(%error, agent = %worker.id, "steer delivery failed");
                    } else {
                        self.log.info(
                            "steering",
                            "worker steered",
                            json!({"task": task_id.as_str(), "agent": worker.id.as_str()}),
                        );
                    }
                }
            }
            "interrupt" => {
                if let Err(error) = worker.rpc.abort().await {
                    tracing::debug!(%error, agent = %worker.id, "interrupt failed");
                } else {
                    self.log.info(
                        "steering",
                        "worker interrupted",
                        json!({"task": task_id.as_str(), "agent": worker.id.as_str()}),
                    );
                }
            }
            _ => {}
        }
    }

    /// Compact summary of the worker's last assistant turns.
    async fn worker_history_summary(&self, worker: &Arc<AgentRecord>) -> String {
        match worker.rpc.get_messages().await {
            Ok(messages) if !messages.is_empty() => format_worker_history(&messages),
            _ => match worker.rpc.get_last_assistant_text().await {
                Ok(Some(text)) => squash_whitespace(&text, 2000),
                _ => String::new(),
            },
        }
    }

    /// Deliver a message to every active non-finisher agent on a task.
    pub async fn steer_agent(&self, task_id: &TaskId, message: &str) -> bool {
        let targets = self.steerable_agents(task_id);
        if targets.is_empty() {
            return false;
        }
        for target in targets {
            if let Err(error) = target.rpc.steer(message).await {
                tracing::debug!(%error, agent = %target.id, "steer failed");
            }
        }
        true
    }

    /// Urgent interrupt: abort the current turn and re-prompt in one motion,
    /// or queue the message for the task's next agent if none is alive.
    pub async fn interrupt_agent(&self, task_id: &TaskId, message: &str) -> bool {
        let urgent = format!("[URGENT MESSAGE]\n\n{}", message);
        let targets = self.steerable_agents(task_id);
        if targets.is_empty() {
            self.pending_kickoffs
                .lock()
                .insert(task_id.clone(), urgent.clone());
            self.log.info(
                "steering",
                "interrupt queued as pending kickoff",
                json!({"task": task_id.as_str()}),
            );
            return false;
        }

        for target in targets {
            // The aborted turn's own end is not this interrupt's outcome
            target.rpc.suppress_next_agent_end();
            if let Err(error) = target.rpc.abort_and_prompt(&urgent).await {
                tracing::warn!(%error, agent = %target.id, "interrupt failed; stopping agent");
                target.rpc.force_kill();
                self.finalize_agent(&target, AgentStatus::Aborted).await;
                self.pending_kickoffs
                    .lock()
                    .insert(task_id.clone(), urgent.clone());
            }
        }
        true
    }

    /// Broadcast a message to all workers through a single steering agent
    /// that decides per-worker what to do. Globally single-flight.
    pub async fn broadcast_to_workers(&self, message: &str) {
        if self.broadcast_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        self.broadcast_inner(message).await;
        self.broadcast_in_flight.store(false, Ordering::SeqCst);
    }

    async fn broadcast_inner(&self, message: &str) {
        let mut snapshot = Vec::new();
        for worker in self.registry.get_active() {
            if !worker.agent_type.is_worker_class() {
                continue;
            }
            let Some(task_id) = worker.task_id.clone() else {
                continue;
            };
            let last = worker
                .rpc
                .get_last_assistant_text()
                .await
                .ok()
                .flatten()
                .map(|t| squash_whitespace(&t, 400))
                .unwrap_or_default();
            snapshot.push(json!({
                "task_id": task_id.as_str(),
                "agent_id": worker.id.as_str(),
                "recent": last,
            }));
        }
        if snapshot.is_empty() {
            return;
        }

        let prompt = format!(
            "An operator message must be relayed to the running workers below. For each worker \
             decide what to do. Respond with one JSON array of \
             {{\"task_id\", \"action\": \"steer\"|\"abort\"|\"none\", \"message\"?, \"reason\"?}}.\n\n\
             Operator message:\n{message}\n\nWorkers:\n{workers}",
            message = message,
            workers = Value::Array(snapshot),
        );

        let request = SpawnRequest::new(AgentType::Steering, PromptSource::Raw(prompt));
        let agent = match self.spawn_agent(request).await {
            Ok(agent) => agent,
            Err(error) => {
                tracing::warn!(%error, "broadcast steering spawn failed");
                return;
            }
        };

        let waited = agent
            .rpc
            .wait_for_agent_end(timeouts::BROADCAST_END_WAIT)
            .await;
        let text = agent.rpc.get_last_assistant_text().await.ok().flatten();
        agent.rpc.force_kill();
        self.finalize_agent(&agent, AgentStatus::Done).await;
        if waited.is_err() {
            return;
        }

        let decisions: Vec<BroadcastDecision> = text
            .as_deref()
            .and_then(extract_json)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        for decision in decisions {
            let task_id = TaskId::new(&decision.task_id);
            // Workers already in finisher hands are left alone
            if self.task_has_active_finisher(&task_id) {
                continue;
            }
            let Some(worker) = self.registry.active_worker_for_task(&task_id) else {
                continue;
            };
            match decision.action.as_str() {
                "steer" => {
                    if let Some(message) = decision.message {
                        if let Err(error) = worker.rpc.steer(&message).await {
                            tracing::debug!(%error, agent = %worker.id, "broadcast steer failed");
                        }
                    }
                }
                "abort" | "interrupt" => {
                    if let Err(error) = worker.rpc.abort().await {
                        tracing::debug!(%error, agent = %worker.id, "broadcast abort failed");
                    }
                }
                _ => {}
            }
        }
    }

    /// Mark the takeover, silence steering on the task, then bring in the
    /// finisher.
    pub(crate) async fn spawn_finisher_after_stopping_steering(
        &self,
        task: &TaskRef,
        worker_output: String,
    ) {
        self.finisher_takeover.lock().insert(task.id.clone());

        for record in self.registry.get_active_by_task(&task.id) {
            if record.agent_type == AgentType::Steering {
                record.rpc.force_kill();
                self.finalize_agent(&record, AgentStatus::Aborted).await;
            }
        }

        self.spawn_finisher_for(task, worker_output).await;
    }

    pub(crate) fn task_has_active_finisher(&self, task_id: &TaskId) -> bool {
        self.registry
            .get_active_by_task(task_id)
            .iter()
            .any(|a| a.agent_type == AgentType::Finisher)
    }

    /// Active agents on a task that accept steering.
    fn steerable_agents(&self, task_id: &TaskId) -> Vec<Arc<AgentRecord>> {
        self.registry
            .get_active_by_task(task_id)
            .into_iter()
            .filter(|a| {
                !matches!(
                    a.agent_type,
                    AgentType::Finisher | AgentType::Steering | AgentType::Merger
                )
            })
            .collect()
    }
}

/// Render the last assistant turns (with their tool calls) into a compact,
/// whitespace-squashed summary.
pub(crate) fn format_worker_history(messages: &[AgentMessage]) -> String {
    let assistant_turns: Vec<&AgentMessage> = messages
        .iter()
        .filter(|m| m.role == "assistant")
        .collect();
    let last_five = assistant_turns
        .iter()
        .rev()
        .take(5)
        .rev()
        .collect::<Vec<_>>();

    let mut out = String::new();
    for (i, message) in last_five.iter().enumerate() {
        out.push_str(&format!(
            "[turn {}] {}\n",
            i + 1,
            squash_whitespace(&message.content, 600)
        ));
        for call in &message.tool_calls {
            let result = call
                .result
                .as_deref()
                .map(|r| squash_whitespace(r, 200))
                .unwrap_or_default();
            out.push_str(&format!("  tool {}: {}\n", call.name, result));
        }
    }
    out
}

/// Collapse whitespace runs and truncate to at most `max` characters.
pub(crate) fn squash_whitespace(text: &str, max: usize) -> String {
    let squashed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if squashed.len() <= max {
        squashed
    } else {
        let mut cut = max;
        while cut > 0 && !squashed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &squashed[..cut])
    }
}

/// Pull the first parseable JSON value out of free-form agent text.
pub(crate) fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "steering_unit_tests.rs"]
mod tests;
