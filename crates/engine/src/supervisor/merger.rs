// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merger queue processing and finisher-close handling.
//!
//! The queue is strictly FIFO and strictly serial: at most one merger agent
//! lives at any instant, and for each merged task `destroy replica` →
//! `close` → `unblock dependents` → next `spawn merger`, in that order.

use super::spawn::{PromptSource, SpawnRequest};
use super::Supervisor;
use crate::merger_queue::MergerEntry;
use crate::registry::AgentRecord;
use crate::timeouts;
use oms_adapters::{AgentLauncher, TaskStore};
use oms_core::{AgentId, AgentStatus, AgentType, Clock, TaskId, TaskStatus};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    /// A finisher recorded `close` for a task. With a live replica the task
    /// is queued for merge instead of closed; returns whether it was queued.
    pub(crate) async fn handle_finisher_close_task(
        &self,
        task_id: &TaskId,
        reason: &str,
        _agent_id: Option<&AgentId>,
    ) -> bool {
        self.comment_best_effort(task_id, &format!("Finisher close recorded for {}", task_id))
            .await;

        if self.replicas.enabled() && self.replicas.exists(task_id) {
            let entry = MergerEntry {
                task_id: task_id.clone(),
                replica_dir: self.replicas.replica_dir(task_id),
            };
            let enqueued = self.merger_queue.lock().enqueue(entry);
            self.log.info(
                "merger",
                "queued for merge",
                json!({"task": task_id.as_str(), "enqueued": enqueued, "reason": reason}),
            );

            // The close is recorded; any finisher still chatting can stop.
            for record in self.registry.get_active_by_task(task_id) {
                if record.agent_type == AgentType::Finisher {
                    let rpc = Arc::clone(&record.rpc);
                    tokio::spawn(async move {
                        let _ = rpc.abort().await;
                    });
                }
            }

            self.process_merger_queue().await;
            return true;
        }

        self.close_task_and_unblock_dependents(task_id, reason).await;
        false
    }

    /// Close a task, then flip its now-unblocked dependents open and kick
    /// pipelines for them as slots allow.
    pub(crate) async fn close_task_and_unblock_dependents(
        &self,
        task_id: &TaskId,
        reason: &str,
    ) {
        if let Err(error) = self.store.close(task_id, reason).await {
            tracing::warn!(%error, task = %task_id, "close failed");
        }
        self.finisher_takeover.lock().remove(task_id);
        self.pending_kickoffs.lock().remove(task_id);
        self.log.info(
            "task",
            "task closed",
            json!({"task": task_id.as_str(), "reason": reason}),
        );

        if self.paused.load(Ordering::SeqCst) {
            return;
        }

        let unblocked = match self.store.find_tasks_unblocked_by(task_id).await {
            Ok(unblocked) => unblocked,
            Err(error) => {
                tracing::debug!(%error, task = %task_id, "unblocked query failed");
                return;
            }
        };
        for task in unblocked {
            if let Err(error) = self.store.update_status(&task.id, TaskStatus::Open).await {
                tracing::warn!(%error, task = %task.id, "unblock failed");
                continue;
            }
            if self.available_worker_slots() == 0 {
                continue;
            }
            if self.has_pipeline_in_flight(&task.id) {
                continue;
            }
            let mut task = task;
            task.status = TaskStatus::Open;
            self.kickoff_new_task_pipeline(task);
        }
    }

    /// Drive the merger queue. Globally single-flight; spawns at most one
    /// merger and returns, to be re-entered when that merger resolves.
    pub(crate) async fn process_merger_queue(&self) {
        if self.merger_queue_running.swap(true, Ordering::SeqCst) {
            return;
        }

        loop {
            if self.merger_processing.lock().is_some() {
                break;
            }
            let Some(entry) = self.merger_queue.lock().peek().cloned() else {
                break;
            };
            let task_id = entry.task_id.clone();

            // A task that left in_progress while queued no longer merges.
            match self.store.show(&task_id).await {
                Ok(task) if task.status == TaskStatus::InProgress => {}
                Ok(task) => {
                    self.log.info(
                        "merger",
                        "dropping queued task",
                        json!({"task": task_id.as_str(), "status": task.status.as_str()}),
                    );
                    self.merger_queue.lock().remove(&task_id);
                    self.destroy_replica_best_effort(&task_id).await;
                    continue;
                }
                Err(error) => {
                    tracing::warn!(%error, task = %task_id, "merge status check failed");
                    self.merger_queue.lock().remove(&task_id);
                    self.destroy_replica_best_effort(&task_id).await;
                    continue;
                }
            }

            if !self.replicas.exists(&task_id) {
                self.merger_queue.lock().remove(&task_id);
                self.close_task_and_unblock_dependents(
                    &task_id,
                    "Closed without merge (replica directory missing)",
                )
                .await;
                continue;
            }

            // Only a merger under the merge lock may mutate the project root.
            let guard = self.merge_lock.lock_owned().await;
            *self.merge_guard.lock() = Some(guard);
            *self.merger_processing.lock() = Some(task_id.clone());

            match self.spawn_merger(&entry).await {
                Ok(record) => {
                    self.attach_merger_monitor(record, task_id);
                    break;
                }
                Err(error) => {
                    tracing::warn!(%error, task = %task_id, "merger spawn failed");
                    self.clear_merger_lock();
                    self.merger_queue.lock().remove(&task_id);
                    self.destroy_replica_best_effort(&task_id).await;
                    self.block_task(&task_id, "Blocked by merger conflict", Some(&error.to_string()))
                        .await;
                    continue;
                }
            }
        }

        self.merger_queue_running.store(false, Ordering::SeqCst);
    }

    async fn spawn_merger(
        &self,
        entry: &MergerEntry,
    ) -> Result<Arc<AgentRecord>, crate::error::EngineError> {
        let prompt = format!(
            "Merge the completed work for task {task} back into the project root.\n\
             Replica directory: {replica}\nProject root: {root}\n\
             Apply the replica's changes, resolve what you safely can, and signal the result \
             with your merge tool (complete or conflict).",
            task = entry.task_id,
            replica = entry.replica_dir.display(),
            root = self.config.project_root.display(),
        );
        let mut request = SpawnRequest::new(AgentType::Merger, PromptSource::Raw(prompt));
        request.task_id = Some(entry.task_id.clone());
        self.spawn_agent(request).await
    }

    fn attach_merger_monitor(&self, record: Arc<AgentRecord>, task_id: TaskId) {
        self.spawn_supervised(move |sup| async move {
            sup.monitor_merger(record, task_id).await;
        });
    }

    /// Watch the merger agent. Its outcome normally arrives as a control
    /// message; a merger that dies silently releases the lock and retries.
    async fn monitor_merger(&self, record: Arc<AgentRecord>, task_id: TaskId) {
        loop {
            let wait = record
                .rpc
                .wait_for_agent_end(timeouts::PIPELINE_END_WAIT)
                .await;

            // Give an in-flight merge_complete/merge_conflict message a
            // moment to land before treating silence as failure.
            let mut handled = false;
            for _ in 0..25 {
                handled = self.merger_processing.lock().as_ref() != Some(&task_id);
                if handled {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            if handled {
                // Outcome handled; the handler finalized everything.
                if record.is_active() {
                    self.finalize_agent(&record, AgentStatus::Done).await;
                }
                return;
            }

            match wait {
                Ok(_) if record.rpc.is_running() => {
                    // Turn ended, no signal, process alive: nudge once more.
                    if record
                        .rpc
                        .follow_up(
                            "Your turn ended without signalling the merge result. Signal \
                             complete or conflict with your merge tool now.",
                        )
                        .await
                        .is_ok()
                    {
                        continue;
                    }
                }
                Err(_) if record.rpc.is_running() && record.is_active() => {
                    // Still merging; keep waiting.
                    continue;
                }
                _ => {}
            }

            tracing::warn!(task = %task_id, "merger exited without signalling; retrying queue");
            self.log.warn(
                "merger",
                "merger exited without signal",
                json!({"task": task_id.as_str(), "agent": record.id.as_str()}),
            );
            self.finalize_agent(&record, AgentStatus::Dead).await;
            self.clear_merger_lock();
            self.process_merger_queue().await;
            return;
        }
    }

    /// Merger reported success for a task.
    pub async fn handle_merger_complete(&self, task_id: &TaskId, reason: &str) {
        self.merger_queue.lock().remove(task_id);
        self.destroy_replica_best_effort(task_id).await;

        let reason = if reason.is_empty() {
            "Merged and closed".to_string()
        } else {
            reason.to_string()
        };
        self.close_task_and_unblock_dependents(task_id, &reason).await;

        self.stop_merger_agents(task_id, AgentStatus::Done).await;
        self.clear_merger_lock();
        self.process_merger_queue().await;
    }

    /// Merger hit a conflict: block the task, keep the replica for humans.
    pub async fn handle_merger_conflict(&self, task_id: &TaskId, reason: &str) {
        self.merger_queue.lock().remove(task_id);
        self.block_task(task_id, "Blocked by merger conflict", Some(reason))
            .await;

        self.stop_merger_agents(task_id, AgentStatus::Done).await;
        self.clear_merger_lock();
        self.process_merger_queue().await;
    }

    /// A task was closed externally while queued (or merging).
    pub async fn handle_external_task_close(&self, task_id: &TaskId) {
        let was_queued = self.merger_queue.lock().remove(task_id);
        let was_merging = self.merger_processing.lock().as_ref() == Some(task_id);
        if !was_queued && !was_merging {
            return;
        }

        self.destroy_replica_best_effort(task_id).await;
        self.stop_merger_agents(task_id, AgentStatus::Aborted).await;
        if was_merging {
            self.clear_merger_lock();
        }
        self.log.info(
            "merger",
            "externally closed task removed from merge queue",
            json!({"task": task_id.as_str()}),
        );
        self.process_merger_queue().await;
    }

    /// Scan replicas left on disk by a previous run and requeue the live
    /// ones. Called once at startup.
    pub async fn restore_merger_queue_from_replicas(&self) {
        if !self.replicas.enabled() {
            return;
        }
        for sanitized in self.replicas.list() {
            let task_id = TaskId::new(&sanitized);
            match self.store.show(&task_id).await {
                Ok(task) if task.status == TaskStatus::InProgress => {
                    let entry = MergerEntry {
                        task_id: task_id.clone(),
                        replica_dir: self.replicas.replica_dir(&task_id),
                    };
                    if self.merger_queue.lock().enqueue(entry) {
                        self.log.info(
                            "merger",
                            "restored replica into merge queue",
                            json!({"task": sanitized}),
                        );
                    }
                }
                Ok(_) | Err(_) => {
                    // Stale or orphaned replica
                    self.destroy_replica_best_effort(&task_id).await;
                }
            }
        }
    }

    pub(crate) async fn destroy_replica_best_effort(&self, task_id: &TaskId) {
        if let Err(error) = self.replicas.destroy(task_id).await {
            tracing::warn!(%error, task = %task_id, "replica destroy failed");
        }
    }

    fn clear_merger_lock(&self) {
        *self.merger_processing.lock() = None;
        *self.merge_guard.lock() = None;
    }

    async fn stop_merger_agents(&self, task_id: &TaskId, status: AgentStatus) {
        for record in self.registry.get_active_by_task(task_id) {
            if record.agent_type != AgentType::Merger {
                continue;
            }
            let _ = record.rpc.stop(Duration::from_secs(2)).await;
            self.finalize_agent(&record, status).await;
        }
    }
}
