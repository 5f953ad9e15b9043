// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor loop: periodic tick, admission control, and wakeups.

use super::Supervisor;
use oms_adapters::{AgentLauncher, TaskStore};
use oms_core::Clock;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    /// Main loop: tick on the poll interval, on demand via [`Self::wake`],
    /// until shutdown is requested.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = self.wake_notify.notified() => {
                    self.pending_wake.store(false, Ordering::SeqCst);
                    self.tick().await;
                }
                _ = self.shutdown_notify.notified() => {
                    break;
                }
            }
        }
    }

    /// Coalesced wakeup: at most one extra tick is queued at a time.
    pub fn wake(&self) {
        if !self.pending_wake.swap(true, Ordering::SeqCst) {
            self.wake_notify.notify_one();
        }
    }

    /// Ask the run loop to exit.
    pub fn request_shutdown(&self) {
        self.shutdown_notify.notify_one();
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn unpause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// One scheduler pass. Re-entrant calls and paused loops are no-ops.
    pub async fn tick(&self) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        if self.tick_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tick_inner().await;
        self.tick_in_flight.store(false, Ordering::SeqCst);
    }

    async fn tick_inner(&self) {
        self.process_merger_queue().await;

        // Phase A: resume pipelines, keeping one slot in reserve for new work.
        let slots = self.available_worker_slots();
        let phase_a = slots.saturating_sub(1);
        if phase_a > 0 {
            self.kick_resume_pipelines(phase_a).await;
        }

        // Phase B: whatever is still free also goes to resumes.
        let remaining = self.available_worker_slots();
        if remaining > 0 {
            self.kick_resume_pipelines(remaining).await;
        }

        self.maybe_steer_workers().await;
    }

    /// Kick resume pipelines for up to `limit` agent-less in-progress tasks.
    async fn kick_resume_pipelines(&self, limit: usize) {
        let candidates = match self.store.get_in_progress_tasks_without_agent(limit).await {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::debug!(%error, "resume candidate query failed");
                return;
            }
        };
        for task in candidates {
            if self.has_pipeline_in_flight(&task.id) {
                continue;
            }
            if self
                .lifecycle_transition_in_flight
                .lock()
                .contains(&task.id)
            {
                continue;
            }
            if !self.registry.get_active_by_task(&task.id).is_empty() {
                continue;
            }
            self.log.info(
                "scheduler",
                "resuming task",
                json!({"task": task.id.as_str()}),
            );
            self.kickoff_resume_pipeline(task);
        }
    }

    /// Start up to `n` new tasks (or as many as slots allow). Returns how
    /// many pipelines were kicked.
    pub async fn start_tasks(&self, n: Option<usize>) -> usize {
        let slots = self.available_worker_slots();
        let want = n.unwrap_or(slots).min(slots);
        if want == 0 {
            return 0;
        }

        let candidates = match self.store.get_next_tasks(want).await {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::warn!(%error, "next-task query failed");
                return 0;
            }
        };

        let mut started = 0;
        for task in candidates {
            if started >= want {
                break;
            }
            if self.has_pipeline_in_flight(&task.id) {
                continue;
            }
            if !self.registry.get_active_by_task(&task.id).is_empty() {
                continue;
            }
            self.log.info(
                "scheduler",
                "starting task",
                json!({"task": task.id.as_str(), "scope": task.scope.as_str()}),
            );
            self.kickoff_new_task_pipeline(task);
            started += 1;
        }
        started
    }
}
