// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor ("singularity"): one process that claims tasks, spawns
//! agents, steers them, serializes merges, and closes tasks.
//!
//! All in-memory state lives behind parking_lot mutexes on this struct;
//! long-running work (pipelines, steering, merger watch) runs as spawned
//! tasks holding an `Arc<Supervisor>`.

mod complaints;
mod control;
mod lifecycle;
mod merger;
mod pipeline;
mod spawn;
mod steering;
mod stop;
mod tick;

pub use pipeline::{IssuerDecision, SpeedyOutcome};

use crate::merger_queue::MergerQueue;
use crate::registry::AgentRegistry;
use crate::session_log::SessionLog;
use crate::timeouts;
use oms_adapters::{AgentLauncher, MergeLock, ReplicaStore, TaskStore};
use oms_core::{AgentId, AgentStatus, AgentType, Clock, Complaint, ComplaintId, LifecycleRecord, TaskId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Supervisor tunables and paths.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Session directory (oms.log, replica/, crashes/ live here)
    pub session_dir: PathBuf,
    /// Shared project root agents ultimately merge into
    pub project_root: PathBuf,
    /// The LLM CLI binary to spawn agents with
    pub llm_program: String,
    /// Directory holding extension files
    pub extensions_dir: PathBuf,
    /// Directory holding per-type system prompt files
    pub prompts_dir: PathBuf,
    /// Control socket path exported to children
    pub socket_path: PathBuf,
    /// Task store directory exported to children
    pub store_dir: PathBuf,
    /// Actor identity for task-store mutations
    pub actor: String,
    pub max_workers: usize,
    pub poll_interval: Duration,
    pub steering_interval: Duration,
    pub retry_budget: u32,
}

impl SupervisorConfig {
    pub fn new(session_dir: PathBuf, project_root: PathBuf) -> Self {
        Self {
            extensions_dir: session_dir.join("extensions"),
            prompts_dir: session_dir.join("prompts"),
            socket_path: session_dir.join("singularity.sock"),
            store_dir: session_dir.join("tasks"),
            session_dir,
            project_root,
            llm_program: "llm".to_string(),
            actor: "singularity".to_string(),
            max_workers: 4,
            poll_interval: timeouts::POLL_INTERVAL,
            steering_interval: timeouts::STEERING_INTERVAL,
            retry_budget: timeouts::RETRY_BUDGET,
        }
    }
}

/// Adapter dependencies handed to the supervisor at construction.
pub struct SupervisorDeps<L, T> {
    pub launcher: L,
    pub store: Arc<T>,
    pub replicas: Arc<dyn ReplicaStore>,
}

/// Per-worker steering bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct SteeringState {
    pub(crate) last_steering: Option<Instant>,
    pub(crate) in_flight: bool,
}

/// The supervisor engine.
pub struct Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    pub(crate) launcher: L,
    pub(crate) store: Arc<T>,
    pub(crate) replicas: Arc<dyn ReplicaStore>,
    pub(crate) clock: C,
    pub(crate) config: SupervisorConfig,
    pub(crate) registry: AgentRegistry,
    pub(crate) log: SessionLog,
    /// Back-reference for spawning supervised background tasks
    self_ref: Weak<Self>,

    // -- pipeline state (purged on restart; replicas + store are durable) --
    pub(crate) lifecycle_by_task: Mutex<HashMap<TaskId, LifecycleRecord>>,
    pub(crate) pipeline_in_flight: Mutex<HashMap<TaskId, usize>>,
    pub(crate) pending_kickoffs: Mutex<HashMap<TaskId, String>>,
    pub(crate) pending_worker_replacements: Mutex<HashSet<TaskId>>,
    pub(crate) lifecycle_transition_in_flight: Mutex<HashSet<TaskId>>,
    pub(crate) spawn_guards: Mutex<HashMap<(String, TaskId), Arc<tokio::sync::Mutex<()>>>>,
    pub(crate) spawn_by_singularity_in_flight: Mutex<HashSet<(AgentType, TaskId)>>,

    // -- merger state --
    pub(crate) merger_queue: Mutex<MergerQueue>,
    pub(crate) merger_queue_running: AtomicBool,
    pub(crate) merger_processing: Mutex<Option<TaskId>>,
    pub(crate) merge_lock: MergeLock,
    pub(crate) merge_guard: Mutex<Option<tokio::sync::OwnedMutexGuard<()>>>,

    // -- steering state --
    pub(crate) steering: Mutex<HashMap<AgentId, SteeringState>>,
    pub(crate) finisher_takeover: Mutex<HashSet<TaskId>>,
    pub(crate) broadcast_in_flight: AtomicBool,

    // -- complaints --
    pub(crate) complaints: Mutex<HashMap<ComplaintId, Complaint>>,

    // -- loop state --
    pub(crate) paused: AtomicBool,
    pub(crate) tick_in_flight: AtomicBool,
    pub(crate) pending_wake: AtomicBool,
    pub(crate) wake_notify: Notify,
    pub(crate) shutdown_notify: Notify,
}

impl<L, T, C> Supervisor<L, T, C>
where
    L: AgentLauncher,
    T: TaskStore,
    C: Clock,
{
    pub fn new(deps: SupervisorDeps<L, T>, clock: C, config: SupervisorConfig) -> Arc<Self> {
        let log = SessionLog::new(&config.session_dir);
        Arc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            launcher: deps.launcher,
            store: deps.store,
            replicas: deps.replicas,
            clock,
            config,
            registry: AgentRegistry::new(),
            log,
            lifecycle_by_task: Mutex::new(HashMap::new()),
            pipeline_in_flight: Mutex::new(HashMap::new()),
            pending_kickoffs: Mutex::new(HashMap::new()),
            pending_worker_replacements: Mutex::new(HashSet::new()),
            lifecycle_transition_in_flight: Mutex::new(HashSet::new()),
            spawn_guards: Mutex::new(HashMap::new()),
            spawn_by_singularity_in_flight: Mutex::new(HashSet::new()),
            merger_queue: Mutex::new(MergerQueue::new()),
            merger_queue_running: AtomicBool::new(false),
            merger_processing: Mutex::new(None),
            merge_lock: MergeLock::new(),
            merge_guard: Mutex::new(None),
            steering: Mutex::new(HashMap::new()),
            finisher_takeover: Mutex::new(HashSet::new()),
            broadcast_in_flight: AtomicBool::new(false),
            complaints: Mutex::new(HashMap::new()),
            paused: AtomicBool::new(false),
            tick_in_flight: AtomicBool::new(false),
            pending_wake: AtomicBool::new(false),
            wake_notify: Notify::new(),
            shutdown_notify: Notify::new(),
        })
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Spawn a supervised background task holding a strong reference to the
    /// supervisor. No-op during teardown, when the last strong reference is
    /// already gone.
    pub(crate) fn spawn_supervised<F, Fut>(&self, f: F)
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(sup) = self.self_ref.upgrade() {
            tokio::spawn(f(sup));
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// `max(0, max_workers − active workers − distinct tasks with a pipeline
    /// in flight)`.
    pub fn available_worker_slots(&self) -> usize {
        let active = self.registry.active_worker_count();
        let in_flight = self.pipeline_in_flight.lock().len();
        self.config.max_workers.saturating_sub(active + in_flight)
    }

    pub(crate) fn pipeline_inc(&self, task_id: &TaskId) {
        *self
            .pipeline_in_flight
            .lock()
            .entry(task_id.clone())
            .or_insert(0) += 1;
    }

    pub(crate) fn pipeline_dec(&self, task_id: &TaskId) {
        let mut in_flight = self.pipeline_in_flight.lock();
        if let Some(count) = in_flight.get_mut(task_id) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(task_id);
            }
        }
    }

    pub(crate) fn has_pipeline_in_flight(&self, task_id: &TaskId) -> bool {
        self.pipeline_in_flight.lock().contains_key(task_id)
    }

    /// Consume the task's lifecycle record (exactly-once).
    pub(crate) fn take_lifecycle(&self, task_id: &TaskId) -> Option<LifecycleRecord> {
        self.lifecycle_by_task.lock().remove(task_id)
    }

    /// Fresh agent id: `<type>:<task|->:<uniq>`.
    pub(crate) fn next_agent_id(&self, agent_type: AgentType, task_id: Option<&TaskId>) -> AgentId {
        let uniq = uuid::Uuid::new_v4().simple().to_string();
        AgentId::new(format!(
            "{}:{}:{}",
            agent_type,
            task_id.map(TaskId::as_str).unwrap_or("-"),
            &uniq[..8]
        ))
    }

    /// Mark an agent terminal, push the transition to the store
    /// (best-effort), and drop it from the registry.
    pub(crate) async fn finalize_agent(
        &self,
        record: &Arc<crate::registry::AgentRecord>,
        status: AgentStatus,
    ) {
        record.transition_if_active(status);
        if let Some(store_agent_id) = &record.store_agent_id {
            let update = oms_adapters::AgentStateUpdate {
                state: record.status().to_string(),
                usage: Some(record.usage()),
                last_activity_ms: Some(record.last_activity_ms()),
            };
            if let Err(error) = self.store.set_agent_state(store_agent_id, update).await {
                tracing::debug!(%error, agent = %record.id, "final agent state push failed");
            }
        }
        self.registry.remove(&record.id);
        self.steering.lock().remove(&record.id);
    }

    /// Post a comment, logging instead of failing.
    pub(crate) async fn comment_best_effort(&self, task_id: &TaskId, text: &str) {
        if let Err(error) = self.store.comment(task_id, text).await {
            tracing::debug!(%error, task = %task_id, "comment failed");
        }
    }
}

#[cfg(test)]
#[path = "../supervisor_tests/mod.rs"]
mod tests;
