// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory registry of live agents.
//!
//! The registry exclusively owns agent records; records leave only once
//! their status is terminal. Each record holds the sole strong reference to
//! its RPC client.

use oms_adapters::{AgentRpc, AgentStateUpdate, TaskStore};
use oms_core::time_fmt::now_epoch_ms;
use oms_core::{
    AgentEvent, AgentId, AgentStatus, AgentType, AgentUsage, SessionId, StoreAgentId, TaskId,
    ThinkingLevel,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on each agent's event ring buffer.
pub const EVENT_RING_CAPACITY: usize = 10_000;

/// One live agent: immutable identity plus mutable observable state.
pub struct AgentRecord {
    pub id: AgentId,
    pub agent_type: AgentType,
    pub task_id: Option<TaskId>,
    pub store_agent_id: Option<StoreAgentId>,
    pub rpc: Arc<dyn AgentRpc>,
    pub replica_dir: Option<PathBuf>,
    pub model: Option<String>,
    pub thinking: ThinkingLevel,
    pub spawned_at_ms: u64,
    status: Mutex<AgentStatus>,
    usage: Mutex<AgentUsage>,
    session_id: Mutex<Option<SessionId>>,
    last_activity_ms: Mutex<u64>,
    events: Mutex<VecDeque<AgentEvent>>,
}

impl AgentRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: AgentId,
        agent_type: AgentType,
        task_id: Option<TaskId>,
        store_agent_id: Option<StoreAgentId>,
        rpc: Arc<dyn AgentRpc>,
        replica_dir: Option<PathBuf>,
        model: Option<String>,
        thinking: ThinkingLevel,
    ) -> Arc<Self> {
        let now = now_epoch_ms();
        Arc::new(Self {
            id,
            agent_type,
            task_id,
            store_agent_id,
            rpc,
            replica_dir,
            model,
            thinking,
            spawned_at_ms: now,
            status: Mutex::new(AgentStatus::Spawning),
            usage: Mutex::new(AgentUsage::default()),
            session_id: Mutex::new(None),
            last_activity_ms: Mutex::new(now),
            events: Mutex::new(VecDeque::new()),
        })
    }

    pub fn status(&self) -> AgentStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: AgentStatus) {
        *self.status.lock() = status;
    }

    /// Set status only if the current one is non-terminal; returns whether
    /// the transition happened. Keeps a stop sweep's `Stopped` from being
    /// overwritten by a late `agent_end` handler.
    pub fn transition_if_active(&self, status: AgentStatus) -> bool {
        let mut current = self.status.lock();
        if current.is_terminal() {
            return false;
        }
        *current = status;
        true
    }

    pub fn is_active(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn usage(&self) -> AgentUsage {
        *self.usage.lock()
    }

    pub fn add_usage(&self, delta: &AgentUsage) {
        self.usage.lock().add(delta);
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.lock().clone().or_else(|| self.rpc.session_id())
    }

    pub fn set_session_id(&self, session_id: SessionId) {
        *self.session_id.lock() = Some(session_id);
    }

    pub fn last_activity_ms(&self) -> u64 {
        *self.last_activity_ms.lock()
    }

    pub fn touch(&self) {
        *self.last_activity_ms.lock() = now_epoch_ms();
    }

    pub fn push_event(&self, event: AgentEvent) {
        let mut events = self.events.lock();
        if events.len() >= EVENT_RING_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id.clone(),
            agent_type: self.agent_type,
            task_id: self.task_id.clone(),
            status: self.status(),
            usage: self.usage(),
            spawned_at_ms: self.spawned_at_ms,
            last_activity_ms: self.last_activity_ms(),
        }
    }
}

/// Snapshot of one agent's observable state.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub agent_type: AgentType,
    pub task_id: Option<TaskId>,
    pub status: AgentStatus,
    pub usage: AgentUsage,
    pub spawned_at_ms: u64,
    pub last_activity_ms: u64,
}

/// Registry of live agents plus the heartbeat that pushes their observable
/// state into the task store.
#[derive(Default)]
pub struct AgentRegistry {
    agents: Arc<Mutex<HashMap<AgentId, Arc<AgentRecord>>>>,
    heartbeat: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, record: Arc<AgentRecord>) {
        let mut agents = self.agents.lock();
        if agents.insert(record.id.clone(), record).is_some() {
            tracing::warn!("agent re-registered over an existing record");
        }
    }

    /// Remove an agent record. Only terminal agents should be removed.
    pub fn remove(&self, id: &AgentId) -> Option<Arc<AgentRecord>> {
        let removed = self.agents.lock().remove(id);
        if let Some(record) = &removed {
            if record.is_active() {
                tracing::warn!(agent = %id, status = %record.status(), "removed a non-terminal agent");
            }
        }
        removed
    }

    pub fn get(&self, id: &AgentId) -> Option<Arc<AgentRecord>> {
        self.agents.lock().get(id).cloned()
    }

    pub fn get_all(&self) -> Vec<Arc<AgentRecord>> {
        self.agents.lock().values().cloned().collect()
    }

    pub fn get_active(&self) -> Vec<Arc<AgentRecord>> {
        self.agents
            .lock()
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    pub fn get_by_task(&self, task_id: &TaskId) -> Vec<Arc<AgentRecord>> {
        self.agents
            .lock()
            .values()
            .filter(|a| a.task_id.as_ref() == Some(task_id))
            .cloned()
            .collect()
    }

    pub fn get_active_by_task(&self, task_id: &TaskId) -> Vec<Arc<AgentRecord>> {
        self.agents
            .lock()
            .values()
            .filter(|a| a.task_id.as_ref() == Some(task_id) && a.is_active())
            .cloned()
            .collect()
    }

    /// Active worker-class agent on a task, if any.
    pub fn active_worker_for_task(&self, task_id: &TaskId) -> Option<Arc<AgentRecord>> {
        self.get_active_by_task(task_id)
            .into_iter()
            .find(|a| a.agent_type.is_worker_class())
    }

    /// Count of active worker-class agents across all tasks.
    pub fn active_worker_count(&self) -> usize {
        self.agents
            .lock()
            .values()
            .filter(|a| a.is_active() && a.agent_type.is_worker_class())
            .count()
    }

    /// Active agent on a task matching a spawn-guard identity.
    pub fn active_by_guard(&self, guard: &str, task_id: &TaskId) -> Option<Arc<AgentRecord>> {
        self.agents
            .lock()
            .values()
            .find(|a| {
                a.is_active()
                    && a.task_id.as_ref() == Some(task_id)
                    && a.agent_type.guard_identity() == Some(guard)
            })
            .cloned()
    }

    pub fn push_event(&self, id: &AgentId, event: AgentEvent) {
        if let Some(record) = self.get(id) {
            record.touch();
            record.push_event(event);
        }
    }

    pub fn active_summaries(&self) -> Vec<AgentSummary> {
        let mut summaries: Vec<AgentSummary> = self
            .agents
            .lock()
            .values()
            .filter(|a| a.is_active())
            .map(|a| a.summary())
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Start the heartbeat task pushing usage and last-activity into the
    /// task store. A second call replaces the previous heartbeat.
    pub fn start_heartbeat<T: TaskStore>(&self, store: Arc<T>, interval: Duration) {
        let agents = Arc::clone(&self.agents);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                push_heartbeat(&*store, &heartbeat_entries_from(&agents)).await;
            }
        });
        if let Some(previous) = self.heartbeat.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the heartbeat, flushing one final update for every agent.
    pub async fn stop_heartbeat<T: TaskStore>(&self, store: Arc<T>) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
        push_heartbeat(&*store, &heartbeat_entries_from(&self.agents)).await;
    }
}

fn heartbeat_entries_from(
    agents: &Mutex<HashMap<AgentId, Arc<AgentRecord>>>,
) -> Vec<(StoreAgentId, AgentStateUpdate)> {
    agents
        .lock()
        .values()
        .filter_map(|record| {
            let store_agent_id = record.store_agent_id.clone()?;
            Some((
                store_agent_id,
                AgentStateUpdate {
                    state: record.status().to_string(),
                    usage: Some(record.usage()),
                    last_activity_ms: Some(record.last_activity_ms()),
                },
            ))
        })
        .collect()
}

async fn push_heartbeat<T: TaskStore>(store: &T, entries: &[(StoreAgentId, AgentStateUpdate)]) {
    for (store_agent_id, update) in entries {
        if let Err(error) = store.set_agent_state(store_agent_id, update.clone()).await {
            tracing::debug!(%error, agent = %store_agent_id, "heartbeat push failed");
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
