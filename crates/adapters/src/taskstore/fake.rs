// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory task store for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AgentStateUpdate, TaskStore, TaskStoreError};
use async_trait::async_trait;
use oms_core::{AgentId, AgentType, StoreAgentId, TaskId, TaskRef, TaskStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

/// Recorded call to FakeTaskStore
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Ready,
    Create(String),
    Show(TaskId),
    UpdateStatus(TaskId, TaskStatus),
    Comment(TaskId, String),
    Close(TaskId, String),
    Claim(TaskId),
    TryClaim(TaskId),
    CreateAgent(AgentId, AgentType),
    SetAgentState(StoreAgentId, String),
    SetSlot(TaskId, String, String),
    ClearSlot(TaskId, String),
}

#[derive(Default)]
struct FakeStoreState {
    tasks: HashMap<TaskId, TaskRef>,
    claimed: HashSet<TaskId>,
    calls: Vec<StoreCall>,
    /// Scripted results for get_in_progress_tasks_without_agent
    resume_candidates: Vec<TaskId>,
    /// Method names whose next call should fail
    fail_next: VecDeque<&'static str>,
    next_agent_seq: u64,
}

/// Fake task store: tasks live in memory, every call is recorded.
#[derive(Clone, Default)]
pub struct FakeTaskStore {
    inner: Arc<Mutex<FakeStoreState>>,
    dir: PathBuf,
}

impl FakeTaskStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeStoreState {
                next_agent_seq: 1,
                ..Default::default()
            })),
            dir: std::env::temp_dir(),
        }
    }

    /// Insert or replace a task.
    pub fn put_task(&self, task: TaskRef) {
        self.inner.lock().tasks.insert(task.id.clone(), task);
    }

    pub fn task(&self, id: &str) -> Option<TaskRef> {
        self.inner.lock().tasks.get(id).cloned()
    }

    pub fn task_status(&self, id: &str) -> Option<TaskStatus> {
        self.task(id).map(|t| t.status)
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    /// Comments posted on a task, in order.
    pub fn comments(&self, id: &str) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::Comment(task, text) if task == id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Close reasons recorded for a task.
    pub fn close_reasons(&self, id: &str) -> Vec<String> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::Close(task, reason) if task == id => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    /// Mark a task as already claimed so `try_claim` loses.
    pub fn preclaim(&self, id: &str) {
        self.inner.lock().claimed.insert(TaskId::new(id));
    }

    /// Script the resume-candidate list.
    pub fn set_resume_candidates(&self, ids: Vec<&str>) {
        self.inner.lock().resume_candidates = ids.into_iter().map(TaskId::new).collect();
    }

    /// Make the next call to `method` fail.
    pub fn fail_next(&self, method: &'static str) {
        self.inner.lock().fail_next.push_back(method);
    }

    fn check_fail(&self, method: &'static str) -> Result<(), TaskStoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_next.front() == Some(&method) {
            inner.fail_next.pop_front();
            return Err(TaskStoreError::CallFailed(format!(
                "scripted failure for {}",
                method
            )));
        }
        Ok(())
    }

    fn record(&self, call: StoreCall) {
        self.inner.lock().calls.push(call);
    }
}

#[async_trait]
impl TaskStore for FakeTaskStore {
    async fn ready(&self) -> Result<(), TaskStoreError> {
        self.record(StoreCall::Ready);
        self.check_fail("ready")
    }

    async fn create(&self, title: &str, description: &str) -> Result<TaskRef, TaskStoreError> {
        self.record(StoreCall::Create(title.to_string()));
        self.check_fail("create")?;
        let mut inner = self.inner.lock();
        let id = TaskId::new(format!("T{}", inner.tasks.len() + 1));
        let mut task = TaskRef::new(id.clone(), title, TaskStatus::Open);
        task.description = description.to_string();
        inner.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn show(&self, id: &TaskId) -> Result<TaskRef, TaskStoreError> {
        self.record(StoreCall::Show(id.clone()));
        self.check_fail("show")?;
        self.task(id.as_str())
            .ok_or_else(|| TaskStoreError::NotFound(id.clone()))
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<(), TaskStoreError> {
        self.record(StoreCall::UpdateStatus(id.clone(), status));
        self.check_fail("update_status")?;
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(id.as_str())
            .ok_or_else(|| TaskStoreError::NotFound(id.clone()))?;
        task.status = status;
        Ok(())
    }

    async fn comment(&self, id: &TaskId, text: &str) -> Result<(), TaskStoreError> {
        self.record(StoreCall::Comment(id.clone(), text.to_string()));
        self.check_fail("comment")
    }

    async fn close(&self, id: &TaskId, reason: &str) -> Result<(), TaskStoreError> {
        self.record(StoreCall::Close(id.clone(), reason.to_string()));
        self.check_fail("close")?;
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(id.as_str())
            .ok_or_else(|| TaskStoreError::NotFound(id.clone()))?;
        task.status = TaskStatus::Closed;
        Ok(())
    }

    async fn claim(&self, id: &TaskId) -> Result<(), TaskStoreError> {
        self.record(StoreCall::Claim(id.clone()));
        self.check_fail("claim")?;
        let mut inner = self.inner.lock();
        if !inner.claimed.insert(id.clone()) {
            return Err(TaskStoreError::CallFailed(format!(
                "task {} already claimed",
                id
            )));
        }
        if let Some(task) = inner.tasks.get_mut(id.as_str()) {
            task.status = TaskStatus::InProgress;
        }
        Ok(())
    }

    async fn try_claim(&self, id: &TaskId) -> Result<bool, TaskStoreError> {
        self.record(StoreCall::TryClaim(id.clone()));
        self.check_fail("try_claim")?;
        let mut inner = self.inner.lock();
        if !inner.claimed.insert(id.clone()) {
            return Ok(false);
        }
        if let Some(task) = inner.tasks.get_mut(id.as_str()) {
            task.status = TaskStatus::InProgress;
        }
        Ok(true)
    }

    async fn create_agent(
        &self,
        agent_id: &AgentId,
        agent_type: AgentType,
        _task_id: Option<&TaskId>,
    ) -> Result<StoreAgentId, TaskStoreError> {
        self.record(StoreCall::CreateAgent(agent_id.clone(), agent_type));
        self.check_fail("create_agent")?;
        let mut inner = self.inner.lock();
        let seq = inner.next_agent_seq;
        inner.next_agent_seq += 1;
        Ok(StoreAgentId::new(format!("sa-{}", seq)))
    }

    async fn set_agent_state(
        &self,
        store_agent_id: &StoreAgentId,
        update: AgentStateUpdate,
    ) -> Result<(), TaskStoreError> {
        self.record(StoreCall::SetAgentState(
            store_agent_id.clone(),
            update.state,
        ));
        self.check_fail("set_agent_state")
    }

    async fn set_slot(&self, id: &TaskId, slot: &str, value: &str) -> Result<(), TaskStoreError> {
        self.record(StoreCall::SetSlot(
            id.clone(),
            slot.to_string(),
            value.to_string(),
        ));
        self.check_fail("set_slot")
    }

    async fn clear_slot(&self, id: &TaskId, slot: &str) -> Result<(), TaskStoreError> {
        self.record(StoreCall::ClearSlot(id.clone(), slot.to_string()));
        self.check_fail("clear_slot")
    }

    fn working_dir(&self) -> PathBuf {
        self.dir.clone()
    }

    async fn get_next_tasks(&self, n: usize) -> Result<Vec<TaskRef>, TaskStoreError> {
        self.check_fail("get_next_tasks")?;
        let inner = self.inner.lock();
        let mut ready: Vec<TaskRef> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Open)
            .filter(|t| {
                t.depends_on_ids.iter().all(|dep| {
                    inner
                        .tasks
                        .get(dep.as_str())
                        .map_or(true, |d| d.status == TaskStatus::Closed)
                })
            })
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.id.cmp(&b.id));
        ready.truncate(n);
        Ok(ready)
    }

    async fn get_in_progress_tasks_without_agent(
        &self,
        n: usize,
    ) -> Result<Vec<TaskRef>, TaskStoreError> {
        self.check_fail("get_in_progress_tasks_without_agent")?;
        let inner = self.inner.lock();
        let candidates: Vec<TaskRef> = inner
            .resume_candidates
            .iter()
            .filter_map(|id| inner.tasks.get(id.as_str()))
            .filter(|t| t.status == TaskStatus::InProgress)
            .take(n)
            .cloned()
            .collect();
        Ok(candidates)
    }

    async fn find_tasks_unblocked_by(
        &self,
        id: &TaskId,
    ) -> Result<Vec<TaskRef>, TaskStoreError> {
        self.check_fail("find_tasks_unblocked_by")?;
        let inner = self.inner.lock();
        let mut unblocked: Vec<TaskRef> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Blocked)
            .filter(|t| t.depends_on_ids.iter().any(|dep| dep == id))
            .filter(|t| {
                t.depends_on_ids.iter().all(|dep| {
                    dep == id
                        || inner
                            .tasks
                            .get(dep.as_str())
                            .map_or(true, |d| d.status == TaskStatus::Closed)
                })
            })
            .cloned()
            .collect();
        unblocked.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(unblocked)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
