// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake replica store for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{sanitize_task_id, ReplicaError, ReplicaStore};
use async_trait::async_trait;
use oms_core::TaskId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// In-memory replica store recording creates and destroys.
#[derive(Clone)]
pub struct FakeReplicaStore {
    enabled: bool,
    inner: Arc<Mutex<FakeReplicaState>>,
}

#[derive(Default)]
struct FakeReplicaState {
    replicas: BTreeSet<String>,
    created: Vec<String>,
    destroyed: Vec<String>,
}

impl FakeReplicaStore {
    pub fn new() -> Self {
        Self {
            enabled: true,
            inner: Arc::new(Mutex::new(FakeReplicaState::default())),
        }
    }

    /// A store that reports replicas disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            inner: Arc::new(Mutex::new(FakeReplicaState::default())),
        }
    }

    /// Pretend a replica already exists on disk (e.g. for startup recovery).
    pub fn seed(&self, task_id: &str) {
        self.inner
            .lock()
            .replicas
            .insert(sanitize_task_id(task_id));
    }

    /// Sanitized ids destroyed so far, in order.
    pub fn destroyed(&self) -> Vec<String> {
        self.inner.lock().destroyed.clone()
    }

    /// Sanitized ids created so far, in order.
    pub fn created(&self) -> Vec<String> {
        self.inner.lock().created.clone()
    }
}

impl Default for FakeReplicaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplicaStore for FakeReplicaStore {
    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn create(&self, task_id: &TaskId) -> Result<PathBuf, ReplicaError> {
        if !self.enabled {
            return Err(ReplicaError::Disabled);
        }
        let sanitized = sanitize_task_id(task_id.as_str());
        let mut inner = self.inner.lock();
        if inner.replicas.insert(sanitized.clone()) {
            inner.created.push(sanitized.clone());
        }
        Ok(self.work_dir(task_id))
    }

    async fn destroy(&self, task_id: &TaskId) -> Result<(), ReplicaError> {
        let sanitized = sanitize_task_id(task_id.as_str());
        let mut inner = self.inner.lock();
        if inner.replicas.remove(&sanitized) {
            inner.destroyed.push(sanitized);
        }
        Ok(())
    }

    fn exists(&self, task_id: &TaskId) -> bool {
        self.inner
            .lock()
            .replicas
            .contains(&sanitize_task_id(task_id.as_str()))
    }

    fn list(&self) -> Vec<String> {
        self.inner.lock().replicas.iter().cloned().collect()
    }

    fn replica_dir(&self, task_id: &TaskId) -> PathBuf {
        PathBuf::from("/fake/replica").join(sanitize_task_id(task_id.as_str()))
    }

    fn work_dir(&self, task_id: &TaskId) -> PathBuf {
        self.replica_dir(task_id).join("merged")
    }
}
