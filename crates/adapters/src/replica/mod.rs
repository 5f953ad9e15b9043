// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task workspace replicas.
//!
//! Each task gets an isolated view of the project root under
//! `<session_dir>/replica/<sanitized-task-id>`. On Linux with fuse-overlayfs
//! available that view is an overlay mount (writes land in `upper/`, the
//! agent works in `merged/`); elsewhere it is a filtered copy with absolute
//! symlinks for `node_modules` and `.git`. Merges back into the project root
//! run strictly serialized under [`MergeLock`].

mod copy;
mod overlay;

pub use copy::CopyReplicaStore;
pub use overlay::OverlayReplicaStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeReplicaStore;

use async_trait::async_trait;
use oms_core::TaskId;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Path prefixes never copied into a replica.
pub const EXCLUDED_PREFIXES: &[&str] = &[
    ".oms/",
    "node_modules/",
    ".git/",
    "target/",
    "dist/",
    "build/",
];

/// Errors from replica operations.
#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mount failed: {0}")]
    MountFailed(String),

    #[error("unmount failed: {0}")]
    UnmountFailed(String),

    #[error("replicas are disabled")]
    Disabled,
}

/// Per-task workspace replicas behind a platform-specific implementation.
#[async_trait]
pub trait ReplicaStore: Send + Sync + 'static {
    /// Whether replicas are enabled at all. When false, agents work in the
    /// project root and finisher closes skip the merge queue.
    fn enabled(&self) -> bool {
        true
    }

    /// Create the replica for a task (idempotent; concurrent callers for the
    /// same task collapse into one attempt). Returns the directory the agent
    /// should work in.
    async fn create(&self, task_id: &TaskId) -> Result<PathBuf, ReplicaError>;

    /// Tear down and remove the replica.
    async fn destroy(&self, task_id: &TaskId) -> Result<(), ReplicaError>;

    /// True iff a usable replica directory exists for the task.
    fn exists(&self, task_id: &TaskId) -> bool;

    /// Sanitized task ids present on disk.
    fn list(&self) -> Vec<String>;

    /// Root directory of the task's replica (not the working view).
    fn replica_dir(&self, task_id: &TaskId) -> PathBuf;

    /// Directory an agent should use as cwd for this task's replica.
    fn work_dir(&self, task_id: &TaskId) -> PathBuf;
}

/// Store used when replicas are disabled by configuration.
#[derive(Clone, Default)]
pub struct DisabledReplicaStore;

#[async_trait]
impl ReplicaStore for DisabledReplicaStore {
    fn enabled(&self) -> bool {
        false
    }

    async fn create(&self, _task_id: &TaskId) -> Result<PathBuf, ReplicaError> {
        Err(ReplicaError::Disabled)
    }

    async fn destroy(&self, _task_id: &TaskId) -> Result<(), ReplicaError> {
        Ok(())
    }

    fn exists(&self, _task_id: &TaskId) -> bool {
        false
    }

    fn list(&self) -> Vec<String> {
        Vec::new()
    }

    fn replica_dir(&self, _task_id: &TaskId) -> PathBuf {
        PathBuf::new()
    }

    fn work_dir(&self, _task_id: &TaskId) -> PathBuf {
        PathBuf::new()
    }
}

/// Pick the replica implementation for this platform.
///
/// Linux with a fuse-overlayfs binary on PATH gets overlay mounts; everything
/// else gets filtered copies.
pub fn select_replica_store(
    project_root: PathBuf,
    replica_root: PathBuf,
    enabled: bool,
) -> Arc<dyn ReplicaStore> {
    if !enabled {
        return Arc::new(DisabledReplicaStore);
    }
    if cfg!(target_os = "linux") {
        if let Some(binary) = crate::subprocess::find_in_path("fuse-overlayfs") {
            return Arc::new(OverlayReplicaStore::new(project_root, replica_root, binary));
        }
    }
    Arc::new(CopyReplicaStore::new(project_root, replica_root))
}

/// Map a task id to a filesystem-safe directory name.
///
/// Keeps `[a-zA-Z0-9-_]`, replaces everything else with `-`, collapses runs,
/// and caps the length.
pub fn sanitize_task_id(task_id: &str) -> String {
    let sanitized: String = task_id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        })
        .collect();

    let collapsed = sanitized
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if collapsed.len() <= 64 {
        collapsed
    } else {
        collapsed[..64].trim_end_matches('-').to_string()
    }
}

/// FIFO mutex serializing merges into the project root.
///
/// Backed by `tokio::sync::Mutex`, whose wait queue is first-in first-out,
/// which is what gives merges their strict ordering.
#[derive(Clone, Default)]
pub struct MergeLock {
    inner: Arc<tokio::sync::Mutex<()>>,
}

impl MergeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the merge lock. Failures propagate but do not
    /// hold the lock.
    pub async fn with_merge_lock<T, F, Fut>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.inner.lock().await;
        f().await
    }

    /// Acquire the lock as an owned guard, for holders whose critical
    /// section spans an agent's whole lifetime rather than one closure.
    pub async fn lock_owned(&self) -> tokio::sync::OwnedMutexGuard<()> {
        Arc::clone(&self.inner).lock_owned().await
    }
}

/// Per-task single-flight guard used by replica implementations so two
/// concurrent `create` calls for one task collapse into one attempt.
#[derive(Default)]
pub(crate) struct CreateGuards {
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CreateGuards {
    pub(crate) fn for_task(&self, sanitized: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(sanitized.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

/// Shared helper: list sanitized ids present under a replica root.
pub(crate) fn list_replica_dirs(replica_root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(replica_root) {
        Ok(entries) => entries,
        Err(_) => return out,
    };
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                out.push(name.to_string());
            }
        }
    }
    out.sort();
    out
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
