// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overlay-mount replica implementation (Linux + fuse-overlayfs).

use super::{list_replica_dirs, sanitize_task_id, CreateGuards, ReplicaError, ReplicaStore};
use crate::subprocess::{run_with_timeout, MOUNT_TIMEOUT};
use async_trait::async_trait;
use oms_core::TaskId;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Replica store backed by fuse-overlayfs mounts.
///
/// Layout per task: `<replica_root>/<sanitized>/{upper,work,merged}` with
/// lower = project root. The agent works in `merged/`; its writes land in
/// `upper/`.
pub struct OverlayReplicaStore {
    project_root: PathBuf,
    replica_root: PathBuf,
    /// Path to the fuse-overlayfs binary
    binary: PathBuf,
    guards: CreateGuards,
}

impl OverlayReplicaStore {
    pub fn new(project_root: PathBuf, replica_root: PathBuf, binary: PathBuf) -> Self {
        Self {
            project_root,
            replica_root,
            binary,
            guards: CreateGuards::default(),
        }
    }

    fn dir_for(&self, task_id: &TaskId) -> PathBuf {
        self.replica_root.join(sanitize_task_id(task_id.as_str()))
    }

    async fn mount(&self, dir: &Path) -> Result<(), ReplicaError> {
        let upper = dir.join("upper");
        let work = dir.join("work");
        let merged = dir.join("merged");
        for sub in [&upper, &work, &merged] {
            std::fs::create_dir_all(sub)?;
        }

        let options = format!(
            "lowerdir={},upperdir={},workdir={}",
            self.project_root.display(),
            upper.display(),
            work.display()
        );
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-o").arg(&options).arg(&merged);
        let output = run_with_timeout(cmd, MOUNT_TIMEOUT, "fuse-overlayfs mount")
            .await
            .map_err(ReplicaError::MountFailed)?;
        if !output.status.success() {
            return Err(ReplicaError::MountFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }

    async fn unmount(&self, dir: &Path) -> Result<(), ReplicaError> {
        let merged = dir.join("merged");
        if !merged.is_dir() {
            return Ok(());
        }
        let mut cmd = Command::new("fusermount");
        cmd.arg("-u").arg(&merged);
        match run_with_timeout(cmd, MOUNT_TIMEOUT, "fusermount -u").await {
            Ok(output) if output.status.success() => Ok(()),
            // Not mounted (already unmounted or a stale dir) is fine; a live
            // mount we cannot release is not.
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if stderr.contains("not mounted") || stderr.contains("not found") {
                    Ok(())
                } else {
                    Err(ReplicaError::UnmountFailed(stderr))
                }
            }
            Err(error) => Err(ReplicaError::UnmountFailed(error)),
        }
    }
}

#[async_trait]
impl ReplicaStore for OverlayReplicaStore {
    async fn create(&self, task_id: &TaskId) -> Result<PathBuf, ReplicaError> {
        let sanitized = sanitize_task_id(task_id.as_str());
        let guard = self.guards.for_task(&sanitized);
        let _held = guard.lock().await;

        let dir = self.dir_for(task_id);
        let merged = dir.join("merged");
        if is_mounted(&merged) {
            return Ok(merged);
        }

        self.mount(&dir).await?;
        Ok(merged)
    }

    async fn destroy(&self, task_id: &TaskId) -> Result<(), ReplicaError> {
        let dir = self.dir_for(task_id);
        if !dir.is_dir() {
            return Ok(());
        }
        self.unmount(&dir).await?;
        let to_remove = dir.clone();
        tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&to_remove))
            .await
            .map_err(|e| ReplicaError::UnmountFailed(format!("remove task panicked: {}", e)))??;
        Ok(())
    }

    fn exists(&self, task_id: &TaskId) -> bool {
        self.dir_for(task_id).is_dir()
    }

    fn list(&self) -> Vec<String> {
        list_replica_dirs(&self.replica_root)
    }

    fn replica_dir(&self, task_id: &TaskId) -> PathBuf {
        self.dir_for(task_id)
    }

    fn work_dir(&self, task_id: &TaskId) -> PathBuf {
        self.dir_for(task_id).join("merged")
    }
}

/// Best-effort mounted check: a live overlay shows up in /proc/mounts.
fn is_mounted(merged: &Path) -> bool {
    let mounts = match std::fs::read_to_string("/proc/mounts") {
        Ok(mounts) => mounts,
        Err(_) => return false,
    };
    let needle = merged.to_string_lossy();
    mounts.lines().any(|line| line.contains(needle.as_ref()))
}
