// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filtered-copy replica implementation (the portable fallback).

use super::{
    list_replica_dirs, sanitize_task_id, CreateGuards, ReplicaError, ReplicaStore,
    EXCLUDED_PREFIXES,
};
use async_trait::async_trait;
use oms_core::TaskId;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Replica store that copies the project tree, excluding heavyweight
/// prefixes, and symlinks `node_modules` and `.git` back to the project root.
pub struct CopyReplicaStore {
    project_root: PathBuf,
    replica_root: PathBuf,
    excluded: Vec<String>,
    guards: CreateGuards,
}

impl CopyReplicaStore {
    pub fn new(project_root: PathBuf, replica_root: PathBuf) -> Self {
        Self {
            project_root,
            replica_root,
            excluded: EXCLUDED_PREFIXES.iter().map(|s| s.to_string()).collect(),
            guards: CreateGuards::default(),
        }
    }

    fn dir_for(&self, task_id: &TaskId) -> PathBuf {
        self.replica_root.join(sanitize_task_id(task_id.as_str()))
    }
}

#[async_trait]
impl ReplicaStore for CopyReplicaStore {
    async fn create(&self, task_id: &TaskId) -> Result<PathBuf, ReplicaError> {
        let sanitized = sanitize_task_id(task_id.as_str());
        let guard = self.guards.for_task(&sanitized);
        let _held = guard.lock().await;

        let dest = self.dir_for(task_id);
        if dest.is_dir() {
            return Ok(dest);
        }

        let project_root = self.project_root.clone();
        let excluded = self.excluded.clone();
        let dest_clone = dest.clone();
        tokio::task::spawn_blocking(move || {
            copy_filtered(&project_root, &dest_clone, &excluded)?;
            link_back(&project_root, &dest_clone)
        })
        .await
        .map_err(|e| ReplicaError::MountFailed(format!("copy task panicked: {}", e)))??;

        Ok(dest)
    }

    async fn destroy(&self, task_id: &TaskId) -> Result<(), ReplicaError> {
        let dir = self.dir_for(task_id);
        if dir.is_dir() {
            tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&dir))
                .await
                .map_err(|e| ReplicaError::MountFailed(format!("remove task panicked: {}", e)))??;
        }
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
        // The copy itself is the working view
        self.dir_for(task_id)
    }
}

/// Copy `src` into `dest`, skipping excluded prefixes (paths relative to
/// `src`, with a trailing slash on directories).
fn copy_filtered(src: &Path, dest: &Path, excluded: &[String]) -> Result<(), ReplicaError> {
    std::fs::create_dir_all(dest)?;
    copy_dir(src, dest, src, excluded)
}

fn copy_dir(
    dir: &Path,
    dest: &Path,
    root: &Path,
    excluded: &[String],
) -> Result<(), ReplicaError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let relative = match path.strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        let file_type = entry.file_type()?;

        let mut rel_str = relative.to_string_lossy().into_owned();
        if file_type.is_dir() {
            rel_str.push('/');
        }
        if excluded.iter().any(|prefix| rel_str.starts_with(prefix)) {
            continue;
        }

        let target = dest.join(&relative);
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_dir(&path, dest, root, excluded)?;
        } else if file_type.is_symlink() {
            // Preserve symlinks as-is where possible
            if let Ok(link) = std::fs::read_link(&path) {
                #[cfg(unix)]
                let _ = std::os::unix::fs::symlink(&link, &target);
            }
        } else {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

/// Symlink `node_modules` and `.git` back into the project root so tooling
/// inside the replica still resolves dependencies and history.
fn link_back(project_root: &Path, dest: &Path) -> Result<(), ReplicaError> {
    for name in ["node_modules", ".git"] {
        let source = project_root.join(name);
        if !source.exists() {
            continue;
        }
        let link = dest.join(name);
        if link.exists() {
            continue;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&source, &link)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "copy_tests.rs"]
mod tests;
