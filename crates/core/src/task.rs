// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task references as read from the external task store.
//!
//! Status transitions are the store's responsibility; the supervisor only
//! reads and writes them through the narrow `TaskStore` interface.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Identifier of a task in the external store.
    pub struct TaskId;
}

/// Store-side status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
    Deferred,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Closed => "closed",
            TaskStatus::Deferred => "deferred",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared size of a task. Tiny-scope tasks take the speedy fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskScope {
    Tiny,
    Small,
    #[default]
    Medium,
    Large,
    /// Store-side scopes this supervisor does not know about
    #[serde(other)]
    Unknown,
}

impl TaskScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskScope::Tiny => "tiny",
            TaskScope::Small => "small",
            TaskScope::Medium => "medium",
            TaskScope::Large => "large",
            TaskScope::Unknown => "unknown",
        }
    }
}

/// A task as surfaced by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub depends_on_ids: Vec<TaskId>,
    pub status: TaskStatus,
    #[serde(default)]
    pub scope: TaskScope,
}

impl TaskRef {
    /// Minimal constructor used by tests and the fake store.
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            acceptance: String::new(),
            labels: Vec::new(),
            depends_on_ids: Vec::new(),
            status,
            scope: TaskScope::default(),
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
