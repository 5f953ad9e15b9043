// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types

use oms_adapters::{ReplicaError, RpcError, TaskStoreError};
use oms_core::{LifecycleRejection, TaskId};
use thiserror::Error;

/// Errors surfaced by the supervisor engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("task {0} could not be claimed")]
    ClaimLost(TaskId),

    #[error("agent spawn failed: {0}")]
    Spawn(#[from] RpcError),

    #[error("task store: {0}")]
    Store(#[from] TaskStoreError),

    #[error("replica: {0}")]
    Replica(#[from] ReplicaError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleRejection),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}
