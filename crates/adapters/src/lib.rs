// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: child-process RPC, the task store, workspace
//! replicas, and the inbound control socket.

pub mod control;
pub mod replica;
pub mod rpc;
pub mod subprocess;
pub mod taskstore;

pub use control::ControlListener;
pub use replica::{
    select_replica_store, sanitize_task_id, CopyReplicaStore, DisabledReplicaStore, MergeLock,
    OverlayReplicaStore, ReplicaError, ReplicaStore,
};
pub use rpc::{AgentLauncher, AgentRpc, LaunchSpec, ProcessLauncher, RpcError};
pub use taskstore::{
    AgentStateUpdate, CommandTaskStore, CommandTaskStoreConfig, TaskStore, TaskStoreError,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use rpc::{FakeLauncher, FakeRpc};
#[cfg(any(test, feature = "test-support"))]
pub use taskstore::{FakeTaskStore, StoreCall};
#[cfg(any(test, feature = "test-support"))]
pub use replica::FakeReplicaStore;
