// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the supervisor behavior suite.

mod complaints_flow;
mod happy_path;
mod lifecycle_flow;
mod merging;
mod recovery;
mod slots;
mod steering_flow;
mod stopping;

use super::spawn::{PromptSource, SpawnRequest};
use super::{Supervisor, SupervisorConfig, SupervisorDeps};
use oms_adapters::{
    AgentRpc, FakeLauncher, FakeReplicaStore, FakeRpc, FakeTaskStore, LaunchSpec, ReplicaStore,
    TaskStore,
};
use oms_core::rpc::RpcCommand;
use oms_core::{FakeClock, LifecycleInput, TaskRef, TaskScope, TaskStatus};
use std::sync::Arc;
use std::time::Duration;

pub(crate) type TestSupervisor = Supervisor<FakeLauncher, FakeTaskStore, FakeClock>;

pub(crate) struct TestContext {
    pub sup: Arc<TestSupervisor>,
    pub launcher: FakeLauncher,
    pub store: Arc<FakeTaskStore>,
    pub replicas: Arc<FakeReplicaStore>,
    pub clock: FakeClock,
    _dir: tempfile::TempDir,
}

/// Context with replicas disabled (most scenarios).
pub(crate) fn setup() -> TestContext {
    setup_inner(FakeReplicaStore::disabled())
}

/// Context with replicas enabled (merge scenarios).
pub(crate) fn setup_with_replicas() -> TestContext {
    setup_inner(FakeReplicaStore::new())
}

fn setup_inner(replicas: FakeReplicaStore) -> TestContext {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {}", e));
    let launcher = FakeLauncher::new();
    let store = Arc::new(FakeTaskStore::new());
    let replicas = Arc::new(replicas);
    let clock = FakeClock::new();
    let config = SupervisorConfig::new(
        dir.path().to_path_buf(),
        dir.path().join("project"),
    );
    let sup = Supervisor::new(
        SupervisorDeps {
            launcher: launcher.clone(),
            store: Arc::clone(&store),
            replicas: Arc::clone(&replicas) as Arc<dyn ReplicaStore>,
        },
        clock.clone(),
        config,
    );
    TestContext {
        sup,
        launcher,
        store,
        replicas,
        clock,
        _dir: dir,
    }
}

pub(crate) fn task(id: &str, scope: TaskScope) -> TaskRef {
    let mut task = TaskRef::new(id, format!("task {}", id), TaskStatus::Open);
    task.scope = scope;
    task
}

pub(crate) fn in_progress_task(id: &str) -> TaskRef {
    let mut t = task(id, TaskScope::Small);
    t.status = TaskStatus::InProgress;
    t
}

/// Build an `advance_lifecycle` payload.
pub(crate) fn lc(agent_type: &str, task_id: &str, action: &str, target: Option<&str>) -> LifecycleInput {
    LifecycleInput {
        agent_type: agent_type.to_string(),
        task_id: task_id.to_string(),
        action: action.to_string(),
        target: target.map(str::to_string),
        message: None,
        reason: None,
        agent_id: None,
    }
}

pub(crate) fn lc_with(
    agent_type: &str,
    task_id: &str,
    action: &str,
    target: Option<&str>,
    message: &str,
    reason: &str,
) -> LifecycleInput {
    let mut input = lc(agent_type, task_id, action, target);
    input.message = Some(message.to_string());
    input.reason = Some(reason.to_string());
    input
}

/// The initial prompt a fake agent received.
pub(crate) fn first_prompt(rpc: &FakeRpc) -> String {
    rpc.commands()
        .into_iter()
        .find_map(|command| match command {
            RpcCommand::Prompt { message } => Some(message),
            _ => None,
        })
        .unwrap_or_default()
}

/// Await the nth launch with a deadline.
pub(crate) async fn nth_launch(ctx: &TestContext, n: usize) -> (LaunchSpec, Arc<FakeRpc>) {
    match tokio::time::timeout(Duration::from_secs(5), ctx.launcher.nth_launch(n)).await {
        Ok(launch) => launch,
        Err(_) => panic!("launch {} never happened", n),
    }
}

/// Poll until `cond` holds or the deadline passes.
pub(crate) async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if cond() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Brief pause that must NOT produce more launches.
pub(crate) async fn assert_no_more_launches(ctx: &TestContext, expected: usize) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        ctx.launcher.launch_count(),
        expected,
        "unexpected extra launches: {:?}",
        ctx.launcher
            .launches()
            .iter()
            .map(|(spec, _)| spec.label.clone())
            .collect::<Vec<_>>()
    );
}
