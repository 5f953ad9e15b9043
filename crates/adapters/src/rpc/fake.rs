// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake RPC client and launcher for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AgentLauncher, AgentRpc, EventHub, LaunchSpec, RpcError, StderrContext};
use async_trait::async_trait;
use oms_core::rpc::{RpcCommand, RpcEvent};
use oms_core::SessionId;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Scripted RPC handle. Records every command; tests drive its events.
pub struct FakeRpc {
    label: String,
    hub: Arc<EventHub>,
    running: AtomicBool,
    commands: Mutex<Vec<RpcCommand>>,
    responses: Mutex<HashMap<&'static str, VecDeque<Result<Option<Value>, String>>>>,
}

impl FakeRpc {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            hub: Arc::new(EventHub::new()),
            running: AtomicBool::new(true),
            commands: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
        })
    }

    /// All commands sent so far.
    pub fn commands(&self) -> Vec<RpcCommand> {
        self.commands.lock().clone()
    }

    /// Names of all commands sent so far.
    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands.lock().iter().map(|c| c.name()).collect()
    }

    /// Queue a scripted response for the next command with this name.
    pub fn push_response(&self, command: &'static str, response: Result<Option<Value>, String>) {
        self.responses
            .lock()
            .entry(command)
            .or_default()
            .push_back(response);
    }

    /// Dispatch an event to subscribers and waiters.
    pub fn emit(&self, event: RpcEvent) {
        self.hub.dispatch(event);
    }

    /// End the agent's current turn.
    pub fn end_turn(&self) {
        self.emit(RpcEvent::AgentEnd { data: json!({}) });
    }

    /// End the current turn with an event payload.
    pub fn end_turn_with(&self, data: Value) {
        self.emit(RpcEvent::AgentEnd { data });
    }

    /// Simulate the child process exiting.
    pub fn exit(&self, code: Option<i32>) {
        self.running.store(false, Ordering::SeqCst);
        self.emit(RpcEvent::RpcExit { code, error: None });
    }

    /// Wait (polling) until a command with this name has been sent.
    pub async fn wait_for_command(&self, command: &str) {
        loop {
            if self.commands.lock().iter().any(|c| c.name() == command) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Count of commands with this name sent so far.
    pub fn count_command(&self, command: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.name() == command)
            .count()
    }
}

#[async_trait]
impl AgentRpc for FakeRpc {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> Option<SessionId> {
        self.hub.session_id()
    }

    fn cache_session_id(&self, session_id: SessionId) {
        self.hub.cache_session_id(session_id);
    }

    async fn send(&self, command: RpcCommand) -> Result<Option<Value>, RpcError> {
        if !self.is_running() {
            return Err(RpcError::Exited {
                code: None,
                stderr: StderrContext::default(),
            });
        }
        let name = command.name();
        self.commands.lock().push(command);
        let scripted = self
            .responses
            .lock()
            .get_mut(name)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(data)) => {
                if let Some(data) = &data {
                    self.hub.observe_frame(data);
                }
                Ok(data)
            }
            Some(Err(error)) => Err(RpcError::CommandFailed {
                command: name,
                error,
                stderr: StderrContext::default(),
            }),
            None => Ok(None),
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<RpcEvent> {
        self.hub.subscribe()
    }

    fn suppress_next_agent_end(&self) {
        self.hub.suppress_next_agent_end();
    }

    async fn wait_for_agent_end(&self, timeout: Duration) -> Result<Value, RpcError> {
        if !self.is_running() && self.hub.has_exited() {
            return Err(RpcError::Exited {
                code: None,
                stderr: StderrContext::default(),
            });
        }
        let rx = self.hub.register_end_waiter()?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::Exited {
                code: None,
                stderr: StderrContext::default(),
            }),
            Err(_elapsed) => Err(RpcError::Timeout {
                command: "wait_for_agent_end",
                after: timeout,
                stderr: StderrContext::default(),
            }),
        }
    }

    async fn stop(&self, _timeout: Duration) -> Result<(), RpcError> {
        if self.running.swap(false, Ordering::SeqCst) {
            self.emit(RpcEvent::RpcExit {
                code: Some(0),
                error: None,
            });
        }
        Ok(())
    }

    fn force_kill(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.emit(RpcEvent::RpcExit {
                code: None,
                error: None,
            });
        }
    }
}

#[derive(Default)]
struct LauncherState {
    launches: Vec<(LaunchSpec, Arc<FakeRpc>)>,
    launch_errors: VecDeque<String>,
}

/// Launcher returning fake handles; records every launch.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    inner: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All launches so far, in order.
    pub fn launches(&self) -> Vec<(LaunchSpec, Arc<FakeRpc>)> {
        self.inner.lock().launches.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.inner.lock().launches.len()
    }

    /// Queue an error for the next launch.
    pub fn push_launch_error(&self, error: impl Into<String>) {
        self.inner.lock().launch_errors.push_back(error.into());
    }

    /// Wait (polling) for the `n`th launch (0-based) and return it.
    pub async fn nth_launch(&self, n: usize) -> (LaunchSpec, Arc<FakeRpc>) {
        loop {
            {
                let inner = self.inner.lock();
                if let Some(entry) = inner.launches.get(n) {
                    return entry.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[async_trait]
impl AgentLauncher for FakeLauncher {
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn AgentRpc>, RpcError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.launch_errors.pop_front() {
            return Err(RpcError::SpawnFailed(std::io::Error::other(error)));
        }
        let rpc = FakeRpc::new(spec.label.clone());
        inner.launches.push((spec, Arc::clone(&rpc)));
        Ok(rpc)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
