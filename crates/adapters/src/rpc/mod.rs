// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent stdio RPC.
//!
//! Each live agent is one child process speaking line-delimited JSON on
//! stdin/stdout. `AgentRpc` is the handle the supervisor holds; `ProcessRpc`
//! is the real implementation, `FakeRpc` the scripted one for tests. The
//! `AgentLauncher` seam lets the engine stay generic over how children are
//! actually started.

mod hub;
mod process;

pub use hub::EventHub;
pub use process::{ProcessLauncher, ProcessRpc};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLauncher, FakeRpc};

use async_trait::async_trait;
use oms_core::rpc::{RpcCommand, RpcEvent};
use oms_core::{AgentMessage, SessionId, ThinkingLevel};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default per-request timeout.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes of stderr kept for error context (newest bytes win).
pub const STDERR_TAIL_BYTES: usize = 50 * 1024;

/// Errors from agent RPC operations. Every error surfaced by a live client
/// carries the newest stderr bytes from the child.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("spawn failed: {0}")]
    SpawnFailed(std::io::Error),

    #[error("rpc already started")]
    AlreadyStarted,

    #[error("rpc not started")]
    NotStarted,

    #[error("write to agent stdin failed: {error}{stderr}")]
    WriteFailed {
        error: std::io::Error,
        stderr: StderrContext,
    },

    #[error("{command} timed out after {}s{stderr}", .after.as_secs())]
    Timeout {
        command: &'static str,
        after: Duration,
        stderr: StderrContext,
    },

    #[error("{command} failed: {error}{stderr}")]
    CommandFailed {
        command: &'static str,
        error: String,
        stderr: StderrContext,
    },

    #[error("agent process exited{}{stderr}", fmt_exit_code(.code))]
    Exited {
        code: Option<i32>,
        stderr: StderrContext,
    },

    #[error("agent stopped{stderr}")]
    Stopped { stderr: StderrContext },
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with code {}", code),
        None => String::new(),
    }
}

/// Newest stderr bytes of a child, rendered after the error message.
#[derive(Debug, Clone, Default)]
pub struct StderrContext(pub String);

impl std::fmt::Display for StderrContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            write!(f, "\nstderr (tail):\n{}", self.0)
        }
    }
}

/// Handle to one agent child process.
#[async_trait]
pub trait AgentRpc: Send + Sync {
    /// Stable label for logs (the agent id).
    fn label(&self) -> &str;

    /// Whether the child process is still alive.
    fn is_running(&self) -> bool;

    /// Cached LLM session id, if one has been observed.
    fn session_id(&self) -> Option<SessionId>;

    /// Cache a session id learnt out-of-band.
    fn cache_session_id(&self, session_id: SessionId);

    /// Send a command and wait for its response `data`.
    async fn send(&self, command: RpcCommand) -> Result<Option<Value>, RpcError>;

    /// Subscribe to the event fan-out.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<RpcEvent>;

    /// Consume the next `agent_end` without resolving any waiter.
    ///
    /// Used when an abort + re-prompt counts as one logical interrupt: the
    /// first `agent_end` belongs to the aborted turn. Suppressions are FIFO
    /// and applied before fan-out.
    fn suppress_next_agent_end(&self);

    /// Resolve at the first non-suppressed `agent_end`; error on process
    /// exit or timeout.
    async fn wait_for_agent_end(&self, timeout: Duration) -> Result<Value, RpcError>;

    /// Terminate gracefully: signal the child, await exit up to `timeout`,
    /// fail all pending requests. Idempotent.
    async fn stop(&self, timeout: Duration) -> Result<(), RpcError>;

    /// Kill immediately without waiting. Idempotent.
    fn force_kill(&self);

    // --- convenience commands ---

    async fn prompt(&self, message: &str) -> Result<(), RpcError> {
        self.send(RpcCommand::Prompt {
            message: message.to_string(),
        })
        .await
        .map(drop)
    }

    async fn follow_up(&self, message: &str) -> Result<(), RpcError> {
        self.send(RpcCommand::FollowUp {
            message: message.to_string(),
        })
        .await
        .map(drop)
    }

    async fn steer(&self, message: &str) -> Result<(), RpcError> {
        self.send(RpcCommand::Steer {
            message: message.to_string(),
        })
        .await
        .map(drop)
    }

    async fn abort(&self) -> Result<(), RpcError> {
        self.send(RpcCommand::Abort).await.map(drop)
    }

    async fn abort_and_prompt(&self, message: &str) -> Result<(), RpcError> {
        self.send(RpcCommand::AbortAndPrompt {
            message: message.to_string(),
        })
        .await
        .map(drop)
    }

    async fn get_state(&self) -> Result<Option<Value>, RpcError> {
        self.send(RpcCommand::GetState).await
    }

    async fn get_messages(&self) -> Result<Vec<AgentMessage>, RpcError> {
        let data = self.send(RpcCommand::GetMessages).await?;
        Ok(data
            .and_then(|d| {
                let messages = d.get("messages").cloned().unwrap_or(d);
                serde_json::from_value(messages).ok()
            })
            .unwrap_or_default())
    }

    async fn get_last_assistant_text(&self) -> Result<Option<String>, RpcError> {
        let data = self.send(RpcCommand::GetLastAssistantText).await?;
        Ok(data.and_then(|d| match d {
            Value::String(s) => Some(s),
            other => other
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }

    async fn set_thinking_level(&self, level: ThinkingLevel) -> Result<(), RpcError> {
        self.send(RpcCommand::SetThinkingLevel { level })
            .await
            .map(drop)
    }

    /// Probe the child for its session id, falling back to `get_state`,
    /// and cache whatever turns up.
    async fn refresh_session_id(&self) -> Option<SessionId> {
        if let Ok(Some(data)) = self.send(RpcCommand::GetSessionId).await {
            if let Some(sid) = oms_core::rpc::extract_session_id(&data) {
                let sid = SessionId::new(sid);
                self.cache_session_id(sid.clone());
                return Some(sid);
            }
        }
        if let Ok(Some(data)) = self.get_state().await {
            if let Some(sid) = oms_core::rpc::extract_session_id(&data) {
                let sid = SessionId::new(sid);
                self.cache_session_id(sid.clone());
                return Some(sid);
            }
        }
        self.session_id()
    }
}

/// Everything needed to start one agent child process.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    /// Label used in logs and errors (the agent id)
    pub label: String,
    /// Binary to execute (the LLM CLI)
    pub program: String,
    /// Arguments after the fixed `--mode rpc`
    pub args: Vec<String>,
    /// Extra environment for the child
    pub env: Vec<(String, String)>,
    /// Working directory (project root or replica)
    pub cwd: PathBuf,
}

/// Seam for starting agent processes; the engine is generic over this.
#[async_trait]
pub trait AgentLauncher: Clone + Send + Sync + 'static {
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn AgentRpc>, RpcError>;
}
