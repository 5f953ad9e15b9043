// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real RPC client wrapping one LLM CLI child process.

use super::{AgentLauncher, AgentRpc, EventHub, LaunchSpec, RpcError, StderrContext};
use super::{SEND_TIMEOUT, STDERR_TAIL_BYTES};
use async_trait::async_trait;
use oms_core::rpc::{InboundFrame, RpcCommand, RpcEvent, RpcRequest};
use oms_core::SessionId;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};

type PendingSender = oneshot::Sender<Result<Option<Value>, RpcError>>;

/// Bounded tail of a child's stderr, keeping the newest bytes.
#[derive(Default)]
pub(crate) struct StderrTail {
    buf: Vec<u8>,
}

impl StderrTail {
    pub(crate) fn append(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > STDERR_TAIL_BYTES {
            let excess = self.buf.len() - STDERR_TAIL_BYTES;
            self.buf.drain(..excess);
        }
    }

    pub(crate) fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// One child process speaking the line-JSON RPC protocol.
pub struct ProcessRpc {
    label: String,
    hub: Arc<EventHub>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, (&'static str, PendingSender)>>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    stderr_tail: Arc<Mutex<StderrTail>>,
    exit_rx: watch::Receiver<Option<Option<i32>>>,
    pid: Option<i32>,
    send_timeout: Duration,
}

impl ProcessRpc {
    /// Spawn the child and install the stdout reader, stderr reader, and
    /// exit waiter. Construction is the one and only start; there is no
    /// second `start()` to call twice.
    pub fn start(spec: LaunchSpec) -> Result<Arc<Self>, RpcError> {
        let mut cmd = Command::new(&spec.program);
        cmd.arg("--mode")
            .arg("rpc")
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&spec.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(RpcError::SpawnFailed)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pid = child.id().map(|p| p as i32);

        let hub = Arc::new(EventHub::new());
        let pending: Arc<Mutex<HashMap<u64, (&'static str, PendingSender)>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let stderr_tail = Arc::new(Mutex::new(StderrTail::default()));
        let (exit_tx, exit_rx) = watch::channel(None);

        if let Some(stdout) = stdout {
            let hub = Arc::clone(&hub);
            let pending = Arc::clone(&pending);
            let label = spec.label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => handle_line(&label, &line, &hub, &pending),
                        Ok(None) => break,
                        Err(error) => {
                            tracing::debug!(agent = %label, %error, "rpc stdout read error");
                            break;
                        }
                    }
                }
            });
        }

        if let Some(mut stderr) = stderr {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                loop {
                    match stderr.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => tail.lock().append(&chunk[..n]),
                    }
                }
            });
        }

        {
            let hub = Arc::clone(&hub);
            let pending = Arc::clone(&pending);
            let tail = Arc::clone(&stderr_tail);
            let label = spec.label.clone();
            tokio::spawn(async move {
                let status = child.wait().await;
                let code = status.ok().and_then(|s| s.code());
                tracing::debug!(agent = %label, ?code, "rpc child exited");
                let _ = exit_tx.send(Some(code));

                let stderr = tail.lock().snapshot();
                let drained: Vec<_> = {
                    let mut pending = pending.lock();
                    pending.drain().collect()
                };
                for (_, (_, sender)) in drained {
                    let _ = sender.send(Err(RpcError::Exited {
                        code,
                        stderr: StderrContext(stderr.clone()),
                    }));
                }
                hub.dispatch(RpcEvent::RpcExit {
                    code,
                    error: None,
                });
            });
        }

        Ok(Arc::new(Self {
            label: spec.label,
            hub,
            next_id: AtomicU64::new(1),
            pending,
            stdin: tokio::sync::Mutex::new(stdin),
            stderr_tail,
            exit_rx,
            pid,
            send_timeout: SEND_TIMEOUT,
        }))
    }

    fn stderr_context(&self) -> StderrContext {
        StderrContext(self.stderr_tail.lock().snapshot())
    }

    fn exit_code(&self) -> Option<Option<i32>> {
        *self.exit_rx.borrow()
    }

    /// Reject every pending request with a stop error.
    fn fail_pending_stopped(&self) {
        let stderr = self.stderr_context();
        let drained: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        for (_, (_, sender)) in drained {
            let _ = sender.send(Err(RpcError::Stopped {
                stderr: StderrContext(stderr.0.clone()),
            }));
        }
    }

    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) {
        if let Some(pid) = self.pid {
            if let Err(error) = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), signal) {
                tracing::debug!(agent = %self.label, pid, %error, "signal delivery failed");
            }
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: ()) {}
}

/// Parse and dispatch one stdout line.
fn handle_line(
    label: &str,
    line: &str,
    hub: &EventHub,
    pending: &Mutex<HashMap<u64, (&'static str, PendingSender)>>,
) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    match InboundFrame::parse(trimmed) {
        Ok(InboundFrame::Response(response)) => {
            if let Some(data) = &response.data {
                hub.observe_frame(data);
            }
            let entry = pending.lock().remove(&response.id);
            match entry {
                Some((command, sender)) => {
                    let result = if response.success {
                        Ok(response.data)
                    } else {
                        Err(RpcError::CommandFailed {
                            command,
                            error: response.error.unwrap_or_else(|| "unknown error".to_string()),
                            stderr: StderrContext::default(),
                        })
                    };
                    let _ = sender.send(result);
                }
                None => {
                    tracing::debug!(agent = %label, id = response.id, "response with no pending request");
                }
            }
        }
        Ok(InboundFrame::Event(event)) => hub.dispatch(event),
        Err(error) => {
            tracing::warn!(agent = %label, %error, "malformed rpc line");
            hub.dispatch(RpcEvent::RpcParseError {
                line: trimmed.to_string(),
            });
        }
    }
}

#[async_trait]
impl AgentRpc for ProcessRpc {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_running(&self) -> bool {
        self.exit_code().is_none()
    }

    fn session_id(&self) -> Option<SessionId> {
        self.hub.session_id()
    }

    fn cache_session_id(&self, session_id: SessionId) {
        self.hub.cache_session_id(session_id);
    }

    async fn send(&self, command: RpcCommand) -> Result<Option<Value>, RpcError> {
        if let Some(code) = self.exit_code() {
            return Err(RpcError::Exited {
                code,
                stderr: self.stderr_context(),
            });
        }

        let name = command.name();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest { command, id };
        let mut line = serde_json::to_string(&request).map_err(|e| RpcError::CommandFailed {
            command: name,
            error: e.to_string(),
            stderr: StderrContext::default(),
        })?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, (name, tx));

        {
            let mut stdin = self.stdin.lock().await;
            let stdin = stdin.as_mut().ok_or(RpcError::NotStarted)?;
            if let Err(error) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().remove(&id);
                return Err(RpcError::WriteFailed {
                    error,
                    stderr: self.stderr_context(),
                });
            }
            if let Err(error) = stdin.flush().await {
                self.pending.lock().remove(&id);
                return Err(RpcError::WriteFailed {
                    error,
                    stderr: self.stderr_context(),
                });
            }
        }

        match tokio::time::timeout(self.send_timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a value: the process is gone
            Ok(Err(_)) => Err(RpcError::Exited {
                code: self.exit_code().flatten(),
                stderr: self.stderr_context(),
            }),
            Err(_elapsed) => {
                self.pending.lock().remove(&id);
                Err(RpcError::Timeout {
                    command: name,
                    after: self.send_timeout,
                    stderr: self.stderr_context(),
                })
            }
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<RpcEvent> {
        self.hub.subscribe()
    }

    fn suppress_next_agent_end(&self) {
        self.hub.suppress_next_agent_end();
    }

    async fn wait_for_agent_end(&self, timeout: Duration) -> Result<Value, RpcError> {
        if let Some(code) = self.exit_code() {
            return Err(RpcError::Exited {
                code,
                stderr: self.stderr_context(),
            });
        }
        let rx = self.hub.register_end_waiter()?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::Exited {
                code: self.exit_code().flatten(),
                stderr: self.stderr_context(),
            }),
            Err(_elapsed) => Err(RpcError::Timeout {
                command: "wait_for_agent_end",
                after: timeout,
                stderr: self.stderr_context(),
            }),
        }
    }

    async fn stop(&self, timeout: Duration) -> Result<(), RpcError> {
        if self.exit_code().is_none() {
            #[cfg(unix)]
            self.signal(nix::sys::signal::Signal::SIGTERM);

            let mut exit_rx = self.exit_rx.clone();
            let waited =
                tokio::time::timeout(timeout, exit_rx.wait_for(|code| code.is_some())).await;
            if waited.is_err() {
                tracing::warn!(agent = %self.label, "agent did not exit in time, killing");
                #[cfg(unix)]
                self.signal(nix::sys::signal::Signal::SIGKILL);
            }
        }

        // Close stdin and reject whatever is still in flight.
        self.stdin.lock().await.take();
        self.fail_pending_stopped();
        Ok(())
    }

    fn force_kill(&self) {
        #[cfg(unix)]
        self.signal(nix::sys::signal::Signal::SIGKILL);
        self.fail_pending_stopped();
    }
}

/// Launcher that starts real child processes.
#[derive(Clone, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentLauncher for ProcessLauncher {
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn AgentRpc>, RpcError> {
        let rpc = ProcessRpc::start(spec)?;
        Ok(rpc)
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
