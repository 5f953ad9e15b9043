// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event fan-out shared by the real and fake RPC clients.
//!
//! The hub owns the agent-end waiters and the suppression counter, so the
//! interrupt semantics (abort + re-prompt swallowing one `agent_end`) behave
//! identically in production and in tests.

use oms_core::rpc::{extract_session_id, RpcEvent};
use oms_core::SessionId;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::{RpcError, StderrContext};

/// Unclaimed agent-ends kept for late waiters (bounded).
const PENDING_END_CAPACITY: usize = 8;

#[derive(Default)]
struct HubState {
    listeners: Vec<mpsc::UnboundedSender<RpcEvent>>,
    end_waiters: Vec<oneshot::Sender<Result<Value, RpcError>>>,
    /// Pending agent-end suppressions (FIFO by construction: a counter)
    suppress_count: usize,
    /// Agent-ends that arrived while nobody was waiting
    pending_ends: std::collections::VecDeque<Value>,
    session_id: Option<SessionId>,
    exited: bool,
}

/// Fan-out point for inbound events.
#[derive(Default)]
pub struct EventHub {
    state: Mutex<HubState>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RpcEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().listeners.push(tx);
        rx
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.state.lock().session_id.clone()
    }

    pub fn cache_session_id(&self, session_id: SessionId) {
        self.state.lock().session_id = Some(session_id);
    }

    pub fn suppress_next_agent_end(&self) {
        self.state.lock().suppress_count += 1;
    }

    #[cfg(test)]
    pub(crate) fn suppress_count(&self) -> usize {
        self.state.lock().suppress_count
    }

    pub fn has_exited(&self) -> bool {
        self.state.lock().exited
    }

    /// Register an agent-end waiter. An agent-end that arrived before the
    /// waiter resolves it immediately; otherwise the waiter queues. Fails
    /// fast if the process already exited.
    pub fn register_end_waiter(
        &self,
    ) -> Result<oneshot::Receiver<Result<Value, RpcError>>, RpcError> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        if let Some(data) = state.pending_ends.pop_front() {
            let _ = tx.send(Ok(data));
            return Ok(rx);
        }
        if state.exited {
            return Err(RpcError::Exited {
                code: None,
                stderr: StderrContext::default(),
            });
        }
        state.end_waiters.push(tx);
        Ok(rx)
    }

    /// Record a session id observed on any frame.
    pub fn observe_frame(&self, value: &Value) {
        if let Some(sid) = extract_session_id(value) {
            self.state.lock().session_id = Some(SessionId::new(sid));
        }
    }

    /// Dispatch one event: session-id capture, suppression accounting,
    /// agent-end waiter resolution, then listener fan-out.
    ///
    /// A suppressed `agent_end` is consumed entirely: it neither resolves
    /// waiters nor reaches listeners.
    pub fn dispatch(&self, event: RpcEvent) {
        let mut state = self.state.lock();

        if let Some(payload) = event.payload() {
            if let Some(sid) = extract_session_id(payload) {
                state.session_id = Some(SessionId::new(sid));
            }
        }

        if let RpcEvent::AgentEnd { data } = &event {
            if state.suppress_count > 0 {
                state.suppress_count -= 1;
                return;
            }
            if state.end_waiters.is_empty() {
                if state.pending_ends.len() == PENDING_END_CAPACITY {
                    state.pending_ends.pop_front();
                }
                state.pending_ends.push_back(data.clone());
            } else {
                for waiter in state.end_waiters.drain(..) {
                    let _ = waiter.send(Ok(data.clone()));
                }
            }
        }

        if let RpcEvent::RpcExit { code, error } = &event {
            state.exited = true;
            let code = *code;
            let detail = error.clone();
            for waiter in state.end_waiters.drain(..) {
                let _ = waiter.send(Err(RpcError::Exited {
                    code,
                    stderr: StderrContext(detail.clone().unwrap_or_default()),
                }));
            }
        }

        state.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
