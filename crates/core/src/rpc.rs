// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the per-agent stdio RPC.
//!
//! Frames are UTF-8 JSON, one object per line. Requests carry `{...command,
//! id}`; responses are `{type: "response", id, success, data|error}`; every
//! other inbound object is an event. Events are open-world (unknown tags are
//! preserved so session-id extraction still sees them); only the
//! `advance_lifecycle` payload in [`crate::lifecycle`] is closed-world.

use crate::agent::ThinkingLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands the supervisor issues to a child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcCommand {
    Prompt { message: String },
    FollowUp { message: String },
    Steer { message: String },
    Abort,
    AbortAndPrompt { message: String },
    GetState,
    GetMessages,
    GetLastAssistantText,
    SetThinkingLevel { level: ThinkingLevel },
    GetSessionId,
}

impl RpcCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RpcCommand::Prompt { .. } => "prompt",
            RpcCommand::FollowUp { .. } => "follow_up",
            RpcCommand::Steer { .. } => "steer",
            RpcCommand::Abort => "abort",
            RpcCommand::AbortAndPrompt { .. } => "abort_and_prompt",
            RpcCommand::GetState => "get_state",
            RpcCommand::GetMessages => "get_messages",
            RpcCommand::GetLastAssistantText => "get_last_assistant_text",
            RpcCommand::SetThinkingLevel { .. } => "set_thinking_level",
            RpcCommand::GetSessionId => "get_session_id",
        }
    }
}

/// One outbound frame: a command plus its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    #[serde(flatten)]
    pub command: RpcCommand,
    pub id: u64,
}

/// Response frame correlated to a request by `id`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcResponse {
    pub id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Nested assistant-message event inside `message_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantMessageEvent {
    TextStart,
    TextDelta { delta: String },
    TextEnd { content: String },
}

/// Usage counters carried on `message_end`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    #[serde(default, alias = "inputTokens")]
    pub input_tokens: u64,
    #[serde(default, alias = "outputTokens")]
    pub output_tokens: u64,
    #[serde(default, alias = "costUsd", alias = "cost")]
    pub cost_usd: f64,
}

/// Inbound events, including the two the RPC client synthesizes itself
/// (`rpc_exit`, `rpc_parse_error`).
#[derive(Debug, Clone, PartialEq)]
pub enum RpcEvent {
    /// The agent's current turn terminated
    AgentEnd { data: Value },
    /// Streaming assistant output
    MessageUpdate { assistant: AssistantMessageEvent },
    /// One full assistant message finished
    MessageEnd { usage: Option<UsageCounters> },
    /// Child process exited
    RpcExit {
        code: Option<i32>,
        error: Option<String>,
    },
    /// A stdout line failed to parse as JSON
    RpcParseError { line: String },
    /// Any other event object, preserved verbatim
    Other { kind: String, data: Value },
}

impl RpcEvent {
    pub fn name(&self) -> &str {
        match self {
            RpcEvent::AgentEnd { .. } => "agent_end",
            RpcEvent::MessageUpdate { .. } => "message_update",
            RpcEvent::MessageEnd { .. } => "message_end",
            RpcEvent::RpcExit { .. } => "rpc_exit",
            RpcEvent::RpcParseError { .. } => "rpc_parse_error",
            RpcEvent::Other { kind, .. } => kind,
        }
    }

    /// Classify an already-parsed event object.
    pub fn from_value(value: Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        match kind.as_str() {
            "agent_end" => RpcEvent::AgentEnd { data: value },
            "message_update" => {
                match value
                    .get("assistantMessageEvent")
                    .cloned()
                    .map(serde_json::from_value::<AssistantMessageEvent>)
                {
                    Some(Ok(assistant)) => RpcEvent::MessageUpdate { assistant },
                    // Malformed or missing nested payload: keep the raw object
                    _ => RpcEvent::Other { kind, data: value },
                }
            }
            "message_end" => {
                let usage = value
                    .get("usage")
                    .cloned()
                    .and_then(|u| serde_json::from_value::<UsageCounters>(u).ok());
                RpcEvent::MessageEnd { usage }
            }
            "rpc_exit" => {
                let code = value.get("code").and_then(Value::as_i64).map(|c| c as i32);
                let error = value
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                RpcEvent::RpcExit { code, error }
            }
            _ => RpcEvent::Other { kind, data: value },
        }
    }

    /// Raw payload, where one was preserved.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            RpcEvent::AgentEnd { data } | RpcEvent::Other { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// One parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Response(RpcResponse),
    Event(RpcEvent),
}

impl InboundFrame {
    /// Parse one stdout line. `Err` means the line was not valid JSON;
    /// the client surfaces that as an `rpc_parse_error` event.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("type").and_then(Value::as_str) == Some("response") {
            let response: RpcResponse = serde_json::from_value(value)?;
            return Ok(InboundFrame::Response(response));
        }
        Ok(InboundFrame::Event(RpcEvent::from_value(value)))
    }
}

/// Find a session id anywhere a frame is known to carry one: at the top
/// level or nested under `data`, spelled `session_id` or `sessionId`.
pub fn extract_session_id(value: &Value) -> Option<String> {
    let direct = |v: &Value| {
        v.get("session_id")
            .or_else(|| v.get("sessionId"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    direct(value).or_else(|| value.get("data").and_then(direct))
}

/// One message in an agent's transcript, as returned by `get_messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "toolCalls")]
    pub tool_calls: Vec<ToolCallSummary>,
}

/// Compact view of one tool invocation inside a transcript message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
