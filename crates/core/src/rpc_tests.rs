// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::ThinkingLevel;
use serde_json::json;

#[test]
fn request_flattens_command_and_id() {
    let request = RpcRequest {
        command: RpcCommand::Prompt {
            message: "hello".to_string(),
        },
        id: 3,
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({"type": "prompt", "message": "hello", "id": 3})
    );
}

#[test]
fn bare_commands_serialize_with_type_only() {
    let value = serde_json::to_value(RpcRequest {
        command: RpcCommand::Abort,
        id: 9,
    })
    .unwrap();
    assert_eq!(value, json!({"type": "abort", "id": 9}));
}

#[test]
fn set_thinking_level_serializes_level() {
    let value = serde_json::to_value(RpcCommand::SetThinkingLevel {
        level: ThinkingLevel::High,
    })
    .unwrap();
    assert_eq!(value, json!({"type": "set_thinking_level", "level": "high"}));
}

#[test]
fn response_frame_parses() {
    let frame =
        InboundFrame::parse(r#"{"type":"response","id":5,"success":true,"data":{"ok":1}}"#)
            .unwrap();
    match frame {
        InboundFrame::Response(r) => {
            assert_eq!(r.id, 5);
            assert!(r.success);
            assert_eq!(r.data, Some(json!({"ok": 1})));
            assert_eq!(r.error, None);
        }
        other => panic!("expected response, got {:?}", other),
    }
}

#[test]
fn error_response_parses() {
    let frame =
        InboundFrame::parse(r#"{"type":"response","id":2,"success":false,"error":"nope"}"#)
            .unwrap();
    match frame {
        InboundFrame::Response(r) => {
            assert!(!r.success);
            assert_eq!(r.error.as_deref(), Some("nope"));
        }
        other => panic!("expected response, got {:?}", other),
    }
}

#[test]
fn agent_end_is_an_event() {
    let frame = InboundFrame::parse(r#"{"type":"agent_end","session_id":"s-1"}"#).unwrap();
    match frame {
        InboundFrame::Event(RpcEvent::AgentEnd { data }) => {
            assert_eq!(extract_session_id(&data).as_deref(), Some("s-1"));
        }
        other => panic!("expected agent_end, got {:?}", other),
    }
}

#[test]
fn message_update_parses_nested_assistant_event() {
    let frame = InboundFrame::parse(
        r#"{"type":"message_update","assistantMessageEvent":{"type":"text_delta","delta":"hi"}}"#,
    )
    .unwrap();
    match frame {
        InboundFrame::Event(RpcEvent::MessageUpdate { assistant }) => {
            assert_eq!(
                assistant,
                AssistantMessageEvent::TextDelta {
                    delta: "hi".to_string()
                }
            );
        }
        other => panic!("expected message_update, got {:?}", other),
    }
}

#[test]
fn message_update_with_bad_nested_payload_is_preserved() {
    let frame =
        InboundFrame::parse(r#"{"type":"message_update","assistantMessageEvent":{"type":"hum"}}"#)
            .unwrap();
    match frame {
        InboundFrame::Event(RpcEvent::Other { kind, .. }) => assert_eq!(kind, "message_update"),
        other => panic!("expected preserved event, got {:?}", other),
    }
}

#[test]
fn message_end_carries_usage_with_camel_aliases() {
    let frame = InboundFrame::parse(
        r#"{"type":"message_end","usage":{"inputTokens":10,"outputTokens":3,"costUsd":0.01}}"#,
    )
    .unwrap();
    match frame {
        InboundFrame::Event(RpcEvent::MessageEnd { usage: Some(u) }) => {
            assert_eq!(u.input_tokens, 10);
            assert_eq!(u.output_tokens, 3);
        }
        other => panic!("expected message_end with usage, got {:?}", other),
    }
}

#[test]
fn message_end_without_usage() {
    let frame = InboundFrame::parse(r#"{"type":"message_end"}"#).unwrap();
    assert_eq!(
        frame,
        InboundFrame::Event(RpcEvent::MessageEnd { usage: None })
    );
}

#[test]
fn unknown_event_kind_is_preserved_verbatim() {
    let frame = InboundFrame::parse(r#"{"type":"tool_start","name":"bash"}"#).unwrap();
    match frame {
        InboundFrame::Event(RpcEvent::Other { kind, data }) => {
            assert_eq!(kind, "tool_start");
            assert_eq!(data["name"], "bash");
        }
        other => panic!("expected preserved event, got {:?}", other),
    }
}

#[test]
fn event_without_type_tag_is_preserved() {
    let frame = InboundFrame::parse(r#"{"whatever":1}"#).unwrap();
    match frame {
        InboundFrame::Event(RpcEvent::Other { kind, .. }) => assert_eq!(kind, "unknown"),
        other => panic!("expected preserved event, got {:?}", other),
    }
}

#[test]
fn malformed_line_is_a_parse_error() {
    assert!(InboundFrame::parse("{nope").is_err());
}

#[test]
fn session_id_extraction_spellings() {
    assert_eq!(
        extract_session_id(&json!({"session_id": "a"})).as_deref(),
        Some("a")
    );
    assert_eq!(
        extract_session_id(&json!({"sessionId": "b"})).as_deref(),
        Some("b")
    );
    assert_eq!(
        extract_session_id(&json!({"data": {"session_id": "c"}})).as_deref(),
        Some("c")
    );
    assert_eq!(
        extract_session_id(&json!({"data": {"sessionId": "d"}})).as_deref(),
        Some("d")
    );
    assert_eq!(extract_session_id(&json!({"session_id": ""})), None);
    assert_eq!(extract_session_id(&json!({"other": 1})), None);
}

#[test]
fn agent_message_accepts_camel_tool_calls() {
    let message: AgentMessage = serde_json::from_value(json!({
        "role": "assistant",
        "content": "done",
        "toolCalls": [{"name": "bash", "result": "ok"}]
    }))
    .unwrap();
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].name, "bash");
}

#[test]
fn event_names() {
    assert_eq!(RpcEvent::from_value(json!({"type": "agent_end"})).name(), "agent_end");
    assert_eq!(
        RpcEvent::RpcExit {
            code: Some(0),
            error: None
        }
        .name(),
        "rpc_exit"
    );
    assert_eq!(
        RpcEvent::RpcParseError {
            line: "x".to_string()
        }
        .name(),
        "rpc_parse_error"
    );
}
