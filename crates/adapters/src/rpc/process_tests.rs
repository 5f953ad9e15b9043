// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn pending_map() -> Arc<Mutex<HashMap<u64, (&'static str, PendingSender)>>> {
    Arc::new(Mutex::new(HashMap::new()))
}

#[test]
fn stderr_tail_keeps_newest_bytes() {
    let mut tail = StderrTail::default();
    tail.append(b"old old old");
    tail.append(&vec![b'x'; STDERR_TAIL_BYTES]);
    let snapshot = tail.snapshot();
    assert_eq!(snapshot.len(), STDERR_TAIL_BYTES);
    assert!(!snapshot.contains("old"));
    assert!(snapshot.ends_with('x'));
}

#[test]
fn stderr_tail_small_appends_accumulate() {
    let mut tail = StderrTail::default();
    tail.append(b"line one\n");
    tail.append(b"line two\n");
    assert_eq!(tail.snapshot(), "line one\nline two\n");
}

#[tokio::test]
async fn response_line_completes_matching_pending_entry() {
    let hub = EventHub::new();
    let pending = pending_map();
    let (tx, rx) = tokio::sync::oneshot::channel();
    pending.lock().insert(7, ("get_state", tx));

    handle_line(
        "a1",
        r#"{"type":"response","id":7,"success":true,"data":{"state":"idle"}}"#,
        &hub,
        &pending,
    );

    let data = rx.await.unwrap().unwrap().unwrap();
    assert_eq!(data["state"], "idle");
    assert!(pending.lock().is_empty());
}

#[tokio::test]
async fn failed_response_surfaces_command_error() {
    let hub = EventHub::new();
    let pending = pending_map();
    let (tx, rx) = tokio::sync::oneshot::channel();
    pending.lock().insert(1, ("steer", tx));

    handle_line(
        "a1",
        r#"{"type":"response","id":1,"success":false,"error":"not now"}"#,
        &hub,
        &pending,
    );

    let err = rx.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("steer failed: not now"), "{}", err);
}

#[tokio::test]
async fn response_captures_session_id_from_data() {
    let hub = EventHub::new();
    let pending = pending_map();
    let (tx, _rx) = tokio::sync::oneshot::channel();
    pending.lock().insert(2, ("get_session_id", tx));

    handle_line(
        "a1",
        r#"{"type":"response","id":2,"success":true,"data":{"session_id":"s-7"}}"#,
        &hub,
        &pending,
    );

    assert_eq!(hub.session_id().unwrap(), "s-7");
}

#[test]
fn unmatched_response_is_ignored() {
    let hub = EventHub::new();
    let pending = pending_map();
    handle_line(
        "a1",
        r#"{"type":"response","id":99,"success":true}"#,
        &hub,
        &pending,
    );
    assert!(pending.lock().is_empty());
}

#[test]
fn event_line_is_fanned_out() {
    let hub = EventHub::new();
    let mut events = hub.subscribe();
    let pending = pending_map();

    handle_line("a1", r#"{"type":"agent_end"}"#, &hub, &pending);

    assert!(matches!(
        events.try_recv(),
        Ok(RpcEvent::AgentEnd { .. })
    ));
}

#[test]
fn malformed_line_becomes_parse_error_event_and_loop_continues() {
    let hub = EventHub::new();
    let mut events = hub.subscribe();
    let pending = pending_map();

    handle_line("a1", "{oops", &hub, &pending);
    handle_line("a1", r#"{"type":"agent_end"}"#, &hub, &pending);

    match events.try_recv() {
        Ok(RpcEvent::RpcParseError { line }) => assert_eq!(line, "{oops"),
        other => panic!("expected parse error event, got {:?}", other),
    }
    assert!(matches!(
        events.try_recv(),
        Ok(RpcEvent::AgentEnd { .. })
    ));
}

#[test]
fn blank_lines_are_skipped() {
    let hub = EventHub::new();
    let mut events = hub.subscribe();
    let pending = pending_map();
    handle_line("a1", "   ", &hub, &pending);
    assert!(events.try_recv().is_err());
}
