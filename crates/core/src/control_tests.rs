// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn interrupt_agent_parses() {
    let msg = ControlMessage::parse(
        r#"{"type":"interrupt_agent","task_id":"T8","message":"stop doing X","ts":123}"#,
    )
    .unwrap();
    assert_eq!(
        msg,
        ControlMessage::InterruptAgent {
            task_id: "T8".to_string(),
            message: "stop doing X".to_string(),
            ts: Some(123),
        }
    );
}

#[test]
fn ts_is_optional() {
    let msg =
        ControlMessage::parse(r#"{"type":"interrupt_agent","task_id":"T1","message":"m"}"#)
            .unwrap();
    match msg {
        ControlMessage::InterruptAgent { ts, .. } => assert_eq!(ts, None),
        other => panic!("wrong variant: {:?}", other),
    }
}

#[test]
fn advance_lifecycle_flattens_input() {
    let msg = ControlMessage::parse(
        r#"{"type":"advance_lifecycle","agent_type":"issuer","task_id":"T1","action":"advance","target":"worker","message":"do it"}"#,
    )
    .unwrap();
    match msg {
        ControlMessage::AdvanceLifecycle { input } => {
            assert_eq!(input.agent_type, "issuer");
            assert_eq!(input.action, "advance");
            assert_eq!(input.target.as_deref(), Some("worker"));
        }
        other => panic!("wrong variant: {:?}", other),
    }
}

#[test]
fn merge_signals_parse() {
    let msg =
        ControlMessage::parse(r#"{"type":"merge_complete","task_id":"T4","reason":"clean"}"#)
            .unwrap();
    assert_eq!(
        msg,
        ControlMessage::MergeComplete {
            task_id: "T4".to_string(),
            reason: "clean".to_string(),
        }
    );

    let msg = ControlMessage::parse(r#"{"type":"merge_conflict","task_id":"T4"}"#).unwrap();
    assert_eq!(
        msg,
        ControlMessage::MergeConflict {
            task_id: "T4".to_string(),
            reason: String::new(),
        }
    );
}

#[test]
fn complaint_messages_parse() {
    let msg = ControlMessage::parse(
        r#"{"type":"complain","agent_id":"worker:T1:a","task_id":"T1","files":["src/x.rs"],"reason":"contested"}"#,
    )
    .unwrap();
    match msg {
        ControlMessage::Complain { files, .. } => assert_eq!(files, vec!["src/x.rs"]),
        other => panic!("wrong variant: {:?}", other),
    }

    let msg = ControlMessage::parse(r#"{"type":"revoke_complaint","complaint_id":"c-1"}"#).unwrap();
    assert_eq!(
        msg,
        ControlMessage::RevokeComplaint {
            complaint_id: "c-1".to_string(),
        }
    );
}

#[test]
fn unknown_type_is_rejected() {
    assert!(ControlMessage::parse(r#"{"type":"resize","cols":80}"#).is_err());
    assert!(ControlMessage::parse("not json").is_err());
}
