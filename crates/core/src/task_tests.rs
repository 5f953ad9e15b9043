// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn status_serde_is_snake_case() {
    assert_eq!(
        serde_json::to_string(&TaskStatus::InProgress).unwrap(),
        "\"in_progress\""
    );
    let parsed: TaskStatus = serde_json::from_str("\"blocked\"").unwrap();
    assert_eq!(parsed, TaskStatus::Blocked);
}

#[test]
fn scope_unknown_catch_all() {
    let parsed: TaskScope = serde_json::from_str("\"epic\"").unwrap();
    assert_eq!(parsed, TaskScope::Unknown);
    let parsed: TaskScope = serde_json::from_str("\"tiny\"").unwrap();
    assert_eq!(parsed, TaskScope::Tiny);
}

#[test]
fn task_ref_defaults_optional_fields() {
    let task: TaskRef = serde_json::from_str(
        r#"{"id": "T1", "title": "Fix the bug", "status": "open"}"#,
    )
    .unwrap();
    assert_eq!(task.id, "T1");
    assert_eq!(task.scope, TaskScope::Medium);
    assert!(task.labels.is_empty());
    assert!(task.depends_on_ids.is_empty());
}

#[test]
fn task_ref_roundtrip() {
    let mut task = TaskRef::new("T2", "Add login", TaskStatus::Open);
    task.labels = vec!["ui".to_string()];
    task.depends_on_ids = vec![TaskId::new("T1")];
    task.scope = TaskScope::Small;
    let json = serde_json::to_string(&task).unwrap();
    let parsed: TaskRef = serde_json::from_str(&json).unwrap();
    assert_eq!(task, parsed);
}
