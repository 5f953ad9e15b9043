// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn appends_one_json_object_per_line() {
    let dir = tempdir().unwrap();
    let log = SessionLog::new(dir.path());

    log.info("spawn", "agent spawned", json!({"agent": "worker:T1:a"}));
    log.warn("merger", "retrying", json!({}));

    let content = std::fs::read_to_string(dir.path().join("oms.log")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["level"], "info");
    assert_eq!(first["area"], "spawn");
    assert_eq!(first["msg"], "agent spawned");
    assert_eq!(first["agent"], "worker:T1:a");
    assert!(first["ts"].as_u64().unwrap() > 0);

    let second: Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["level"], "warn");
}

#[test]
fn creates_missing_session_dir() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("deep/session");
    let log = SessionLog::new(&nested);
    log.info("a", "b", json!({}));
    assert!(nested.join("oms.log").is_file());
}

#[test]
fn write_failure_does_not_panic() {
    // Point the log at an unwritable path (a directory named oms.log)
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("oms.log")).unwrap();
    let log = SessionLog::new(dir.path());
    log.info("a", "b", json!({}));
    log.info("a", "c", json!({}));
}
