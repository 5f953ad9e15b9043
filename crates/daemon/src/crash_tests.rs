// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn writes_one_json_file_per_crash() {
    let dir = tempdir().unwrap();
    let crashes = dir.path().join("crashes");

    let first = write_crash_file(&crashes, "startup", "store unreachable").unwrap();
    let second = write_crash_file(&crashes, "panic", "index out of bounds").unwrap();
    assert_ne!(first, second);

    let body: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
    assert_eq!(body["area"], "startup");
    assert_eq!(body["detail"], "store unreachable");
    assert!(body["ts"].as_u64().unwrap() > 0);
}

#[test]
fn area_is_sanitized_in_the_file_name() {
    let dir = tempdir().unwrap();
    let path = write_crash_file(dir.path(), "merge/queue tick", "x").unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("-merge-queue-tick.json"), "{}", name);
}

#[test]
fn unwritable_dir_returns_none() {
    let dir = tempdir().unwrap();
    // A file where the crashes dir should be
    let blocked = dir.path().join("crashes");
    std::fs::write(&blocked, "file").unwrap();
    assert!(write_crash_file(&blocked, "x", "y").is_none());
}
