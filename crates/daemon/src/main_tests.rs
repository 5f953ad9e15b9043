// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn small_logs_are_not_rotated() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("omsd.log");
    std::fs::write(&log, "short").unwrap();
    rotate_log_if_needed(&log);
    assert!(log.exists());
    assert!(!dir.path().join("omsd.log.1").exists());
}

#[test]
fn oversized_logs_shift_down() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("omsd.log");
    std::fs::write(&log, vec![b'x'; (MAX_LOG_SIZE + 1) as usize]).unwrap();
    std::fs::write(dir.path().join("omsd.log.1"), "old-1").unwrap();

    rotate_log_if_needed(&log);

    assert!(!log.exists());
    let rotated = std::fs::read_to_string(dir.path().join("omsd.log.2")).unwrap();
    assert_eq!(rotated, "old-1");
    assert!(dir.path().join("omsd.log.1").exists());
}

#[test]
fn startup_marker_carries_the_pid() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    write_startup_marker(&config).unwrap();
    let content = std::fs::read_to_string(&config.log_path).unwrap();
    assert!(content.starts_with(STARTUP_MARKER_PREFIX));
    assert!(content.contains(&std::process::id().to_string()));
}

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        state_dir: dir.to_path_buf(),
        session_dir: dir.join("session"),
        lock_path: dir.join("omsd.pid"),
        log_path: dir.join("omsd.log"),
        crashes_dir: dir.join("session/crashes"),
        socket_path: dir.join("session/singularity.sock"),
        project_root: dir.to_path_buf(),
        llm_program: "llm".to_string(),
        tasks_program: "tasks".to_string(),
        actor: "singularity".to_string(),
        max_workers: 4,
        poll_interval: Duration::from_secs(5),
        steering_interval: Duration::from_secs(900),
        replicas_enabled: false,
    }
}
