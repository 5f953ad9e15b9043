// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use tempfile::tempdir;

fn clear_env() {
    for name in [
        "OMS_STATE_DIR",
        "OMS_PROJECT_ROOT",
        "OMS_LLM_PROGRAM",
        "OMS_TASKS_PROGRAM",
        "OMS_MAX_WORKERS",
        "OMS_POLL_MS",
        "OMS_STEERING_MS",
    ] {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn state_dir_prefers_oms_state_dir() {
    clear_env();
    std::env::set_var("OMS_STATE_DIR", "/tmp/oms-test-state");
    let config = Config::load().unwrap();
    assert_eq!(config.state_dir, PathBuf::from("/tmp/oms-test-state"));
    assert_eq!(
        config.session_dir,
        PathBuf::from("/tmp/oms-test-state/session")
    );
    clear_env();
}

#[test]
#[serial]
fn defaults_apply_without_settings() {
    clear_env();
    let dir = tempdir().unwrap();
    std::env::set_var("OMS_STATE_DIR", dir.path());
    let config = Config::load().unwrap();
    assert_eq!(config.max_workers, 4);
    assert_eq!(config.llm_program, "llm");
    assert_eq!(config.tasks_program, "tasks");
    assert_eq!(config.actor, "singularity");
    assert!(config.replicas_enabled);
    assert_eq!(config.poll_interval, Duration::from_secs(5));
    clear_env();
}

#[test]
#[serial]
fn settings_file_overrides_defaults() {
    clear_env();
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        r#"
max_workers = 8
poll_interval_ms = 1000
llm_program = "claude"
replicas_enabled = false
actor = "overmind"
"#,
    )
    .unwrap();
    std::env::set_var("OMS_STATE_DIR", dir.path());

    let config = Config::load().unwrap();
    assert_eq!(config.max_workers, 8);
    assert_eq!(config.poll_interval, Duration::from_millis(1000));
    assert_eq!(config.llm_program, "claude");
    assert!(!config.replicas_enabled);
    assert_eq!(config.actor, "overmind");
    clear_env();
}

#[test]
#[serial]
fn env_overrides_beat_settings() {
    clear_env();
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "max_workers = 8").unwrap();
    std::env::set_var("OMS_STATE_DIR", dir.path());
    std::env::set_var("OMS_MAX_WORKERS", "2");
    std::env::set_var("OMS_POLL_MS", "250");

    let config = Config::load().unwrap();
    assert_eq!(config.max_workers, 2);
    assert_eq!(config.poll_interval, Duration::from_millis(250));
    clear_env();
}

#[test]
#[serial]
fn invalid_settings_file_is_an_error() {
    clear_env();
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "max_workers = \"lots\"").unwrap();
    std::env::set_var("OMS_STATE_DIR", dir.path());

    assert!(matches!(Config::load(), Err(ConfigError::InvalidToml(_))));
    clear_env();
}
