// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: state-dir resolution, optional `config.toml`, and
//! environment overrides.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine a state directory (no OMS_STATE_DIR, XDG_STATE_HOME, or HOME)")]
    NoStateDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config.toml: {0}")]
    InvalidToml(#[from] toml::de::Error),
}

/// Optional settings file (`<state_dir>/config.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub steering_interval_ms: Option<u64>,
    #[serde(default)]
    pub llm_program: Option<String>,
    #[serde(default)]
    pub tasks_program: Option<String>,
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    #[serde(default)]
    pub replicas_enabled: Option<bool>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/oms)
    pub state_dir: PathBuf,
    /// Session directory (oms.log, replica/, crashes/, socket)
    pub session_dir: PathBuf,
    /// Path to the lock/PID file
    pub lock_path: PathBuf,
    /// Path to the daemon log file
    pub log_path: PathBuf,
    /// Path to the crash file directory
    pub crashes_dir: PathBuf,
    /// Control socket path exported to children
    pub socket_path: PathBuf,
    /// Project root agents work on
    pub project_root: PathBuf,
    /// The LLM CLI binary
    pub llm_program: String,
    /// The tasks CLI binary
    pub tasks_program: String,
    /// Actor identity for store mutations
    pub actor: String,
    pub max_workers: usize,
    pub poll_interval: Duration,
    pub steering_interval: Duration,
    pub replicas_enabled: bool,
}

impl Config {
    /// Resolve configuration: state dir from the environment, settings from
    /// `config.toml` when present, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = state_dir()?;
        let settings = load_settings(&state_dir)?;
        Ok(Self::from_parts(state_dir, settings))
    }

    fn from_parts(state_dir: PathBuf, settings: Settings) -> Self {
        let session_dir = state_dir.join("session");
        let project_root = env_path("OMS_PROJECT_ROOT")
            .or(settings.project_root)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            lock_path: state_dir.join("omsd.pid"),
            log_path: state_dir.join("omsd.log"),
            crashes_dir: session_dir.join("crashes"),
            socket_path: session_dir.join("singularity.sock"),
            session_dir,
            project_root,
            llm_program: std::env::var("OMS_LLM_PROGRAM")
                .ok()
                .or(settings.llm_program)
                .unwrap_or_else(|| "llm".to_string()),
            tasks_program: std::env::var("OMS_TASKS_PROGRAM")
                .ok()
                .or(settings.tasks_program)
                .unwrap_or_else(|| "tasks".to_string()),
            actor: settings.actor.unwrap_or_else(|| "singularity".to_string()),
            max_workers: env_usize("OMS_MAX_WORKERS")
                .or(settings.max_workers)
                .unwrap_or(4),
            poll_interval: env_ms("OMS_POLL_MS")
                .or(settings.poll_interval_ms.map(Duration::from_millis))
                .unwrap_or(oms_engine::timeouts::POLL_INTERVAL),
            steering_interval: env_ms("OMS_STEERING_MS")
                .or(settings.steering_interval_ms.map(Duration::from_millis))
                .unwrap_or(oms_engine::timeouts::STEERING_INTERVAL),
            replicas_enabled: settings.replicas_enabled.unwrap_or(true),
            state_dir,
        }
    }
}

/// Resolve state directory: OMS_STATE_DIR > XDG_STATE_HOME/oms > ~/.local/state/oms
fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("OMS_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("oms"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/oms"))
}

fn load_settings(state_dir: &std::path::Path) -> Result<Settings, ConfigError> {
    let path = state_dir.join("config.toml");
    if !path.is_file() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(toml::from_str(&content)?)
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name).map(PathBuf::from)
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_ms(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
