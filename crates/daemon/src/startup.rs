// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: adapter construction, lock acquisition, crash-state
//! recovery, and control-socket binding.

use crate::config::Config;
use fs2::FileExt;
use oms_adapters::{
    select_replica_store, CommandTaskStore, CommandTaskStoreConfig, ControlListener,
    ProcessLauncher, TaskStore,
};
use oms_core::{ControlMessage, SystemClock};
use oms_engine::{Supervisor, SupervisorConfig, SupervisorDeps};
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Supervisor with the daemon's concrete adapter types.
pub type DaemonSupervisor = Supervisor<ProcessLauncher, CommandTaskStore, SystemClock>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("another omsd instance holds the lock")]
    LockFailed(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task store is not ready: {0}")]
    StoreNotReady(String),

    #[error("control socket bind failed: {0}")]
    SocketBind(std::io::Error),
}

/// Everything `main` needs after startup.
pub struct StartupResult {
    pub supervisor: Arc<DaemonSupervisor>,
    pub control: ControlListener,
    pub control_rx: mpsc::Receiver<ControlMessage>,
    // NOTE(lifetime): held to maintain the exclusive daemon lock
    #[allow(dead_code)]
    lock_file: File,
}

/// Bring the daemon up: lock, adapters, supervisor, recovery.
pub async fn startup(config: &Config) -> Result<StartupResult, StartupError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.session_dir)?;
    std::fs::create_dir_all(&config.crashes_dir)?;

    let lock_file = acquire_lock(config)?;

    let store = Arc::new(CommandTaskStore::new(CommandTaskStoreConfig {
        program: config.tasks_program.clone(),
        dir: config.session_dir.join("tasks"),
        actor: config.actor.clone(),
    }));
    if let Err(error) = store.ready().await {
        return Err(StartupError::StoreNotReady(error.to_string()));
    }

    let replicas = select_replica_store(
        config.project_root.clone(),
        config.session_dir.join("replica"),
        config.replicas_enabled,
    );

    let mut sup_config = SupervisorConfig::new(
        config.session_dir.clone(),
        config.project_root.clone(),
    );
    sup_config.llm_program = config.llm_program.clone();
    sup_config.socket_path = config.socket_path.clone();
    sup_config.actor = config.actor.clone();
    sup_config.max_workers = config.max_workers;
    sup_config.poll_interval = config.poll_interval;
    sup_config.steering_interval = config.steering_interval;

    let supervisor = Supervisor::new(
        SupervisorDeps {
            launcher: ProcessLauncher::new(),
            store: Arc::clone(&store),
            replicas,
        },
        SystemClock,
        sup_config,
    );

    // Replicas left by a previous run are the only crash-recovery hint.
    supervisor.restore_merger_queue_from_replicas().await;

    supervisor
        .registry()
        .start_heartbeat(store, oms_engine::timeouts::HEARTBEAT_INTERVAL);

    let (control_tx, control_rx) = mpsc::channel(64);
    let control = ControlListener::bind(&config.socket_path, control_tx)
        .map_err(StartupError::SocketBind)?;

    Ok(StartupResult {
        supervisor,
        control,
        control_rx,
        lock_file,
    })
}

fn acquire_lock(config: &Config) -> Result<File, StartupError> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&config.lock_path)?;
    file.try_lock_exclusive()
        .map_err(StartupError::LockFailed)?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}
