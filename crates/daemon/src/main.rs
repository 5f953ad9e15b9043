// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OMS Daemon (omsd)
//!
//! Single-supervisor process that claims tasks, spawns LLM agent
//! subprocesses, steers them, serializes merges, and closes tasks.
//!
//! Architecture:
//! - Control listener task: Unix-socket inbound messages from agent extensions
//! - Supervisor loop: periodic tick driving pipelines, steering, and merges

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use oms_daemon::{config::Config, crash, startup, StartupError};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("omsd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("omsd {}", env!("CARGO_PKG_VERSION"));
                println!("OMS Daemon - supervises LLM agent subprocesses over a task store");
                println!();
                println!("USAGE:");
                println!("    omsd");
                println!();
                println!("The daemon runs unattended. Agents talk back over the control");
                println!("socket; humans talk to it through the task store.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: omsd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Rotate the log before tracing opens it
    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    crash::install_panic_hook(config.crashes_dir.clone());

    info!("Starting singularity supervisor");

    let result = match startup::startup(&config).await {
        Ok(result) => result,
        Err(StartupError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("omsd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            crash::write_crash_file(&config.crashes_dir, "startup", &e.to_string());
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let supervisor = result.supervisor;
    let mut control_rx = result.control_rx;

    // Control socket listener task
    tokio::spawn(result.control.run());

    // Supervisor tick loop
    let loop_handle = tokio::spawn(Arc::clone(&supervisor).run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        "Daemon ready, control socket at {}",
        config.socket_path.display()
    );

    loop {
        tokio::select! {
            message = control_rx.recv() => {
                match message {
                    Some(message) => supervisor.handle_control_message(message).await,
                    None => {
                        info!("Control channel closed, shutting down...");
                        break;
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
        }
    }

    // Graceful stop with a bounded grace window, then force-kill stragglers.
    let grace = oms_engine::timeouts::SHUTDOWN_GRACE + Duration::from_secs(2);
    if tokio::time::timeout(grace, supervisor.stop()).await.is_err() {
        error!("Graceful stop timed out; force-killing remaining agents");
        for record in supervisor.registry().get_all() {
            record.rpc.force_kill();
        }
    }
    loop_handle.abort();

    info!("Daemon stopped");
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (omsd.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `omsd.log` → `omsd.log.1` → `omsd.log.2` → `omsd.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Startup marker prefix written to the log before anything else.
/// Full format: "--- omsd: starting (pid: 12345) ---"
const STARTUP_MARKER_PREFIX: &str = "--- omsd: starting (pid: ";

fn write_startup_marker(config: &Config) -> Result<(), std::io::Error> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(
        file,
        "{}{}) ---\n",
        STARTUP_MARKER_PREFIX,
        std::process::id()
    )?;

    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let parent = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent"))?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;
    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
