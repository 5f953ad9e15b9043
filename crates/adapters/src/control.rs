// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound control socket.
//!
//! Extensions running inside agent child processes deliver urgent messages
//! to the supervisor over a Unix-domain socket (path exported to children as
//! `OMS_SINGULARITY_SOCK`). One JSON message per line, best-effort: there is
//! no response channel, and a slow or malformed client never blocks the
//! supervisor.

use oms_core::ControlMessage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

/// Per-line read timeout; a writer that stalls longer is dropped.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1500);

/// Unix-socket listener forwarding control messages to the supervisor.
pub struct ControlListener {
    listener: UnixListener,
    tx: mpsc::Sender<ControlMessage>,
}

impl ControlListener {
    /// Bind the socket, replacing any stale file at the path.
    pub fn bind(
        path: &Path,
        tx: mpsc::Sender<ControlMessage>,
    ) -> std::io::Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        Ok(Self { listener, tx })
    }

    /// Path the listener is bound to.
    pub fn local_path(&self) -> Option<PathBuf> {
        self.listener
            .local_addr()
            .ok()
            .and_then(|addr| addr.as_pathname().map(Path::to_path_buf))
    }

    /// Accept loop. Runs until the receiver side is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, tx).await;
                    });
                }
                Err(error) => {
                    tracing::warn!(%error, "control socket accept failed");
                    // Brief pause so a persistent accept error cannot spin
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, tx: mpsc::Sender<ControlMessage>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = match tokio::time::timeout(READ_TIMEOUT, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => break,
            Ok(Err(error)) => {
                tracing::debug!(%error, "control socket read error");
                break;
            }
            Err(_elapsed) => {
                tracing::debug!("control socket read timed out");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match ControlMessage::parse(&line) {
            Ok(message) => {
                if tx.send(message).await.is_err() {
                    // Supervisor is gone; nothing left to deliver to
                    return;
                }
            }
            Err(error) => {
                tracing::warn!(%error, line, "dropping malformed control message");
            }
        }
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
