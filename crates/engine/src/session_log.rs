// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only session log (`oms.log`, one JSON object per line).
//!
//! Write failures are reported via tracing and never propagate — logging
//! must not break the engine.

use oms_core::time_fmt::now_epoch_ms;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Line-JSON logger for the supervisor session.
#[derive(Clone)]
pub struct SessionLog {
    inner: Arc<Mutex<LogInner>>,
}

struct LogInner {
    path: PathBuf,
    warned: bool,
}

impl SessionLog {
    /// Logger appending to `<session_dir>/oms.log`.
    pub fn new(session_dir: &std::path::Path) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                path: session_dir.join("oms.log"),
                warned: false,
            })),
        }
    }

    pub fn info(&self, area: &str, msg: &str, fields: Value) {
        self.append("info", area, msg, fields);
    }

    pub fn warn(&self, area: &str, msg: &str, fields: Value) {
        self.append("warn", area, msg, fields);
    }

    pub fn error(&self, area: &str, msg: &str, fields: Value) {
        self.append("error", area, msg, fields);
    }

    fn append(&self, level: &str, area: &str, msg: &str, fields: Value) {
        let mut line = json!({
            "ts": now_epoch_ms(),
            "level": level,
            "area": area,
            "msg": msg,
        });
        if let (Some(obj), Some(extra)) = (line.as_object_mut(), fields.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }

        let mut inner = self.inner.lock();
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = inner.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&inner.path)?;
            writeln!(file, "{}", line)?;
            Ok(())
        })();

        if let Err(error) = result {
            // Warn once per logger so a broken disk does not flood tracing
            if !inner.warned {
                inner.warned = true;
                tracing::warn!(%error, path = %inner.path.display(), "session log write failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "session_log_tests.rs"]
mod tests;
