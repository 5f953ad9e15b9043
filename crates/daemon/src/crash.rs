// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash files: one JSON file per crash under `<session>/crashes/`.
//!
//! Write-only during operation; read by humans after the fact. Failures to
//! write are swallowed — crash reporting must not crash.

use oms_core::time_fmt::{format_utc, now_epoch_ms};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Write one crash file and return its path.
pub fn write_crash_file(crashes_dir: &Path, area: &str, detail: &str) -> Option<PathBuf> {
    let ts_ms = now_epoch_ms();
    let name = format!("{}-{}.json", ts_ms, sanitize(area));
    let path = crashes_dir.join(name);

    let body = json!({
        "ts": ts_ms,
        "time": format_utc(ts_ms / 1000),
        "area": area,
        "detail": detail,
        "pid": std::process::id(),
    });

    let result = std::fs::create_dir_all(crashes_dir).and_then(|_| {
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&body).unwrap_or_else(|_| "{}".to_string()),
        )
    });
    match result {
        Ok(()) => Some(path),
        Err(error) => {
            tracing::warn!(%error, "failed to write crash file");
            None
        }
    }
}

/// Install a panic hook that writes a crash file before the default hook.
pub fn install_panic_hook(crashes_dir: PathBuf) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let detail = info.to_string();
        write_crash_file(&crashes_dir, "panic", &detail);
        default_hook(info);
    }));
}

fn sanitize(area: &str) -> String {
    area.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        })
        .collect()
}

#[cfg(test)]
#[path = "crash_tests.rs"]
mod tests;
