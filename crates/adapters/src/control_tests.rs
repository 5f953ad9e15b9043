// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::io::AsyncWriteExt;

async fn setup() -> (PathBuf, mpsc::Receiver<ControlMessage>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("singularity.sock");
    let (tx, rx) = mpsc::channel(16);
    let listener = ControlListener::bind(&path, tx).unwrap();
    tokio::spawn(listener.run());
    (path, rx, dir)
}

#[tokio::test]
async fn delivers_interrupt_messages() {
    let (path, mut rx, _dir) = setup().await;

    let mut stream = UnixStream::connect(&path).await.unwrap();
    stream
        .write_all(b"{\"type\":\"interrupt_agent\",\"task_id\":\"T8\",\"message\":\"stop doing X\"}\n")
        .await
        .unwrap();

    let message = rx.recv().await.unwrap();
    assert_eq!(
        message,
        ControlMessage::InterruptAgent {
            task_id: "T8".to_string(),
            message: "stop doing X".to_string(),
            ts: None,
        }
    );
}

#[tokio::test]
async fn malformed_lines_are_dropped_and_later_lines_still_arrive() {
    let (path, mut rx, _dir) = setup().await;

    let mut stream = UnixStream::connect(&path).await.unwrap();
    stream.write_all(b"garbage\n").await.unwrap();
    stream
        .write_all(b"{\"type\":\"unknown_thing\"}\n")
        .await
        .unwrap();
    stream
        .write_all(b"{\"type\":\"interrupt_agent\",\"task_id\":\"T1\",\"message\":\"m\",\"ts\":5}\n")
        .await
        .unwrap();

    let message = rx.recv().await.unwrap();
    match message {
        ControlMessage::InterruptAgent { task_id, ts, .. } => {
            assert_eq!(task_id, "T1");
            assert_eq!(ts, Some(5));
        }
        other => unreachable!("unexpected control message: {:?}", other),
    }
}

#[tokio::test]
async fn bind_replaces_stale_socket_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("singularity.sock");
    std::fs::write(&path, "stale").unwrap();

    let (tx, _rx) = mpsc::channel(1);
    let listener = ControlListener::bind(&path, tx).unwrap();
    assert_eq!(listener.local_path().unwrap(), path);
}

#[tokio::test]
async fn multiple_connections_are_served() {
    let (path, mut rx, _dir) = setup().await;

    for i in 0..3 {
        let mut stream = UnixStream::connect(&path).await.unwrap();
        let line = format!(
            "{{\"type\":\"interrupt_agent\",\"task_id\":\"T{}\",\"message\":\"m\"}}\n",
            i
        );
        stream.write_all(line.as_bytes()).await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        match rx.recv().await.unwrap() {
            ControlMessage::InterruptAgent { task_id, .. } => seen.push(task_id),
            other => unreachable!("unexpected control message: {:?}", other),
        }
    }
    seen.sort();
    assert_eq!(seen, vec!["T0", "T1", "T2"]);
}
