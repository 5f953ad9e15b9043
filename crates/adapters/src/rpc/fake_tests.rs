// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fake_records_commands_in_order() {
    let rpc = FakeRpc::new("worker:T1:a");
    rpc.prompt("go").await.unwrap();
    rpc.steer("left").await.unwrap();
    rpc.abort().await.unwrap();
    assert_eq!(rpc.command_names(), vec!["prompt", "steer", "abort"]);
}

#[tokio::test]
async fn scripted_responses_pop_in_order() {
    let rpc = FakeRpc::new("a");
    rpc.push_response("get_last_assistant_text", Ok(Some(json!({"text": "one"}))));
    rpc.push_response("get_last_assistant_text", Ok(Some(json!({"text": "two"}))));

    assert_eq!(
        rpc.get_last_assistant_text().await.unwrap().as_deref(),
        Some("one")
    );
    assert_eq!(
        rpc.get_last_assistant_text().await.unwrap().as_deref(),
        Some("two")
    );
    // Exhausted script falls back to empty success
    assert_eq!(rpc.get_last_assistant_text().await.unwrap(), None);
}

#[tokio::test]
async fn scripted_error_surfaces_as_command_failure() {
    let rpc = FakeRpc::new("a");
    rpc.push_response("steer", Err("agent is mid-tool".to_string()));
    let err = rpc.steer("x").await.unwrap_err();
    assert!(err.to_string().contains("agent is mid-tool"));
}

#[tokio::test]
async fn end_turn_resolves_wait() {
    let rpc = FakeRpc::new("a");
    let waiter = {
        let rpc = Arc::clone(&rpc);
        tokio::spawn(async move { rpc.wait_for_agent_end(Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;
    rpc.end_turn_with(json!({"ok": true}));
    let data = waiter.await.unwrap().unwrap();
    assert_eq!(data["ok"], true);
}

#[tokio::test]
async fn suppressed_end_is_consumed_before_wait_resolution() {
    let rpc = FakeRpc::new("a");
    rpc.suppress_next_agent_end();
    let waiter = {
        let rpc = Arc::clone(&rpc);
        tokio::spawn(async move { rpc.wait_for_agent_end(Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;
    rpc.end_turn(); // swallowed
    rpc.end_turn_with(json!({"real": 1}));
    let data = waiter.await.unwrap().unwrap();
    assert_eq!(data["real"], 1);
}

#[tokio::test]
async fn exit_rejects_waiters_and_send() {
    let rpc = FakeRpc::new("a");
    rpc.exit(Some(1));
    assert!(!rpc.is_running());
    assert!(rpc.prompt("x").await.is_err());
    assert!(rpc
        .wait_for_agent_end(Duration::from_millis(10))
        .await
        .is_err());
}

#[tokio::test]
async fn stop_is_idempotent() {
    let rpc = FakeRpc::new("a");
    rpc.stop(Duration::from_millis(10)).await.unwrap();
    rpc.stop(Duration::from_millis(10)).await.unwrap();
    assert!(!rpc.is_running());
}

#[tokio::test]
async fn session_id_cached_from_scripted_response() {
    let rpc = FakeRpc::new("a");
    rpc.push_response("get_session_id", Ok(Some(json!({"session_id": "s-1"}))));
    let sid = rpc.refresh_session_id().await.unwrap();
    assert_eq!(sid, "s-1");
    assert_eq!(rpc.session_id().unwrap(), "s-1");
}

#[tokio::test]
async fn refresh_falls_back_to_get_state() {
    let rpc = FakeRpc::new("a");
    rpc.push_response("get_session_id", Ok(None));
    rpc.push_response("get_state", Ok(Some(json!({"sessionId": "s-2"}))));
    let sid = rpc.refresh_session_id().await.unwrap();
    assert_eq!(sid, "s-2");
}

#[tokio::test]
async fn launcher_records_launches_and_scripts_errors() {
    let launcher = FakeLauncher::new();
    let spec = LaunchSpec {
        label: "issuer:T1:1".to_string(),
        program: "llm".to_string(),
        args: vec!["--tools".to_string(), "read".to_string()],
        env: vec![("OMS_TASK_ID".to_string(), "T1".to_string())],
        cwd: std::env::temp_dir(),
    };

    let rpc = launcher.launch(spec.clone()).await.unwrap();
    assert_eq!(rpc.label(), "issuer:T1:1");
    assert_eq!(launcher.launch_count(), 1);
    let (recorded, _handle) = launcher.nth_launch(0).await;
    assert_eq!(recorded, spec);

    launcher.push_launch_error("no binary");
    assert!(launcher.launch(spec).await.is_err());
}
