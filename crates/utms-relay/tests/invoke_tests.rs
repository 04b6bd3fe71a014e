#![cfg(unix)]

mod common;

use serde_json::{json, Value};
use std::time::{Duration, Instant};
use utms_relay::error::InvokeError;
use utms_relay::invoke::{ProcessInvoker, SubCommand};
use utms_relay::InvokerConfig;

use common::{config_for, dead_upstream, spawn_relay};

/// `sh -c <script> sh <sub-command>`: the sub-command lands in `$1`.
fn shell(script: &str) -> InvokerConfig {
    InvokerConfig {
        program: "sh".into(),
        args: vec!["-c".into(), script.into(), "sh".into()],
        timeout_ms: 5_000,
        result_sentinel: None,
    }
}

const SCAN: &str = r#"
echo "Found: /dev/ttyUSB0 - CP2102" >&2
echo "Trying /dev/ttyUSB0 at 57600 baud..."
echo "Trying /dev/ttyUSB0 at 115200 baud..."
echo '{"success":true,"ports":[]}'
"#;

#[tokio::test]
async fn last_line_is_the_result() {
    let v = ProcessInvoker::new(&shell(SCAN)).invoke(SubCommand::ScanPorts).await.unwrap();
    assert_eq!(v, json!({"success": true, "ports": []}));
}

#[tokio::test]
async fn sub_command_is_passed_last() {
    let inv = ProcessInvoker::new(&shell(r#"echo "{\"success\":true,\"cmd\":\"$1\"}""#));
    assert_eq!(inv.invoke(SubCommand::AutoConnect).await.unwrap()["cmd"], "auto_connect");
    assert_eq!(inv.invoke(SubCommand::ScanPorts).await.unwrap()["cmd"], "scan_ports");
}

#[tokio::test]
async fn non_json_last_line_is_parse_error() {
    let inv = ProcessInvoker::new(&shell("echo '{\"success\":true}'; echo 'done.'"));
    match inv.invoke(SubCommand::ScanPorts).await {
        Err(InvokeError::Parse { line, .. }) => assert_eq!(line, "done."),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[tokio::test]
async fn sentinel_line_wins_over_trailing_output() {
    let mut cfg = shell("echo '@@RESULT {\"success\":true,\"port\":\"COM7\"}'; echo 'closing link'");
    cfg.result_sentinel = Some("@@RESULT".into());
    let v = ProcessInvoker::new(&cfg).invoke(SubCommand::AutoConnect).await.unwrap();
    assert_eq!(v["port"], "COM7");
}

#[tokio::test]
async fn failing_child_reports_stderr() {
    let inv = ProcessInvoker::new(&shell("echo 'No module named serial' >&2; exit 3"));
    match inv.invoke(SubCommand::ScanPorts).await {
        Err(e @ InvokeError::Exit { code: Some(3), .. }) => assert_eq!(e.to_string(), "No module named serial"),
        other => panic!("expected exit error, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_program_is_spawn_error() {
    let cfg = InvokerConfig { program: "/nonexistent/utms-controller".into(), ..shell("") };
    assert!(matches!(
        ProcessInvoker::new(&cfg).invoke(SubCommand::ScanPorts).await,
        Err(InvokeError::Spawn { .. })
    ));
}

#[tokio::test]
async fn slow_child_times_out() {
    let mut cfg = shell("sleep 10; echo '{}'");
    cfg.timeout_ms = 200;
    let started = Instant::now();
    let res = ProcessInvoker::new(&cfg).invoke(SubCommand::AutoConnect).await;
    assert!(matches!(res, Err(InvokeError::Timeout(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn scan_endpoint_returns_result_verbatim() {
    let mut cfg = config_for(dead_upstream().await);
    cfg.invoker = shell(
        r#"echo "scanning" ; echo '{"success":true,"count":1,"ports":[{"port":"/dev/ttyACM0","description":"CubeOrange"}]}'"#,
    );
    let relay = spawn_relay(cfg).await;

    let resp = reqwest::get(relay.url("/api/ports/scan")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({"success": true, "count": 1, "ports": [{"port": "/dev/ttyACM0", "description": "CubeOrange"}]})
    );
}

#[tokio::test]
async fn bad_output_gives_500_with_context() {
    let mut cfg = config_for(dead_upstream().await);
    cfg.invoker = shell("echo 'Traceback (most recent call last):'");
    let relay = spawn_relay(cfg).await;

    let resp = reqwest::Client::new().post(relay.url("/api/auto-connect")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(body["message"].as_str().unwrap().starts_with("Auto-connect failed: "));
}
