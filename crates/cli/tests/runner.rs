// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde_json::Value;
use std::path::PathBuf;
use std::process::{Command, Output};

fn fresh_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("uartbeat-runner-{}", name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn run_script(dir: &PathBuf, script: &str, extra: &[&str]) -> (Output, PathBuf) {
    let script_path = dir.join("script.yaml");
    std::fs::write(&script_path, script).unwrap();
    let out_dir = dir.join("artifacts");

    let output = Command::new(env!("CARGO_BIN_EXE_uartbeat"))
        .arg("test")
        .arg("--script")
        .arg(&script_path)
        .arg("--output-dir")
        .arg(&out_dir)
        .arg("--no-uart-stdout")
        .args(extra)
        .output()
        .expect("Failed to run uartbeat");
    (output, out_dir)
}

fn read_result(out_dir: &PathBuf) -> Value {
    let path = out_dir.join("result.json");
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing result.json at {:?}: {}", path, e));
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_passing_script_writes_artifacts() {
    let dir = fresh_dir("pass");
    let script = r#"
schema_version: "1.0"
limits:
  duration_ms: 2500
inputs:
  - at_ms: 10
    text: "ping"
assertions:
  - uart_contains: "ping"
  - heartbeats_at_least: 2
  - max_rx_dropped: 0
  - max_tx_dropped: 0
  - led_toggles_at_least: 2
"#;
    let (output, out_dir) = run_script(&dir, script, &[]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result = read_result(&out_dir);
    assert_eq!(result["result_schema_version"], "1.0");
    assert_eq!(result["status"], "pass");
    assert_eq!(result["stop_reason"], "duration");
    assert_eq!(result["elapsed_ms"], 2500);
    assert_eq!(result["stats"]["heartbeats"], 2);
    assert_eq!(result["heartbeat_times_ms"], serde_json::json!([1000, 2000]));
    assert_eq!(result["assertions"].as_array().unwrap().len(), 5);
    assert_eq!(result["assertions"][0]["assertion"]["uart_contains"], "ping");
    assert_eq!(result["assertions"][0]["passed"], true);
    assert_eq!(
        result["stop_reason_details"]["triggered_limit"]["name"],
        "duration_ms"
    );

    let uart = std::fs::read(out_dir.join("uart.log")).unwrap();
    assert_eq!(uart, b"ping-\n-\n".to_vec());
    assert!(out_dir.join("snapshot.json").exists());
}

#[test]
fn test_failed_assertion_exits_one() {
    let dir = fresh_dir("fail");
    let script = r#"
schema_version: "1.0"
limits:
  duration_ms: 2500
assertions:
  - heartbeats_at_least: 5
"#;
    let (output, out_dir) = run_script(&dir, script, &[]);
    assert_eq!(output.status.code(), Some(1));

    let result = read_result(&out_dir);
    assert_eq!(result["status"], "fail");
    assert_eq!(result["assertions"][0]["passed"], false);
}

#[test]
fn test_bad_script_is_config_error() {
    let dir = fresh_dir("bad-schema");
    let script = r#"
schema_version: "2.0"
limits:
  duration_ms: 100
"#;
    let (output, out_dir) = run_script(&dir, script, &[]);
    assert_eq!(output.status.code(), Some(2));

    let result = read_result(&out_dir);
    assert_eq!(result["status"], "error");
    assert_eq!(result["stop_reason"], "config_error");
    assert!(result["message"]
        .as_str()
        .unwrap()
        .contains("Unsupported schema_version"));
    assert!(!out_dir.join("snapshot.json").exists());
}

#[test]
fn test_board_resolved_relative_to_script() {
    let dir = fresh_dir("board");
    std::fs::write(
        dir.join("board.yaml"),
        r#"
schema_version: "1.0"
name: "toggle-board"
heartbeat:
  period_ms: 200
  marker: toggle
"#,
    )
    .unwrap();
    let script = r#"
schema_version: "1.0"
board: "board.yaml"
limits:
  duration_ms: 1000
assertions:
  - uart_contains: "1\n0\n"
"#;
    let (output, out_dir) = run_script(&dir, script, &[]);
    assert_eq!(output.status.code(), Some(0));

    let uart = std::fs::read(out_dir.join("uart.log")).unwrap();
    assert_eq!(uart, b"1\n0\n1\n0\n".to_vec());

    let result = read_result(&out_dir);
    assert!(result["config"]["board"]
        .as_str()
        .unwrap()
        .ends_with("board.yaml"));
}

#[test]
fn test_max_uart_bytes_stops_early() {
    let dir = fresh_dir("max-bytes");
    let script = r#"
schema_version: "1.0"
limits:
  duration_ms: 5000
  max_uart_bytes: 4
"#;
    let (output, out_dir) = run_script(&dir, script, &[]);
    assert_eq!(output.status.code(), Some(0));

    let result = read_result(&out_dir);
    assert_eq!(result["stop_reason"], "max_uart_bytes");
    assert_eq!(result["stats"]["heartbeats"], 2);
    assert!(result["elapsed_ms"].as_u64().unwrap() < 2100);
    assert_eq!(result["stop_reason_details"]["observed"]["value"], 4);
}

#[test]
fn test_cli_duration_overrides_script() {
    let dir = fresh_dir("override");
    let script = r#"
schema_version: "1.0"
limits:
  duration_ms: 5000
assertions:
  - heartbeats_at_least: 1
"#;
    let (output, out_dir) = run_script(&dir, script, &["--duration-ms", "1500"]);
    assert_eq!(output.status.code(), Some(0));

    let result = read_result(&out_dir);
    assert_eq!(result["limits"]["duration_ms"], 1500);
    assert_eq!(result["stats"]["heartbeats"], 1);
}

#[test]
fn test_tx_overflow_fails_drop_assertion() {
    let dir = fresh_dir("tx-overflow");
    let script = format!(
        r#"
schema_version: "1.0"
limits:
  duration_ms: 60000
inputs:
  - at_ms: 0
    text: "{}"
assertions:
  - max_tx_dropped: 0
"#,
        "a".repeat(24_000)
    );
    let (output, out_dir) = run_script(&dir, &script, &[]);
    assert_eq!(output.status.code(), Some(1));

    let result = read_result(&out_dir);
    assert_eq!(result["status"], "fail");
    assert_eq!(result["assertions"][0]["passed"], false);
    assert!(result["stats"]["tx_dropped"].as_u64().unwrap() > 0);
    assert_eq!(result["stats"]["rx_dropped"], 0);
}
