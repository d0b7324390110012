// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use uartbeat_config::{BoardConfig, DrainMode, MarkerStyle, TestAssertion, TestScript};

#[test]
fn test_full_board_parses() {
    let yaml = r#"
schema_version: "1.0"
name: "atmega-echo"
serial:
  baud: 500000
  data_bits: 8
  stop_bits: 1
heartbeat:
  period_ms: 1000
  ticks_per_ms: 8
  marker: toggle
  drain: all
simulation:
  loop_passes_per_tick: 2
"#;
    let board = BoardConfig::from_yaml(yaml).unwrap();
    assert_eq!(board.name, "atmega-echo");
    assert_eq!(board.serial.baud, 500000);
    assert_eq!(board.heartbeat.ticks_per_ms, 8);
    assert_eq!(board.heartbeat.marker, MarkerStyle::Alternating);
    assert_eq!(board.heartbeat.drain, DrainMode::Full);
    assert_eq!(board.simulation.loop_passes_per_tick, 2);
    // 10 bits at 500 kBd
    assert_eq!(board.serial.byte_time_us(), 20);
}

#[test]
fn test_unknown_board_field_rejected() {
    let yaml = r#"
name: "typo"
heartbeat:
  period: 1000
"#;
    assert!(BoardConfig::from_yaml(yaml).is_err());
}

#[test]
fn test_assertion_kinds_parse() {
    let yaml = r#"
schema_version: "1.0"
limits:
  duration_ms: 1000
  max_uart_bytes: 4096
assertions:
  - uart_contains: "-\n"
  - heartbeats_at_least: 1
  - max_rx_dropped: 0
  - max_tx_dropped: 3
  - led_toggles_at_least: 1
"#;
    let script = TestScript::from_yaml(yaml).unwrap();
    assert_eq!(script.limits.max_uart_bytes, Some(4096));
    assert!(matches!(script.assertions[0], TestAssertion::UartContains(_)));
    assert!(matches!(script.assertions[1], TestAssertion::HeartbeatsAtLeast(_)));
    assert!(matches!(script.assertions[2], TestAssertion::MaxRxDropped(_)));
    assert!(matches!(script.assertions[3], TestAssertion::MaxTxDropped(_)));
    assert!(matches!(script.assertions[4], TestAssertion::LedTogglesAtLeast(_)));
}
