// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::sync::{Arc, Mutex};
use uartbeat_config::BoardConfig;
use uartbeat_core::metrics::LineMetrics;
use uartbeat_core::{Direction, Irq, Machine, MachineSettings, SimulationError};
use uartbeat_serial::{DrainPolicy, HeartbeatMarker};

fn machine_with_sink(settings: MachineSettings) -> (Machine, Arc<Mutex<Vec<u8>>>) {
    let mut machine = Machine::new(settings).unwrap();
    let sink = Arc::new(Mutex::new(Vec::new()));
    machine.uart.set_sink(Some(sink.clone()), false);
    (machine, sink)
}

fn strip_heartbeats(bytes: &[u8], marker: u8) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == marker && bytes.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

#[test]
fn test_idle_line_emits_one_heartbeat_per_second() {
    let (mut machine, sink) = machine_with_sink(MachineSettings::default());
    machine.run_for_ms(3500).unwrap();

    assert_eq!(machine.heartbeats(), 3);
    assert_eq!(*sink.lock().unwrap(), b"-\n-\n-\n".to_vec());
    assert_eq!(machine.led.toggles(), 3);
    assert_eq!(machine.heartbeat_offsets(), &[0, 2, 4]);

    let stats = machine.stats();
    assert_eq!(stats.elapsed_ms, 3500);
    assert_eq!(stats.bytes_out, 6);
    assert_eq!(stats.tx_dropped, 0);
}

#[test]
fn test_input_is_echoed_verbatim() {
    let (mut machine, sink) = machine_with_sink(MachineSettings::default());
    machine.schedule_input(10, b"hello").unwrap();

    assert!(machine.run_until_idle(200).unwrap());
    assert_eq!(*sink.lock().unwrap(), b"hello".to_vec());

    let stats = machine.stats();
    assert_eq!(stats.echoed, 5);
    assert_eq!(stats.bytes_in, 5);
    assert_eq!(stats.rx_dropped, 0);
    assert_eq!(machine.heartbeats(), 0);
}

#[test]
fn test_echo_across_heartbeat_keeps_input_order() {
    let (mut machine, sink) = machine_with_sink(MachineSettings::default());
    let text = b"the quick brown fox jumps over the lazy dog";
    machine.schedule_input(960, text).unwrap();
    machine.run_for_ms(1200).unwrap();

    let out = sink.lock().unwrap().clone();
    assert_eq!(machine.heartbeats(), 1);
    assert_eq!(strip_heartbeats(&out, b'-'), text.to_vec());
    assert_eq!(out.len(), text.len() + 2);

    let at = machine.heartbeat_offsets()[0] as usize;
    assert_eq!(&out[at..at + 2], b"-\n");
}

#[test]
fn test_full_drain_and_alternating_marker() {
    let mut settings = MachineSettings::default();
    settings.heartbeat.period_ms = 100;
    settings.heartbeat.marker = HeartbeatMarker::Alternating;
    settings.heartbeat.drain = DrainPolicy::Full;
    let (mut machine, sink) = machine_with_sink(settings);

    machine.schedule_input(150, b"ab").unwrap();
    machine.run_for_ms(450).unwrap();

    let out = sink.lock().unwrap().clone();
    assert_eq!(machine.heartbeats(), 4);
    assert_eq!(strip_heartbeats(&out, b'1'), b"ab0\n0\n".to_vec());
    let markers: Vec<u8> = out
        .windows(2)
        .filter(|w| w[1] == b'\n')
        .map(|w| w[0])
        .collect();
    assert_eq!(markers, b"1010".to_vec());
}

#[test]
fn test_sub_millisecond_ticks_keep_period() {
    let mut settings = MachineSettings::default();
    settings.heartbeat.tick_rate = uartbeat_serial::TickRate::new(8);
    settings.byte_ticks = 9;
    let (mut machine, _sink) = machine_with_sink(settings);

    machine.run_for_ms(2100).unwrap();
    assert_eq!(machine.heartbeats(), 2);
    assert_eq!(machine.total_ticks, 2100 * 8);
    assert_eq!(machine.now_ms(), 2100);
}

#[test]
fn test_observer_sees_line_traffic() {
    let (mut machine, _sink) = machine_with_sink(MachineSettings::default());
    let metrics = Arc::new(LineMetrics::new());
    machine.add_observer(metrics.clone());

    machine.schedule_input(0, b"xyz").unwrap();
    machine.run_for_ms(1100).unwrap();
    machine.shutdown();

    assert_eq!(metrics.get_interrupts(Irq::Tick), 1100);
    assert_eq!(metrics.get_interrupts(Irq::UartRx), 3);
    // three echoes plus marker and terminator
    assert_eq!(metrics.get_interrupts(Irq::UartTc), 5);
    assert_eq!(metrics.get_bytes_in(), 3);
    assert_eq!(metrics.get_bytes_out(), 5);
    assert_eq!(metrics.get_overflows(Direction::Rx), 0);
    assert_eq!(metrics.get_overflows(Direction::Tx), 0);
    assert_eq!(metrics.heartbeat_times_ms(), vec![1000]);
}

#[test]
fn test_board_config_drives_line_timing() {
    let yaml = r#"
schema_version: "1.0"
name: "slow-line"
serial:
  baud: 1200
heartbeat:
  period_ms: 500
"#;
    let board = BoardConfig::from_yaml(yaml).unwrap();
    let settings = MachineSettings::from_board(&board);
    // 10 bits at 1200 Bd is 8334 us
    assert_eq!(settings.byte_ticks, 9);
    assert_eq!(settings.heartbeat.period_ms, 500);

    let mut machine = Machine::from_board(&board).unwrap();
    machine.run_for_ms(501).unwrap();
    assert_eq!(machine.heartbeats(), 1);
    assert!(machine.uart.is_transmitting());
    machine.run_for_ms(20).unwrap();
    assert_eq!(machine.uart.transmitted(), 2);
}

#[test]
fn test_input_in_the_past_is_rejected() {
    let (mut machine, _sink) = machine_with_sink(MachineSettings::default());
    machine.run_for_ms(50).unwrap();
    assert_eq!(
        machine.schedule_input(10, b"late"),
        Err(SimulationError::InputInPast {
            at_ms: 10,
            now_ms: 50
        })
    );
}

#[test]
fn test_zero_loop_passes_rejected() {
    let settings = MachineSettings {
        loop_passes_per_tick: 0,
        ..MachineSettings::default()
    };
    assert!(matches!(
        Machine::new(settings),
        Err(SimulationError::InvalidSettings(_))
    ));
}

#[test]
fn test_snapshot_serializes() {
    let (mut machine, _sink) = machine_with_sink(MachineSettings::default());
    machine.schedule_input(0, b"k").unwrap();
    machine.run_for_ms(3).unwrap();

    let snap = machine.snapshot();
    assert_eq!(snap.now_ms, 3);
    assert_eq!(snap.countdown_remaining, 997);
    assert_eq!(snap.port.rx_capacity, 63);
    assert!(snap.peripherals.contains_key("usart1"));

    let json = serde_json::to_string(&snap).unwrap();
    assert!(json.contains("\"tx_active\""));
}

#[test]
fn test_long_stream_overflows_tx_ring() {
    // Heartbeats add two bytes a second to a line already running at full
    // rate, so the TX backlog grows until the ring gives out.
    let (mut machine, sink) = machine_with_sink(MachineSettings::default());
    let metrics = Arc::new(LineMetrics::new());
    machine.add_observer(metrics.clone());

    machine.feed(&vec![b'a'; 40_000]);
    assert!(machine.run_until_idle(200_000).unwrap());

    let stats = machine.stats();
    assert_eq!(stats.echoed, 40_000);
    assert_eq!(stats.rx_dropped, 0);
    assert!(stats.tx_dropped > 0);
    assert_eq!(metrics.get_overflows(Direction::Tx), stats.tx_dropped as u64);
    assert_eq!(metrics.get_overflows(Direction::Rx), 0);

    let out = sink.lock().unwrap().clone();
    assert_eq!(
        out.len() as u64,
        40_000 + 2 * machine.heartbeats() - stats.tx_dropped as u64
    );

    // Offsets still land on whole heartbeats after bytes were dropped.
    let offsets = machine.heartbeat_offsets();
    assert!(!offsets.is_empty());
    assert!(offsets.len() as u64 <= machine.heartbeats());
    for &at in offsets {
        let at = at as usize;
        assert_eq!(&out[at..at + 2], b"-\n", "heartbeat at offset {}", at);
    }
}
