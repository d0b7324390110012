// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod machine;
pub mod metrics;
pub mod peripherals;
pub mod signals;
pub mod snapshot;

pub use machine::{Machine, MachineSettings, RunStats, StepReport};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("UART transmit overrun: {0:#04x} written while a byte was still shifting")]
    TransmitOverrun(u8),
    #[error("input scheduled at {at_ms} ms is already in the past (now {now_ms} ms)")]
    InputInPast { at_ms: u64, now_ms: u64 },
    #[error("invalid machine settings: {0}")]
    InvalidSettings(&'static str),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Interrupt sources wired into the simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Irq {
    Tick,
    UartRx,
    UartTc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Rx,
    Tx,
}

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_simulation_stop(&self) {}
    fn on_interrupt(&self, _irq: Irq) {}
    fn on_byte_transmitted(&self, _byte: u8) {}
    fn on_byte_received(&self, _byte: u8) {}
    fn on_heartbeat(&self, _marker: u8, _at_ms: u64) {}
    fn on_overflow(&self, _direction: Direction) {}
}
