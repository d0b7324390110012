// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Interrupt-driven serial I/O for single-core microcontrollers.
//!
//! Two lock-free byte rings (RX and TX) are shared between the USART interrupt
//! handlers and a cooperative main loop, next to a millisecond countdown fed by
//! a timer interrupt. [`app::Heartbeat`] is the main-loop body: echo what was
//! received, and emit a heartbeat line every period.
//!
//! Both rings drop the newest byte when full and count it; nothing blocks.
#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod port;
pub mod ring;
pub mod tick;

pub use app::{DrainPolicy, Heartbeat, HeartbeatMarker, HeartbeatSettings, PollReport, StatusOutput};
pub use port::{Foreground, Interrupts, PortStats, SerialPort, SerialWrite};
pub use ring::{Overflow, RingBuffer};
pub use tick::{Countdown, TickRate};

/// RX ring slots used by the firmware image and the simulator.
pub const RX_SLOTS: usize = 64;
/// TX ring slots used by the firmware image and the simulator.
pub const TX_SLOTS: usize = 64;

pub type DefaultPort = SerialPort<RX_SLOTS, TX_SLOTS>;
