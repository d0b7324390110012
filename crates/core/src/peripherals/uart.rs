// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::InterruptLine;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use uartbeat_serial::SerialWrite;

#[derive(Debug, Clone, Copy, serde::Serialize)]
struct Shift {
    byte: u8,
    remaining: u32,
}

/// USART model with character timing.
///
/// A byte written to the data register takes `byte_ticks` ticks to leave the
/// shift register; the transmit-complete line is raised when it has. Bytes fed
/// onto the RX line arrive one character time apart and raise the receive line
/// once latched in the data register.
#[derive(Debug, Default, serde::Serialize)]
pub struct SimUart {
    byte_ticks: u32,
    tx_shift: Option<Shift>,
    rx_shift: Option<Shift>,
    #[serde(skip)]
    rx_line: VecDeque<u8>,
    rdr: Option<u8>,
    rx_irq: InterruptLine,
    tc_irq: InterruptLine,
    transmitted: u64,
    received: u64,
    tx_overruns: u64,
    rx_overruns: u64,
    #[serde(skip)]
    last_overrun: Option<u8>,
    #[serde(skip)]
    sink: Option<Arc<Mutex<Vec<u8>>>>,
    echo_stdout: bool,
}

impl SimUart {
    pub fn new(byte_ticks: u32) -> Self {
        Self {
            byte_ticks: byte_ticks.max(1),
            ..Default::default()
        }
    }

    pub fn set_sink(&mut self, sink: Option<Arc<Mutex<Vec<u8>>>>, echo_stdout: bool) {
        self.sink = sink;
        self.echo_stdout = echo_stdout;
    }

    /// Put bytes on the device's RX line; they arrive one character time apart.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx_line.extend(bytes.iter().copied());
    }

    /// Bytes still travelling towards the device, including one mid-character.
    pub fn rx_in_flight(&self) -> usize {
        self.rx_line.len() + usize::from(self.rx_shift.is_some())
    }

    pub fn is_transmitting(&self) -> bool {
        self.tx_shift.is_some()
    }

    pub fn rx_irq_pending(&self) -> bool {
        self.rx_irq.is_pending()
    }

    pub fn tc_irq_pending(&self) -> bool {
        self.tc_irq.is_pending()
    }

    /// Read the receive data register, clearing the receive line.
    pub fn read_data(&mut self) -> Option<u8> {
        self.rx_irq.clear();
        self.rdr.take()
    }

    /// Acknowledge transmit-complete, returning whether it was raised.
    pub fn ack_transmit_complete(&mut self) -> bool {
        self.tc_irq.take()
    }

    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn rx_overruns(&self) -> u64 {
        self.rx_overruns
    }

    /// Byte lost to the most recent transmit overrun, cleared on read.
    pub fn take_overrun(&mut self) -> Option<u8> {
        self.last_overrun.take()
    }

    /// Advance one tick. Returns the byte that finished leaving the
    /// transmitter during this tick, if any.
    pub fn tick(&mut self) -> Option<u8> {
        let mut sent = None;
        if let Some(shift) = self.tx_shift.as_mut() {
            shift.remaining = shift.remaining.saturating_sub(1);
            if shift.remaining == 0 {
                let byte = shift.byte;
                self.tx_shift = None;
                self.push_tx(byte);
                self.tc_irq.set_pending();
                sent = Some(byte);
            }
        }

        if self.rx_shift.is_none() {
            if let Some(byte) = self.rx_line.pop_front() {
                self.rx_shift = Some(Shift {
                    byte,
                    remaining: self.byte_ticks,
                });
            }
        }
        if let Some(shift) = self.rx_shift.as_mut() {
            shift.remaining = shift.remaining.saturating_sub(1);
            if shift.remaining == 0 {
                let byte = shift.byte;
                self.rx_shift = None;
                if self.rdr.replace(byte).is_some() {
                    self.rx_overruns += 1;
                    tracing::warn!("UART RX overrun, unread byte replaced by {:#04x}", byte);
                }
                self.received += 1;
                self.rx_irq.set_pending();
            }
        }
        sent
    }

    fn push_tx(&mut self, value: u8) {
        self.transmitted += 1;
        if let Some(sink) = &self.sink {
            if let Ok(mut guard) = sink.lock() {
                guard.push(value);
            }
        }

        if self.echo_stdout {
            #[allow(unused_must_use)]
            {
                print!("{}", value as char);
                io::stdout().flush();
            }
        }
    }
}

impl SerialWrite for SimUart {
    fn write_byte(&mut self, byte: u8) {
        if self.tx_shift.is_some() {
            self.tx_overruns += 1;
            self.last_overrun = Some(byte);
            tracing::warn!("UART TX overrun, {:#04x} written while shifting", byte);
            return;
        }
        self.tc_irq.clear();
        self.tx_shift = Some(Shift {
            byte,
            remaining: self.byte_ticks,
        });
    }
}
