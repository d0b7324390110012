// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Double-buffered serial port shared between the main loop and the USART
//! interrupt handlers.
//!
//! [`SerialPort::split`] hands out one [`Foreground`] handle for the main loop
//! and one [`Interrupts`] handle for interrupt context. Each ring index has a
//! single writer because each handle owns exactly one role per ring:
//!
//! | ring | producer (`head`)           | consumer (`tail`)          |
//! |------|-----------------------------|----------------------------|
//! | RX   | `Interrupts::on_byte_received` | `Foreground::try_take_received` |
//! | TX   | `Foreground::send`          | `Interrupts::on_transmit_complete` |

use crate::ring::{Overflow, RingBuffer};
use core::sync::atomic::{AtomicBool, Ordering};

/// Output register write primitive of the USART.
pub trait SerialWrite {
    fn write_byte(&mut self, byte: u8);
}

impl<W: SerialWrite + ?Sized> SerialWrite for &mut W {
    fn write_byte(&mut self, byte: u8) {
        (**self).write_byte(byte)
    }
}

/// Point-in-time counters of a [`SerialPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortStats {
    pub rx_pending: usize,
    pub tx_pending: usize,
    pub rx_dropped: u32,
    pub tx_dropped: u32,
    pub tx_active: bool,
}

pub struct SerialPort<const RX: usize, const TX: usize> {
    rx: RingBuffer<RX>,
    tx: RingBuffer<TX>,
    // Set by the fast path when a byte goes straight to the data register,
    // cleared by the completion handler once the TX ring has run dry.
    tx_active: AtomicBool,
}

impl<const RX: usize, const TX: usize> SerialPort<RX, TX> {
    pub const fn new() -> Self {
        Self {
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
            tx_active: AtomicBool::new(false),
        }
    }

    /// Split the port into its main-loop and interrupt halves.
    ///
    /// The exclusive borrow guarantees at most one handle of each role exists.
    pub fn split(&mut self) -> (Foreground<'_, RX, TX>, Interrupts<'_, RX, TX>) {
        let port: &Self = self;
        (Foreground { port }, Interrupts { port })
    }

    pub fn rx(&self) -> &RingBuffer<RX> {
        &self.rx
    }

    pub fn tx(&self) -> &RingBuffer<TX> {
        &self.tx
    }

    pub fn stats(&self) -> PortStats {
        PortStats {
            rx_pending: self.rx.len(),
            tx_pending: self.tx.len(),
            rx_dropped: self.rx.dropped(),
            tx_dropped: self.tx.dropped(),
            tx_active: self.tx_active.load(Ordering::Acquire),
        }
    }
}

impl<const RX: usize, const TX: usize> Default for SerialPort<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

/// Main-loop half of a [`SerialPort`]: RX consumer, TX producer.
pub struct Foreground<'a, const RX: usize, const TX: usize> {
    port: &'a SerialPort<RX, TX>,
}

impl<'a, const RX: usize, const TX: usize> Foreground<'a, RX, TX> {
    /// Next received byte in arrival order, or `None` if nothing is pending.
    pub fn try_take_received(&mut self) -> Option<u8> {
        // SAFETY: the foreground handle is the only RX consumer.
        unsafe { self.port.rx.pop() }
    }

    /// Queue `byte` for transmission without blocking.
    ///
    /// With the TX ring empty and the transmitter idle the byte is written to
    /// `uart` directly. Otherwise it is buffered for the completion handler.
    /// A full ring rejects the byte and reports [`Overflow`].
    pub fn send<W: SerialWrite>(&mut self, uart: &mut W, byte: u8) -> Result<(), Overflow> {
        let port = self.port;
        // The active flag has two writers; mask the completion handler while we
        // decide between the two paths.
        critical_section::with(|_| {
            if port.tx.is_empty() && !port.tx_active.load(Ordering::Acquire) {
                port.tx_active.store(true, Ordering::Release);
                uart.write_byte(byte);
                Ok(())
            } else {
                // SAFETY: the foreground handle is the only TX producer.
                unsafe { port.tx.push(byte) }
            }
        })
    }

    pub fn is_tx_idle(&self) -> bool {
        self.port.tx.is_empty() && !self.port.tx_active.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PortStats {
        self.port.stats()
    }
}

/// Interrupt half of a [`SerialPort`]: RX producer, TX consumer.
pub struct Interrupts<'a, const RX: usize, const TX: usize> {
    port: &'a SerialPort<RX, TX>,
}

impl<'a, const RX: usize, const TX: usize> Interrupts<'a, RX, TX> {
    /// "Byte received" handler. A full RX ring drops `byte`.
    pub fn on_byte_received(&mut self, byte: u8) -> Result<(), Overflow> {
        // SAFETY: the interrupt handle is the only RX producer.
        unsafe { self.port.rx.push(byte) }
    }

    /// "Transmit complete" handler. Feeds the next buffered byte to `uart`,
    /// returning `true` if one was written. With nothing left the transmitter
    /// is marked idle so the next `send` takes the fast path.
    pub fn on_transmit_complete<W: SerialWrite>(&mut self, uart: &mut W) -> bool {
        let port = self.port;
        critical_section::with(|_| {
            // SAFETY: the interrupt handle is the only TX consumer.
            match unsafe { port.tx.pop() } {
                Some(byte) => {
                    uart.write_byte(byte);
                    true
                }
                None => {
                    port.tx_active.store(false, Ordering::Release);
                    false
                }
            }
        })
    }

    pub fn stats(&self) -> PortStats {
        self.port.stats()
    }
}
