// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Direction, Irq, SimulationObserver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Event counters collected from a running [`crate::Machine`].
#[derive(Debug)]
pub struct LineMetrics {
    tick_irqs: AtomicU64,
    rx_irqs: AtomicU64,
    tc_irqs: AtomicU64,
    bytes_out: AtomicU64,
    bytes_in: AtomicU64,
    rx_overflows: AtomicU64,
    tx_overflows: AtomicU64,
    heartbeat_times_ms: Mutex<Vec<u64>>,
    start_time: Mutex<Instant>,
}

impl Default for LineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LineMetrics {
    pub fn new() -> Self {
        Self {
            tick_irqs: AtomicU64::new(0),
            rx_irqs: AtomicU64::new(0),
            tc_irqs: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            rx_overflows: AtomicU64::new(0),
            tx_overflows: AtomicU64::new(0),
            heartbeat_times_ms: Mutex::new(Vec::new()),
            start_time: Mutex::new(Instant::now()),
        }
    }

    pub fn reset(&self) {
        self.tick_irqs.store(0, Ordering::SeqCst);
        self.rx_irqs.store(0, Ordering::SeqCst);
        self.tc_irqs.store(0, Ordering::SeqCst);
        self.bytes_out.store(0, Ordering::SeqCst);
        self.bytes_in.store(0, Ordering::SeqCst);
        self.rx_overflows.store(0, Ordering::SeqCst);
        self.tx_overflows.store(0, Ordering::SeqCst);
        if let Ok(mut v) = self.heartbeat_times_ms.lock() {
            v.clear();
        }
        if let Ok(mut t) = self.start_time.lock() {
            *t = Instant::now();
        }
    }

    pub fn get_interrupts(&self, irq: Irq) -> u64 {
        match irq {
            Irq::Tick => self.tick_irqs.load(Ordering::SeqCst),
            Irq::UartRx => self.rx_irqs.load(Ordering::SeqCst),
            Irq::UartTc => self.tc_irqs.load(Ordering::SeqCst),
        }
    }

    pub fn get_bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::SeqCst)
    }

    pub fn get_bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::SeqCst)
    }

    pub fn get_overflows(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Rx => self.rx_overflows.load(Ordering::SeqCst),
            Direction::Tx => self.tx_overflows.load(Ordering::SeqCst),
        }
    }

    pub fn heartbeat_times_ms(&self) -> Vec<u64> {
        self.heartbeat_times_ms
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Simulated ticks handled per wall-clock second.
    pub fn get_ticks_per_sec(&self) -> f64 {
        let elapsed = self
            .start_time
            .lock()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_interrupts(Irq::Tick) as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for LineMetrics {
    fn on_simulation_start(&self) {
        self.reset();
    }

    fn on_interrupt(&self, irq: Irq) {
        let counter = match irq {
            Irq::Tick => &self.tick_irqs,
            Irq::UartRx => &self.rx_irqs,
            Irq::UartTc => &self.tc_irqs,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn on_byte_transmitted(&self, _byte: u8) {
        self.bytes_out.fetch_add(1, Ordering::SeqCst);
    }

    fn on_byte_received(&self, _byte: u8) {
        self.bytes_in.fetch_add(1, Ordering::SeqCst);
    }

    fn on_heartbeat(&self, _marker: u8, at_ms: u64) {
        if let Ok(mut v) = self.heartbeat_times_ms.lock() {
            v.push(at_ms);
        }
    }

    fn on_overflow(&self, direction: Direction) {
        match direction {
            Direction::Rx => self.rx_overflows.fetch_add(1, Ordering::SeqCst),
            Direction::Tx => self.tx_overflows.fetch_add(1, Ordering::SeqCst),
        };
    }
}
