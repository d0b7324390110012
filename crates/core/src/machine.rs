// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripherals::{led::StatusLed, timer::TickTimer, uart::SimUart};
use crate::snapshot::{MachineSnapshot, PortSnapshot};
use crate::{Direction, Irq, SimResult, SimulationError, SimulationObserver};
use std::collections::BTreeMap;
use std::sync::Arc;
use uartbeat_config::{BoardConfig, DrainMode, MarkerStyle};
use uartbeat_serial::{
    Countdown, DefaultPort, DrainPolicy, Heartbeat, HeartbeatMarker, HeartbeatSettings, TickRate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineSettings {
    pub heartbeat: HeartbeatSettings,
    /// Character time on the line, in timer ticks.
    pub byte_ticks: u32,
    /// Main-loop passes between two timer ticks.
    pub loop_passes_per_tick: u32,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatSettings::DEFAULT,
            // 9600 8N1 at one tick per millisecond
            byte_ticks: 2,
            loop_passes_per_tick: 4,
        }
    }
}

impl MachineSettings {
    pub fn from_board(board: &BoardConfig) -> Self {
        let tick_rate = TickRate::new(board.heartbeat.ticks_per_ms);
        let byte_ticks = (board.serial.byte_time_us() * tick_rate.ticks_per_ms() as u64)
            .div_ceil(1000)
            .clamp(1, u32::MAX as u64) as u32;

        Self {
            heartbeat: HeartbeatSettings {
                period_ms: board.heartbeat.period_ms,
                tick_rate,
                marker: match board.heartbeat.marker {
                    MarkerStyle::Dash => HeartbeatMarker::Dash,
                    MarkerStyle::Alternating => HeartbeatMarker::Alternating,
                },
                drain: match board.heartbeat.drain {
                    DrainMode::OnePerPass => DrainPolicy::OnePerPass,
                    DrainMode::Full => DrainPolicy::Full,
                },
            },
            byte_ticks,
            loop_passes_per_tick: board.simulation.loop_passes_per_tick,
        }
    }

    fn validate(&self) -> SimResult<()> {
        if self.byte_ticks == 0 {
            return Err(SimulationError::InvalidSettings(
                "byte_ticks must be at least one tick",
            ));
        }
        if self.loop_passes_per_tick == 0 {
            return Err(SimulationError::InvalidSettings(
                "loop_passes_per_tick must be greater than zero",
            ));
        }
        if self.heartbeat.period_ticks() == 0 {
            return Err(SimulationError::InvalidSettings(
                "heartbeat period must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// What happened during one [`Machine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    pub echoed: usize,
    pub heartbeat: Option<u8>,
    /// Byte that finished leaving the transmitter this tick.
    pub sent: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct RunStats {
    pub elapsed_ms: u64,
    pub ticks: u64,
    pub heartbeats: u64,
    pub echoed: u64,
    pub bytes_out: u64,
    pub bytes_in: u64,
    pub rx_dropped: u32,
    pub tx_dropped: u32,
    pub rx_overruns: u64,
    pub led_toggles: u64,
}

/// The firmware's serial logic running against simulated peripherals.
///
/// Each [`step`](Machine::step) runs `loop_passes_per_tick` main-loop passes,
/// advances simulated time by one timer tick and then delivers the pending
/// interrupts in vector order: tick, USART receive, USART transmit-complete.
/// Everything happens on one thread, so runs are deterministic.
pub struct Machine {
    port: DefaultPort,
    countdown: Countdown,
    app: Heartbeat,
    pub uart: SimUart,
    pub timer: TickTimer,
    pub led: StatusLed,
    settings: MachineSettings,
    schedule: BTreeMap<u64, Vec<u8>>,
    pub observers: Vec<Arc<dyn SimulationObserver>>,
    pub total_ticks: u64,
    heartbeats: u64,
    echoed: u64,
    tx_queued: u64,
    heartbeat_offsets: Vec<u64>,
}

impl Machine {
    pub fn new(settings: MachineSettings) -> SimResult<Self> {
        settings.validate()?;

        let app = Heartbeat::new(settings.heartbeat);
        let countdown = Countdown::new(0);
        app.arm(&countdown);

        let mut timer = TickTimer::new();
        timer.enable();

        tracing::debug!(
            period_ms = settings.heartbeat.period_ms,
            ticks_per_ms = settings.heartbeat.tick_rate.ticks_per_ms(),
            byte_ticks = settings.byte_ticks,
            "machine powered on"
        );

        Ok(Self {
            port: DefaultPort::new(),
            countdown,
            app,
            uart: SimUart::new(settings.byte_ticks),
            timer,
            led: StatusLed::new(),
            settings,
            schedule: BTreeMap::new(),
            observers: Vec::new(),
            total_ticks: 0,
            heartbeats: 0,
            echoed: 0,
            tx_queued: 0,
            heartbeat_offsets: Vec::new(),
        })
    }

    pub fn from_board(board: &BoardConfig) -> SimResult<Self> {
        Self::new(MachineSettings::from_board(board))
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        observer.on_simulation_start();
        self.observers.push(observer);
    }

    /// Tell observers the run is over.
    pub fn shutdown(&self) {
        for observer in &self.observers {
            observer.on_simulation_stop();
        }
    }

    pub fn ticks_per_ms(&self) -> u64 {
        self.settings.heartbeat.tick_rate.ticks_per_ms() as u64
    }

    pub fn now_ms(&self) -> u64 {
        self.total_ticks / self.ticks_per_ms()
    }

    /// Put bytes on the RX line now.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.uart.feed(bytes);
    }

    /// Put bytes on the RX line once simulated time reaches `at_ms`.
    pub fn schedule_input(&mut self, at_ms: u64, bytes: &[u8]) -> SimResult<()> {
        let at_tick = at_ms.saturating_mul(self.ticks_per_ms());
        if at_tick < self.total_ticks {
            return Err(SimulationError::InputInPast {
                at_ms,
                now_ms: self.now_ms(),
            });
        }
        self.schedule
            .entry(at_tick)
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    pub fn step(&mut self) -> SimResult<StepReport> {
        let mut report = StepReport::default();
        let ticks_per_ms = self.settings.heartbeat.tick_rate.ticks_per_ms() as u64;
        let (mut fg, mut isr) = self.port.split();

        for _ in 0..self.settings.loop_passes_per_tick {
            let poll = self
                .app
                .poll(&mut fg, &self.countdown, &mut self.uart, &mut self.led);
            report.echoed += poll.echoed;
            self.echoed += poll.echoed as u64;

            // Echoes of a pass are queued ahead of its heartbeat.
            self.tx_queued += poll.echo_accepted() as u64;
            if let Some(marker) = poll.heartbeat {
                let at_ms = self.total_ticks / ticks_per_ms;
                if poll.heartbeat_rejected == 0 {
                    self.heartbeat_offsets.push(self.tx_queued);
                }
                self.tx_queued += (2 - poll.heartbeat_rejected) as u64;
                self.heartbeats += 1;
                report.heartbeat = Some(marker);
                tracing::debug!(marker = %(marker as char), at_ms, "heartbeat");
                for observer in &self.observers {
                    observer.on_heartbeat(marker, at_ms);
                }
            }

            for _ in 0..poll.tx_rejected {
                tracing::warn!("TX ring full, byte dropped");
                for observer in &self.observers {
                    observer.on_overflow(Direction::Tx);
                }
            }

            if let Some(byte) = self.uart.take_overrun() {
                return Err(SimulationError::TransmitOverrun(byte));
            }
        }

        self.total_ticks += 1;
        while let Some(entry) = self.schedule.first_entry() {
            if *entry.key() > self.total_ticks {
                break;
            }
            let bytes = entry.remove();
            tracing::debug!(len = bytes.len(), "input arrives on RX line");
            self.uart.feed(&bytes);
        }

        self.timer.tick();
        if let Some(byte) = self.uart.tick() {
            report.sent = Some(byte);
            for observer in &self.observers {
                observer.on_byte_transmitted(byte);
            }
        }

        if self.timer.ack() {
            self.countdown.on_tick_interrupt();
            for observer in &self.observers {
                observer.on_interrupt(Irq::Tick);
            }
        }

        if self.uart.rx_irq_pending() {
            for observer in &self.observers {
                observer.on_interrupt(Irq::UartRx);
            }
            if let Some(byte) = self.uart.read_data() {
                for observer in &self.observers {
                    observer.on_byte_received(byte);
                }
                if isr.on_byte_received(byte).is_err() {
                    tracing::warn!("RX ring full, {:#04x} dropped", byte);
                    for observer in &self.observers {
                        observer.on_overflow(Direction::Rx);
                    }
                }
            }
        }

        if self.uart.ack_transmit_complete() {
            for observer in &self.observers {
                observer.on_interrupt(Irq::UartTc);
            }
            isr.on_transmit_complete(&mut self.uart);
        }

        if let Some(byte) = self.uart.take_overrun() {
            return Err(SimulationError::TransmitOverrun(byte));
        }

        Ok(report)
    }

    pub fn run_for_ms(&mut self, ms: u64) -> SimResult<()> {
        let ticks = ms.saturating_mul(self.ticks_per_ms());
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// Step until nothing is left in flight or `max_ms` more have elapsed.
    /// Returns whether the machine went idle.
    pub fn run_until_idle(&mut self, max_ms: u64) -> SimResult<bool> {
        let deadline = self
            .total_ticks
            .saturating_add(max_ms.saturating_mul(self.ticks_per_ms()));
        while self.total_ticks < deadline {
            if self.is_idle() {
                return Ok(true);
            }
            self.step()?;
        }
        Ok(self.is_idle())
    }

    /// No input pending or in flight and nothing left to transmit.
    pub fn is_idle(&self) -> bool {
        let stats = self.port.stats();
        self.schedule.is_empty()
            && self.uart.rx_in_flight() == 0
            && !self.uart.rx_irq_pending()
            && stats.rx_pending == 0
            && stats.tx_pending == 0
            && !self.uart.is_transmitting()
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats
    }

    /// Position in the transmitted stream of each heartbeat marker. Only
    /// bytes the TX path accepted are counted, and a heartbeat that lost a
    /// byte to a full ring is left out.
    pub fn heartbeat_offsets(&self) -> &[u64] {
        &self.heartbeat_offsets
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown.remaining()
    }

    pub fn port_snapshot(&self) -> PortSnapshot {
        let stats = self.port.stats();
        PortSnapshot {
            rx_capacity: self.port.rx().capacity(),
            tx_capacity: self.port.tx().capacity(),
            rx_pending: stats.rx_pending,
            tx_pending: stats.tx_pending,
            rx_dropped: stats.rx_dropped,
            tx_dropped: stats.tx_dropped,
            tx_active: stats.tx_active,
        }
    }

    pub fn stats(&self) -> RunStats {
        let stats = self.port.stats();
        RunStats {
            elapsed_ms: self.now_ms(),
            ticks: self.total_ticks,
            heartbeats: self.heartbeats,
            echoed: self.echoed,
            bytes_out: self.uart.transmitted(),
            bytes_in: self.uart.received(),
            rx_dropped: stats.rx_dropped,
            tx_dropped: stats.tx_dropped,
            rx_overruns: self.uart.rx_overruns(),
            led_toggles: self.led.toggles(),
        }
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        let mut peripherals = std::collections::HashMap::new();
        peripherals.insert(
            "usart1".to_string(),
            serde_json::to_value(&self.uart).unwrap_or(serde_json::Value::Null),
        );
        peripherals.insert(
            "timer0".to_string(),
            serde_json::to_value(&self.timer).unwrap_or(serde_json::Value::Null),
        );
        peripherals.insert(
            "led".to_string(),
            serde_json::to_value(&self.led).unwrap_or(serde_json::Value::Null),
        );

        MachineSnapshot {
            now_ms: self.now_ms(),
            total_ticks: self.total_ticks,
            countdown_remaining: self.countdown.remaining(),
            heartbeats: self.heartbeats,
            port: self.port_snapshot(),
            peripherals,
        }
    }
}
