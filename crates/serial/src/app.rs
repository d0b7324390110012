// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::port::{Foreground, SerialWrite};
use crate::tick::{Countdown, TickRate};

pub const DASH: u8 = b'-';
pub const LINE_TERMINATOR: u8 = 0x0A;

/// Status indicator flipped on every heartbeat (an LED on real boards).
pub trait StatusOutput {
    fn toggle(&mut self);
}

impl StatusOutput for () {
    fn toggle(&mut self) {}
}

impl<S: StatusOutput + ?Sized> StatusOutput for &mut S {
    fn toggle(&mut self) {
        (**self).toggle()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeartbeatMarker {
    /// `-` on every beat.
    #[default]
    Dash,
    /// `1`, `0`, `1`, ... starting with `1`.
    Alternating,
}

/// How many received bytes one pass echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// At most one byte, then the timeout check runs.
    #[default]
    OnePerPass,
    /// Everything pending before the timeout check runs.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub period_ms: u32,
    pub tick_rate: TickRate,
    pub marker: HeartbeatMarker,
    pub drain: DrainPolicy,
}

impl HeartbeatSettings {
    pub const DEFAULT: Self = Self {
        period_ms: 1000,
        tick_rate: TickRate::ONE_PER_MS,
        marker: HeartbeatMarker::Dash,
        drain: DrainPolicy::OnePerPass,
    };

    pub const fn period_ticks(&self) -> u32 {
        self.tick_rate.ticks_for_ms(self.period_ms)
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What one [`Heartbeat::poll`] pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollReport {
    /// Bytes taken from RX and handed back to `send`.
    pub echoed: usize,
    /// Marker byte if this pass emitted a heartbeat.
    pub heartbeat: Option<u8>,
    /// `send` calls rejected by a full TX ring during this pass.
    pub tx_rejected: usize,
    /// The part of `tx_rejected` that belonged to the heartbeat.
    pub heartbeat_rejected: usize,
}

impl PollReport {
    /// Echo bytes that made it into the TX path.
    pub fn echo_accepted(&self) -> usize {
        self.echoed - (self.tx_rejected - self.heartbeat_rejected)
    }
}

/// Cooperative echo + heartbeat loop body.
///
/// Each [`poll`](Heartbeat::poll) runs DRAIN_RX then CHECK_TIMEOUT and returns
/// without blocking. Firmware calls it forever.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    settings: HeartbeatSettings,
    last_marker: u8,
    beats: u32,
}

impl Heartbeat {
    pub const fn new(settings: HeartbeatSettings) -> Self {
        Self {
            settings,
            last_marker: b'0',
            beats: 0,
        }
    }

    pub fn settings(&self) -> &HeartbeatSettings {
        &self.settings
    }

    pub fn beats(&self) -> u32 {
        self.beats
    }

    /// Load the first period into `countdown`.
    pub fn arm(&self, countdown: &Countdown) {
        countdown.reset(self.settings.period_ticks());
    }

    pub fn poll<W, S, const RX: usize, const TX: usize>(
        &mut self,
        port: &mut Foreground<'_, RX, TX>,
        countdown: &Countdown,
        uart: &mut W,
        status: &mut S,
    ) -> PollReport
    where
        W: SerialWrite,
        S: StatusOutput,
    {
        let mut report = PollReport::default();

        // DRAIN_RX
        while let Some(byte) = port.try_take_received() {
            report.echoed += 1;
            if port.send(uart, byte).is_err() {
                report.tx_rejected += 1;
            }
            if self.settings.drain == DrainPolicy::OnePerPass {
                break;
            }
        }

        // CHECK_TIMEOUT
        if countdown.consume_elapsed() {
            countdown.reset(self.settings.period_ticks());
            status.toggle();

            let marker = self.next_marker();
            for byte in [marker, LINE_TERMINATOR] {
                if port.send(uart, byte).is_err() {
                    report.tx_rejected += 1;
                    report.heartbeat_rejected += 1;
                }
            }
            self.beats = self.beats.wrapping_add(1);
            report.heartbeat = Some(marker);
        }

        report
    }

    fn next_marker(&mut self) -> u8 {
        match self.settings.marker {
            HeartbeatMarker::Dash => DASH,
            HeartbeatMarker::Alternating => {
                self.last_marker = if self.last_marker == b'0' { b'1' } else { b'0' };
                self.last_marker
            }
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(HeartbeatSettings::DEFAULT)
    }
}
