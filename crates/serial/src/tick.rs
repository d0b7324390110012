// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use core::sync::atomic::{AtomicU32, Ordering};

/// How many tick interrupts make up one millisecond.
///
/// The timer compare-match usually fires faster than 1 kHz; the countdown is
/// kept in raw ticks and periods are converted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRate {
    ticks_per_ms: u32,
}

impl TickRate {
    pub const ONE_PER_MS: Self = Self { ticks_per_ms: 1 };

    /// A rate of zero is treated as one tick per millisecond.
    pub const fn new(ticks_per_ms: u32) -> Self {
        Self {
            ticks_per_ms: if ticks_per_ms == 0 { 1 } else { ticks_per_ms },
        }
    }

    pub const fn ticks_per_ms(&self) -> u32 {
        self.ticks_per_ms
    }

    pub const fn ticks_for_ms(&self, ms: u32) -> u32 {
        ms.saturating_mul(self.ticks_per_ms)
    }
}

impl Default for TickRate {
    fn default() -> Self {
        Self::ONE_PER_MS
    }
}

/// Countdown decremented from the timer interrupt and reloaded by the main loop.
///
/// The interrupt only stores while the value is non-zero and the main loop only
/// stores once it has observed zero, so plain load/store never loses an update
/// on a single core.
#[derive(Debug)]
pub struct Countdown {
    remaining: AtomicU32,
}

impl Countdown {
    pub const fn new(ticks: u32) -> Self {
        Self {
            remaining: AtomicU32::new(ticks),
        }
    }

    /// Timer compare-match handler. Saturates at zero.
    pub fn on_tick_interrupt(&self) {
        let remaining = self.remaining.load(Ordering::Acquire);
        if remaining > 0 {
            self.remaining.store(remaining - 1, Ordering::Release);
        }
    }

    /// True once the countdown has reached zero. Does not reload; the caller
    /// picks the next period with [`Countdown::reset`].
    pub fn consume_elapsed(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    pub fn reset(&self, ticks: u32) {
        self.remaining.store(ticks, Ordering::Release);
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapses_once_per_period() {
        let countdown = Countdown::new(0);
        let rate = TickRate::ONE_PER_MS;
        countdown.reset(rate.ticks_for_ms(1000));

        for _ in 0..999 {
            countdown.on_tick_interrupt();
            assert!(!countdown.consume_elapsed());
        }
        countdown.on_tick_interrupt();
        assert!(countdown.consume_elapsed());

        countdown.reset(rate.ticks_for_ms(1000));
        assert!(!countdown.consume_elapsed());
        for _ in 0..999 {
            countdown.on_tick_interrupt();
        }
        assert!(!countdown.consume_elapsed());
        countdown.on_tick_interrupt();
        assert!(countdown.consume_elapsed());
    }

    #[test]
    fn test_never_underflows() {
        let countdown = Countdown::new(3);
        for _ in 0..10_000 {
            countdown.on_tick_interrupt();
        }
        assert_eq!(countdown.remaining(), 0);
        assert!(countdown.consume_elapsed());
    }

    #[test]
    fn test_sub_millisecond_rate() {
        let rate = TickRate::new(8);
        assert_eq!(rate.ticks_for_ms(1000), 8000);
        assert_eq!(TickRate::new(0), TickRate::ONE_PER_MS);
        assert_eq!(TickRate::new(u32::MAX).ticks_for_ms(2), u32::MAX);
    }
}
