// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::InterruptLine;

/// Compare-match timer in clear-on-match mode.
///
/// The simulation clock advances in timer periods, so every tick of an enabled
/// timer is a compare match.
#[derive(Debug, Default, serde::Serialize)]
pub struct TickTimer {
    enabled: bool,
    matches: u64,
    irq: InterruptLine,
}

impl TickTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn matches(&self) -> u64 {
        self.matches
    }

    pub fn tick(&mut self) {
        if !self.enabled {
            return;
        }
        self.matches += 1;
        self.irq.set_pending();
    }

    /// Acknowledge the compare match, returning whether one was pending.
    pub fn ack(&mut self) -> bool {
        self.irq.take()
    }
}

#[cfg(test)]
mod tests {
    use super::TickTimer;

    #[test]
    fn test_disabled_timer_stays_quiet() {
        let mut tim = TickTimer::new();
        tim.tick();
        assert!(!tim.ack());
        assert_eq!(tim.matches(), 0);
    }

    #[test]
    fn test_match_latched_until_ack() {
        let mut tim = TickTimer::new();
        tim.enable();
        tim.tick();
        tim.tick();
        assert_eq!(tim.matches(), 2);
        assert!(tim.ack());
        assert!(!tim.ack());
    }
}
