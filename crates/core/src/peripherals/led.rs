// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::DigitalLevel;
use uartbeat_serial::StatusOutput;

/// Status LED on a push-pull output pin.
#[derive(Debug, Default, serde::Serialize)]
pub struct StatusLed {
    level: DigitalLevel,
    toggles: u64,
}

impl StatusLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> DigitalLevel {
        self.level
    }

    pub fn toggles(&self) -> u64 {
        self.toggles
    }
}

impl StatusOutput for StatusLed {
    fn toggle(&mut self) {
        self.level = self.level.toggled();
        self.toggles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::StatusLed;
    use crate::signals::DigitalLevel;
    use uartbeat_serial::StatusOutput;

    #[test]
    fn test_toggle_flips_level() {
        let mut led = StatusLed::new();
        led.toggle();
        assert_eq!(led.level(), DigitalLevel::High);
        led.toggle();
        assert_eq!(led.level(), DigitalLevel::Low);
        assert_eq!(led.toggles(), 2);
    }
}
