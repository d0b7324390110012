// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl DigitalLevel {
    pub fn toggled(self) -> Self {
        match self {
            DigitalLevel::Low => DigitalLevel::High,
            DigitalLevel::High => DigitalLevel::Low,
        }
    }
}

/// Represents a specialized signal line for interrupts.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct InterruptLine {
    pending: bool,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending(&mut self) {
        self.pending = true;
    }

    pub fn clear(&mut self) {
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Clear the line, returning whether it was pending.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}
