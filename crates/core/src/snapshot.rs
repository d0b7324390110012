// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MachineSnapshot {
    pub now_ms: u64,
    pub total_ticks: u64,
    pub countdown_remaining: u32,
    pub heartbeats: u64,
    pub port: PortSnapshot,
    pub peripherals: HashMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortSnapshot {
    pub rx_capacity: usize,
    pub tx_capacity: usize,
    pub rx_pending: usize,
    pub tx_pending: usize,
    pub rx_dropped: u32,
    pub tx_dropped: u32,
    pub tx_active: bool,
}
