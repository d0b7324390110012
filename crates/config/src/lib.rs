// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_baud() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_period_ms() -> u32 {
    1000
}

fn default_ticks_per_ms() -> u32 {
    1
}

fn default_loop_passes_per_tick() -> u32 {
    4
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported schema_version '{0}'. Supported versions: '1.0'")]
    UnsupportedSchema(String),
    #[error("serial.baud must be greater than zero")]
    ZeroBaud,
    #[error("serial.data_bits must be 7 or 8, got {0}")]
    DataBits(u8),
    #[error("serial.stop_bits must be 1 or 2, got {0}")]
    StopBits(u8),
    #[error("heartbeat.period_ms must be greater than zero")]
    ZeroPeriod,
    #[error("heartbeat.ticks_per_ms must be between 1 and 1000, got {0}")]
    TickRate(u32),
    #[error("simulation.loop_passes_per_tick must be greater than zero")]
    ZeroLoopPasses,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStyle {
    #[default]
    Dash,
    #[serde(alias = "toggle")]
    Alternating,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    #[default]
    #[serde(alias = "one")]
    OnePerPass,
    #[serde(alias = "all")]
    Full,
}

/// Line settings. Only framing and rate matter to the simulator; register
/// values are derived by the board code.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

impl SerialConfig {
    /// Bits on the wire per character, start bit included.
    pub fn frame_bits(&self) -> u32 {
        1 + self.data_bits as u32 + self.stop_bits as u32
    }

    /// Time to shift one character, in microseconds (rounded up).
    pub fn byte_time_us(&self) -> u64 {
        let bits = self.frame_bits() as u64 * 1_000_000;
        bits.div_ceil(self.baud.max(1) as u64)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: default_baud(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    #[serde(default = "default_period_ms")]
    pub period_ms: u32,
    /// Timer interrupts per millisecond (8 for a 125 µs compare match).
    #[serde(default = "default_ticks_per_ms")]
    pub ticks_per_ms: u32,
    #[serde(default)]
    pub marker: MarkerStyle,
    #[serde(default)]
    pub drain: DrainMode,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            ticks_per_ms: default_ticks_per_ms(),
            marker: MarkerStyle::default(),
            drain: DrainMode::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Main-loop passes executed between two timer ticks.
    #[serde(default = "default_loop_passes_per_tick")]
    pub loop_passes_per_tick: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            loop_passes_per_tick: default_loop_passes_per_tick(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "default".to_string(),
            serial: SerialConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl BoardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read board config at {:?}", path))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid board config {:?}", path))?;
        tracing::debug!(name = %config.name, "loaded board config from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Board Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema_version != "1.0" {
            return Err(ConfigError::UnsupportedSchema(self.schema_version.clone()));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::ZeroBaud);
        }
        if !matches!(self.serial.data_bits, 7 | 8) {
            return Err(ConfigError::DataBits(self.serial.data_bits));
        }
        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(ConfigError::StopBits(self.serial.stop_bits));
        }
        if self.heartbeat.period_ms == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if !(1..=1000).contains(&self.heartbeat.ticks_per_ms) {
            return Err(ConfigError::TickRate(self.heartbeat.ticks_per_ms));
        }
        if self.simulation.loop_passes_per_tick == 0 {
            return Err(ConfigError::ZeroLoopPasses);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    pub duration_ms: u64,
    #[serde(default)]
    pub max_uart_bytes: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Runner failed before simulation started (e.g. script parse/validation error).
    ConfigError,
    Duration,
    MaxUartBytes,
}

/// Bytes pushed onto the device's RX line at a point in simulated time.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptInput {
    pub at_ms: u64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub bytes: Option<Vec<u8>>,
}

impl ScriptInput {
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(text) = &self.text {
            out.extend_from_slice(text.as_bytes());
        }
        if let Some(bytes) = &self.bytes {
            out.extend_from_slice(bytes);
        }
        out
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatsAtLeastAssertion {
    pub heartbeats_at_least: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MaxRxDroppedAssertion {
    pub max_rx_dropped: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MaxTxDroppedAssertion {
    pub max_tx_dropped: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LedTogglesAtLeastAssertion {
    pub led_toggles_at_least: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    UartContains(UartContainsAssertion),
    HeartbeatsAtLeast(HeartbeatsAtLeastAssertion),
    MaxRxDropped(MaxRxDroppedAssertion),
    MaxTxDropped(MaxTxDroppedAssertion),
    LedTogglesAtLeast(LedTogglesAtLeastAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    /// Board config path, relative to the script. Defaults apply when absent.
    #[serde(default)]
    pub board: Option<String>,
    pub limits: TestLimits,
    #[serde(default)]
    pub inputs: Vec<ScriptInput>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self = serde_yaml::from_str(yaml).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.limits.duration_ms == 0 {
            anyhow::bail!("Limit 'duration_ms' must be greater than zero");
        }

        if let Some(board) = &self.board {
            if board.trim().is_empty() {
                anyhow::bail!("'board' path cannot be empty");
            }
        }

        for (idx, input) in self.inputs.iter().enumerate() {
            if input.text.is_none() && input.bytes.is_none() {
                anyhow::bail!("Input {} needs 'text' or 'bytes'", idx + 1);
            }
            if input.at_ms >= self.limits.duration_ms {
                anyhow::bail!(
                    "Input {} at {} ms starts after the run ends ({} ms)",
                    idx + 1,
                    input.at_ms,
                    self.limits.duration_ms
                );
            }
        }

        Ok(())
    }
}

/// A validated script together with the board it runs against.
#[derive(Debug, Clone)]
pub struct LoadedTestScript {
    pub script: TestScript,
    pub board: BoardConfig,
    pub board_path: Option<PathBuf>,
}

/// Load a test script and resolve its board config relative to the script.
pub fn load_test_script<P: AsRef<Path>>(path: P) -> Result<LoadedTestScript> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read test script at {:?}", path))?;
    let script = TestScript::from_yaml(&contents)?;

    let board_path = script.board.as_ref().map(|board| {
        let board = PathBuf::from(board);
        if board.is_absolute() {
            board
        } else {
            path.parent()
                .map(|dir| dir.join(&board))
                .unwrap_or(board)
        }
    });

    let board = match &board_path {
        Some(p) => BoardConfig::from_file(p)?,
        None => BoardConfig::default(),
    };

    Ok(LoadedTestScript {
        script,
        board,
        board_path,
    })
}
