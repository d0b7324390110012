// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use uartbeat_config::{load_test_script, BoardConfig, StopReason, TestAssertion, TestLimits};
use uartbeat_core::metrics::LineMetrics;
use uartbeat_core::{Irq, Machine, RunStats, SimulationError};

mod echo;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Serial echo + heartbeat firmware simulator",
    long_about = None
)]
struct Cli {
    /// Log every line event (interrupts, heartbeats, dropped bytes)
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the firmware for a while and print what it transmits.
    Run(RunArgs),

    /// Push a file through the serial line and verify the echo.
    Echo(EchoArgs),

    /// Deterministic, CI-friendly runner mode driven by a test script (YAML).
    Test(TestArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Board config (YAML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated time to run for
    #[arg(long, default_value = "3000")]
    duration_ms: u64,

    /// Text typed into the device's RX line
    #[arg(short, long)]
    input: Option<String>,

    /// When the input starts arriving
    #[arg(long, default_value = "0")]
    input_at_ms: u64,

    /// Write a state snapshot (JSON) at the end of the run
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct EchoArgs {
    /// File streamed into the RX line
    #[arg(short, long)]
    file: PathBuf,

    /// Board config (YAML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Give up if the line is still busy after this long (default: derived
    /// from the file size and line speed)
    #[arg(long)]
    max_ms: Option<u64>,
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Directory to write test artifacts (result.json, uart.log, snapshot.json)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Disable UART stdout echo (still captured for assertions/artifacts)
    #[arg(long)]
    no_uart_stdout: bool,

    /// Override the simulated duration
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Override max UART bytes limit
    #[arg(long)]
    max_uart_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    elapsed_ms: u64,
    wall_time_ms: u64,
    stop_reason: StopReason,
    stop_reason_details: StopReasonDetails,
    limits: TestLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    assertions: Vec<AssertionResult>,
    stats: RunStats,
    heartbeat_times_ms: Vec<u64>,
    config: TestConfig,
}

#[derive(Debug, Serialize, Clone)]
struct StopReasonDetails {
    triggered_stop_condition: StopReason,
    triggered_limit: Option<NamedU64>,
    observed: Option<NamedU64>,
}

#[derive(Debug, Serialize, Clone)]
struct NamedU64 {
    name: String,
    value: u64,
}

#[derive(Debug, Serialize, Clone)]
struct AssertionResult {
    assertion: TestAssertion,
    passed: bool,
}

#[derive(Debug, Serialize)]
struct TestConfig {
    script: PathBuf,
    board: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries the device's serial output
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run_simulation(args),
        Commands::Echo(args) => run_echo(args),
        Commands::Test(args) => run_test(args),
    }
}

fn load_board(path: Option<&Path>) -> anyhow::Result<BoardConfig> {
    match path {
        Some(path) => BoardConfig::from_file(path),
        None => Ok(BoardConfig::default()),
    }
}

fn exit_code_for(e: &SimulationError) -> u8 {
    match e {
        SimulationError::InvalidSettings(_) | SimulationError::InputInPast { .. } => {
            EXIT_CONFIG_ERROR
        }
        SimulationError::TransmitOverrun(_) => EXIT_RUNTIME_ERROR,
    }
}

fn build_machine(board: &BoardConfig) -> Result<(Machine, Arc<LineMetrics>), SimulationError> {
    let mut machine = Machine::from_board(board)?;
    let metrics = Arc::new(LineMetrics::new());
    machine.add_observer(metrics.clone());
    Ok((machine, metrics))
}

fn run_simulation(args: RunArgs) -> ExitCode {
    let board = match load_board(args.config.as_deref()) {
        Ok(board) => board,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let (mut machine, metrics) = match build_machine(&board) {
        Ok(built) => built,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(exit_code_for(&e));
        }
    };
    machine.uart.set_sink(None, true);

    if let Some(text) = &args.input {
        if let Err(e) = machine.schedule_input(args.input_at_ms, text.as_bytes()) {
            error!("{}", e);
            return ExitCode::from(exit_code_for(&e));
        }
    }

    info!(board = %board.name, "Running for {} ms", args.duration_ms);
    let start = Instant::now();
    let outcome = machine.run_for_ms(args.duration_ms);
    machine.shutdown();

    report_metrics(&machine, &metrics, start.elapsed());
    if let Some(path) = &args.snapshot {
        write_json(path, &machine.snapshot());
    }

    match outcome {
        Ok(()) => ExitCode::from(EXIT_PASS),
        Err(e) => {
            error!("Simulation error at {} ms: {}", machine.now_ms(), e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn report_metrics(machine: &Machine, metrics: &LineMetrics, wall: Duration) {
    let stats = machine.stats();
    info!("Simulated time: {} ms ({} ticks)", stats.elapsed_ms, stats.ticks);
    info!("Heartbeats: {}", stats.heartbeats);
    info!(
        "Bytes received: {}, transmitted: {}, echoed: {}",
        stats.bytes_in, stats.bytes_out, stats.echoed
    );
    info!(
        "Interrupts: tick={} rx={} tc={}",
        metrics.get_interrupts(Irq::Tick),
        metrics.get_interrupts(Irq::UartRx),
        metrics.get_interrupts(Irq::UartTc)
    );
    if stats.rx_dropped > 0 || stats.tx_dropped > 0 {
        warn!(
            "Dropped bytes: rx={} tx={}",
            stats.rx_dropped, stats.tx_dropped
        );
    }
    info!(
        "Wall time: {:.3}s ({:.0} ticks/s)",
        wall.as_secs_f64(),
        metrics.get_ticks_per_sec()
    );
}

/// Simulated time the echo of `len` bytes may take, with slack for the
/// heartbeats interleaved on the line.
fn echo_budget_ms(machine: &Machine, len: usize) -> u64 {
    let settings = machine.settings();
    let byte_ms = (settings.byte_ticks as u64).div_ceil(machine.ticks_per_ms());
    (len as u64 + 1) * byte_ms * 2 + settings.heartbeat.period_ms as u64 + 100
}

fn run_echo(args: EchoArgs) -> ExitCode {
    let payload = match std::fs::read(&args.file)
        .with_context(|| format!("Failed to read input file {:?}", args.file))
    {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let board = match load_board(args.config.as_deref()) {
        Ok(board) => board,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let (mut machine, metrics) = match build_machine(&board) {
        Ok(built) => built,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(exit_code_for(&e));
        }
    };
    let uart_tx = Arc::new(Mutex::new(Vec::new()));
    machine.uart.set_sink(Some(uart_tx.clone()), false);
    machine.feed(&payload);

    let budget = args
        .max_ms
        .unwrap_or_else(|| echo_budget_ms(&machine, payload.len()));
    info!(
        "Echoing {} bytes from {:?} (budget {} ms)",
        payload.len(),
        args.file,
        budget
    );

    let start = Instant::now();
    let idle = match machine.run_until_idle(budget) {
        Ok(idle) => idle,
        Err(e) => {
            error!("Simulation error at {} ms: {}", machine.now_ms(), e);
            return ExitCode::from(exit_code_for(&e));
        }
    };
    machine.shutdown();
    report_metrics(&machine, &metrics, start.elapsed());
    if !idle {
        warn!("Line still busy after {} ms", budget);
    }

    let output = uart_tx.lock().map(|g| g.clone()).unwrap_or_default();
    let split = echo::split_heartbeats(&output, machine.heartbeat_offsets());

    let stats = machine.stats();
    if stats.rx_dropped > 0 || stats.tx_dropped > 0 {
        error!(
            "Echo lost bytes: rx_dropped={} tx_dropped={}",
            stats.rx_dropped, stats.tx_dropped
        );
        return ExitCode::from(EXIT_ASSERT_FAIL);
    }

    match echo::first_mismatch(&payload, &split.echoed) {
        None => {
            info!(
                "Echo verified: {} bytes, {} heartbeats",
                split.echoed.len(),
                split.markers.len()
            );
            ExitCode::from(EXIT_PASS)
        }
        Some(at) => {
            error!(
                "Echo mismatch at byte {}: expected {:?}, got {:?} ({} of {} bytes echoed)",
                at,
                payload.get(at),
                split.echoed.get(at),
                split.echoed.len(),
                payload.len()
            );
            ExitCode::from(EXIT_ASSERT_FAIL)
        }
    }
}

fn run_test(args: TestArgs) -> ExitCode {
    let loaded = match load_test_script(&args.script) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, None, None, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let limits = TestLimits {
        duration_ms: args.duration_ms.unwrap_or(loaded.script.limits.duration_ms),
        max_uart_bytes: args.max_uart_bytes.or(loaded.script.limits.max_uart_bytes),
    };

    // Guard against accidentally huge runs from CI misconfiguration.
    const MAX_ALLOWED_DURATION_MS: u64 = 3_600_000;
    if limits.duration_ms == 0 || limits.duration_ms > MAX_ALLOWED_DURATION_MS {
        let msg = format!(
            "duration_ms {} must be between 1 and {}",
            limits.duration_ms, MAX_ALLOWED_DURATION_MS
        );
        error!("{}", msg);
        write_config_error_outputs(&args, loaded.board_path.as_ref(), Some(&limits), msg);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let (mut machine, metrics) = match build_machine(&loaded.board) {
        Ok(built) => built,
        Err(e) => {
            let msg = e.to_string();
            error!("{}", msg);
            write_config_error_outputs(&args, loaded.board_path.as_ref(), Some(&limits), msg);
            return ExitCode::from(exit_code_for(&e));
        }
    };

    let uart_tx = Arc::new(Mutex::new(Vec::new()));
    machine
        .uart
        .set_sink(Some(uart_tx.clone()), !args.no_uart_stdout);

    for input in &loaded.script.inputs {
        if let Err(e) = machine.schedule_input(input.at_ms, &input.payload()) {
            let msg = e.to_string();
            error!("{}", msg);
            write_config_error_outputs(&args, loaded.board_path.as_ref(), Some(&limits), msg);
            return ExitCode::from(exit_code_for(&e));
        }
    }

    info!(
        board = %loaded.board.name,
        "Running test script {:?} for {} ms",
        args.script,
        limits.duration_ms
    );

    execute_test_loop(
        &args,
        &mut machine,
        &limits,
        &loaded.script.assertions,
        &uart_tx,
        &metrics,
        loaded.board_path.as_ref(),
    )
}

#[allow(clippy::too_many_arguments)]
fn execute_test_loop(
    args: &TestArgs,
    machine: &mut Machine,
    limits: &TestLimits,
    assertions: &[TestAssertion],
    uart_tx: &Arc<Mutex<Vec<u8>>>,
    metrics: &Arc<LineMetrics>,
    board_path: Option<&PathBuf>,
) -> ExitCode {
    let start = Instant::now();
    let mut stop_reason = StopReason::Duration;
    let mut sim_error: Option<SimulationError> = None;

    for _ in 0..limits.duration_ms {
        if let Some(limit) = limits.max_uart_bytes {
            if machine.uart.transmitted() >= limit {
                stop_reason = StopReason::MaxUartBytes;
                break;
            }
        }

        if let Err(e) = machine.run_for_ms(1) {
            error!("Simulation error at {} ms: {}", machine.now_ms(), e);
            sim_error = Some(e);
            break;
        }
    }
    machine.shutdown();

    let uart_bytes = uart_tx.lock().map(|g| g.clone()).unwrap_or_default();
    let uart_text = String::from_utf8_lossy(&uart_bytes).to_string();
    let stats = machine.stats();

    let mut assertion_results = Vec::new();
    let mut all_passed = true;
    for assertion in assertions {
        let passed = match assertion {
            TestAssertion::UartContains(a) => uart_text.contains(&a.uart_contains),
            TestAssertion::HeartbeatsAtLeast(a) => stats.heartbeats >= a.heartbeats_at_least,
            TestAssertion::MaxRxDropped(a) => stats.rx_dropped <= a.max_rx_dropped,
            TestAssertion::MaxTxDropped(a) => stats.tx_dropped <= a.max_tx_dropped,
            TestAssertion::LedTogglesAtLeast(a) => stats.led_toggles >= a.led_toggles_at_least,
        };

        if !passed {
            all_passed = false;
            error!(
                "Assertion failed: {:?} (captured len={}, heartbeats={})",
                assertion,
                uart_bytes.len(),
                stats.heartbeats
            );
        }

        assertion_results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
        });
    }

    let (status, code) = if !all_passed {
        ("fail", EXIT_ASSERT_FAIL)
    } else if let Some(e) = &sim_error {
        ("error", exit_code_for(e))
    } else {
        ("pass", EXIT_PASS)
    };

    let stop_reason_details = build_stop_reason_details(&stop_reason, limits, &stats);
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        elapsed_ms: stats.elapsed_ms,
        wall_time_ms: start.elapsed().as_millis() as u64,
        stop_reason,
        stop_reason_details,
        limits: limits.clone(),
        message: sim_error.as_ref().map(|e| e.to_string()),
        assertions: assertion_results,
        stats,
        heartbeat_times_ms: metrics.heartbeat_times_ms(),
        config: TestConfig {
            script: args.script.clone(),
            board: board_path.cloned(),
        },
    };

    info!(
        "Test {}: {} ms simulated, {} heartbeats, {} UART bytes",
        result.status,
        result.elapsed_ms,
        result.stats.heartbeats,
        uart_bytes.len()
    );
    write_outputs(args, &result, &uart_bytes, Some(&*machine));

    ExitCode::from(code)
}

fn build_stop_reason_details(
    stop_reason: &StopReason,
    limits: &TestLimits,
    stats: &RunStats,
) -> StopReasonDetails {
    let (triggered_limit, observed) = match stop_reason {
        StopReason::Duration => (
            Some(NamedU64 {
                name: "duration_ms".to_string(),
                value: limits.duration_ms,
            }),
            Some(NamedU64 {
                name: "elapsed_ms".to_string(),
                value: stats.elapsed_ms,
            }),
        ),
        StopReason::MaxUartBytes => (
            limits.max_uart_bytes.map(|value| NamedU64 {
                name: "max_uart_bytes".to_string(),
                value,
            }),
            Some(NamedU64 {
                name: "uart_bytes".to_string(),
                value: stats.bytes_out,
            }),
        ),
        StopReason::ConfigError => (None, None),
    };

    StopReasonDetails {
        triggered_stop_condition: stop_reason.clone(),
        triggered_limit,
        observed,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create directory {:?}: {}", parent, e);
            return;
        }
    }
    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, value) {
                error!("Failed to write {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create {:?}: {}", path, e),
    }
}

fn write_outputs(args: &TestArgs, result: &TestResult, uart_bytes: &[u8], machine: Option<&Machine>) {
    let Some(output_dir) = &args.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    write_json(&output_dir.join("result.json"), result);

    if let Some(machine) = machine {
        write_json(&output_dir.join("snapshot.json"), &machine.snapshot());
    }

    let uart_path = output_dir.join("uart.log");
    if let Err(e) = std::fs::write(&uart_path, uart_bytes) {
        error!("Failed to write uart.log: {}", e);
    }
}

fn write_config_error_outputs(
    args: &TestArgs,
    board_path: Option<&PathBuf>,
    limits: Option<&TestLimits>,
    message: String,
) {
    let limits = limits.cloned().unwrap_or(TestLimits {
        duration_ms: args.duration_ms.unwrap_or(0),
        max_uart_bytes: args.max_uart_bytes,
    });

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        elapsed_ms: 0,
        wall_time_ms: 0,
        stop_reason: StopReason::ConfigError,
        stop_reason_details: StopReasonDetails {
            triggered_stop_condition: StopReason::ConfigError,
            triggered_limit: None,
            observed: None,
        },
        limits,
        message: Some(message),
        assertions: Vec::new(),
        stats: RunStats::default(),
        heartbeat_times_ms: Vec::new(),
        config: TestConfig {
            script: args.script.clone(),
            board: board_path.cloned(),
        },
    };

    write_outputs(args, &result, &[], None);
}
