use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use cpuwatch_condition::{parse_duration, ConditionConfig, Evaluation, StaticWatch, TimesSpec};
use cpuwatch_core::schema::{ERROR_REPORT_V1, POLL_REPORT_V1};
use cpuwatch_core::{get_platform, validate_pid, CpuwatchError};
use cpuwatch_proc::{
    aggregate_usage, CpuMode as ProcCpuMode, ProcessMetrics, SystemMetrics, TreeUsage,
};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Watch the CPU usage of a process and everything it spawns.
#[derive(Parser, Debug)]
#[command(name = "cpuwatch", version, about, long_about = None)]
struct Cli {
    /// The format for log output.
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// The minimum log level to display.
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll a process tree and report when CPU stays above a threshold.
    ///
    /// Each poll sums CPU over the process and all its descendants. The
    /// condition fires when enough of the most recent samples exceed
    /// --above (see --times).
    Watch(WatchArgs),

    /// Show CPU usage of a process and all its descendants once.
    ///
    /// Output is JSON by default for automation, or table format for human
    /// consumption.
    Tree(TreeArgs),
}

impl Command {
    /// Whether errors should be reported as JSON on stdout.
    fn wants_json(&self) -> bool {
        match self {
            Command::Watch(args) => args.json,
            Command::Tree(args) => !args.table,
        }
    }
}

#[derive(Parser, Debug)]
struct WatchArgs {
    /// Process ID to watch.
    #[arg(long, value_name = "PID", conflicts_with = "pid_file")]
    pid: Option<u32>,

    /// Read the process ID from this file on every poll.
    #[arg(long, value_name = "PATH")]
    pid_file: Option<PathBuf>,

    /// CPU percentage threshold (not divided by core count).
    #[arg(long, value_name = "PERCENT")]
    above: Option<f64>,

    /// Samples over the threshold needed to fire: "K" (K of the last K) or
    /// "O/W" (O of the last W).
    #[arg(long, value_name = "K|O/W")]
    times: Option<String>,

    /// Time between polls (e.g., "500ms", "5s", "1m").
    #[arg(long, value_name = "DURATION")]
    interval: Option<String>,

    /// Stop after this many polls.
    #[arg(long, value_name = "N")]
    max_polls: Option<u64>,

    /// CPU measurement mode.
    ///
    /// - lifetime: CPU time divided by process age (ps style)
    /// - interval: CPU rate since the previous poll
    #[arg(long, value_enum, value_name = "MODE")]
    cpu_mode: Option<CpuMode>,

    /// JSON condition config. Command-line flags override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Exit as soon as the condition fires.
    #[arg(long)]
    exit_on_trigger: bool,

    /// Emit one JSON report per poll.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct TreeArgs {
    /// Root process ID.
    #[arg(long, value_name = "PID")]
    pid: u32,

    /// CPU measurement mode.
    #[arg(long, value_enum, value_name = "MODE", default_value = "lifetime")]
    cpu_mode: CpuMode,

    /// Sampling window for --cpu-mode interval (e.g., "250ms").
    #[arg(long, value_name = "DURATION", default_value = "250ms")]
    sample: String,

    /// Output as a table instead of JSON.
    #[arg(long)]
    table: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CpuMode {
    /// CPU time divided by process age.
    Lifetime,
    /// CPU rate between two observations.
    Interval,
}

#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable text format.
    Text,
    /// Machine-readable JSON format.
    Json,
}

/// Exit codes:
/// - 0: Success (watch finished without firing, or tree root found)
/// - 1: Runtime failure, or tree root not running
/// - 2: Invalid configuration or arguments
/// - 3: Condition fired with --exit-on-trigger
mod exit_codes {
    pub const SUCCESS: i32 = cpuwatch_core::exit_codes::EXIT_SUCCESS as i32;
    pub const FAILURE: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const TRIGGERED: i32 = 3;
}

fn main() {
    let cli = Cli::parse();

    // Initialize the tracing subscriber
    let filter = EnvFilter::from_default_env().add_directive(cli.log_level.into());

    match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    info!(platform = get_platform(), "cpuwatch started");
    if let Some(command) = cli.command {
        let json = command.wants_json();
        match run_command(command) {
            Ok(exit_code) => {
                info!(exit_code, "cpuwatch finished");
                std::process::exit(exit_code);
            }
            Err(err) => {
                if json {
                    print_error_report(&err);
                }
                eprintln!("Error: {err}");
                std::process::exit(exit_code_for(&err));
            }
        }
    } else {
        println!("Platform: {}", get_platform());
    }
    info!("cpuwatch finished");
}

fn run_command(command: Command) -> Result<i32, CpuwatchError> {
    match command {
        Command::Watch(args) => run_watch(args),
        Command::Tree(args) => run_tree(args),
    }
}

fn exit_code_for(err: &CpuwatchError) -> i32 {
    match err {
        CpuwatchError::Configuration { .. }
        | CpuwatchError::InvalidArgument { .. }
        | CpuwatchError::InvalidPidFile { .. } => exit_codes::CONFIG_ERROR,
        _ => exit_codes::FAILURE,
    }
}

fn to_proc_cpu_mode(mode: CpuMode) -> ProcCpuMode {
    match mode {
        CpuMode::Lifetime => ProcCpuMode::Lifetime,
        CpuMode::Interval => ProcCpuMode::Interval,
    }
}

/// Parse `--times`: "K" or "O/W".
fn parse_times(s: &str) -> Result<TimesSpec, CpuwatchError> {
    let s = s.trim();
    let invalid = || {
        CpuwatchError::invalid_argument(format!(
            "invalid times '{}': expected K or OCCURRENCES/WINDOW",
            s
        ))
    };

    match s.split_once('/') {
        Some((occurrences, window)) => {
            let occurrences = occurrences.trim().parse().map_err(|_| invalid())?;
            let window = window.trim().parse().map_err(|_| invalid())?;
            Ok(TimesSpec::Window(occurrences, window))
        }
        None => Ok(TimesSpec::Last(s.parse().map_err(|_| invalid())?)),
    }
}

fn current_timestamp() -> String {
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CpuwatchError> {
    serde_json::to_string(value)
        .map_err(|e| CpuwatchError::internal(format!("failed to serialize output: {}", e)))
}

// ============================================================================
// Watch
// ============================================================================

#[derive(Serialize)]
struct PollReport<'a> {
    schema_id: &'static str,
    timestamp: String,
    platform: &'static str,
    poll: u64,
    #[serde(flatten)]
    evaluation: &'a Evaluation,
}

fn run_watch(args: WatchArgs) -> Result<i32, CpuwatchError> {
    let file_config = match &args.config {
        Some(path) => ConditionConfig::from_path(path)?,
        None => ConditionConfig::default(),
    };
    let flag_config = ConditionConfig {
        schema_id: None,
        above: args.above,
        times: args.times.as_deref().map(parse_times).transpose()?,
        pid_file: args.pid_file.clone(),
        interval: args.interval.clone(),
        cpu_mode: args.cpu_mode.map(to_proc_cpu_mode),
    };
    let mut config = file_config.merge(flag_config);

    let mut builder_watch = None;
    if let Some(pid) = args.pid {
        validate_pid(pid)?;
        // An explicit --pid replaces any pid_file from the config file.
        config.pid_file = None;
        builder_watch = Some(Arc::new(StaticWatch::with_pid(pid)));
    }

    let mut builder = config.into_builder()?;
    if let Some(watch) = builder_watch {
        builder = builder.watch(watch);
    }
    let mut condition = builder.build()?;

    let policy = *condition.policy();
    info!(
        above = policy.above,
        occurrences = policy.times.occurrences(),
        window = policy.times.window(),
        interval_ms = condition.interval().as_millis() as u64,
        "watch started"
    );

    let mut polls: u64 = 0;
    loop {
        let evaluation = condition.test();
        polls += 1;
        print_poll(&evaluation, polls, args.json)?;

        if evaluation.triggered && args.exit_on_trigger {
            return Ok(exit_codes::TRIGGERED);
        }
        if args.max_polls.is_some_and(|max| polls >= max) {
            break;
        }
        thread::sleep(condition.interval());
    }

    Ok(exit_codes::SUCCESS)
}

fn print_poll(evaluation: &Evaluation, poll: u64, json: bool) -> Result<(), CpuwatchError> {
    if json {
        let report = PollReport {
            schema_id: POLL_REPORT_V1,
            timestamp: current_timestamp(),
            platform: get_platform(),
            poll,
            evaluation,
        };
        println!("{}", to_json(&report)?);
    } else {
        let status = if evaluation.triggered { "TRIGGERED" } else { "ok" };
        println!("{:>4} {:<9} {}", poll, status, evaluation.message);
    }
    Ok(())
}

// ============================================================================
// Tree
// ============================================================================

fn run_tree(args: TreeArgs) -> Result<i32, CpuwatchError> {
    validate_pid(args.pid)?;
    let mode = to_proc_cpu_mode(args.cpu_mode);

    let mut metrics = SystemMetrics::new(mode);
    metrics.refresh()?;

    if mode == ProcCpuMode::Interval {
        let sample = parse_duration(&args.sample)?;
        // Prime per-process baselines, then measure across the window.
        aggregate_usage(&metrics, args.pid);
        debug!(sample_ms = sample.as_millis() as u64, "sampling cpu");
        thread::sleep(sample.max(Duration::from_millis(1)));
        metrics.refresh()?;
    }

    let usage = aggregate_usage(&metrics, args.pid);

    if args.table {
        print_tree_table(&usage);
    } else {
        let json = serde_json::to_string_pretty(&usage)
            .map_err(|e| CpuwatchError::internal(format!("failed to serialize output: {}", e)))?;
        println!("{}", json);
    }

    if usage.root_present {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::FAILURE)
    }
}

fn print_tree_table(usage: &TreeUsage) {
    println!("{:<16} {:>7} {:>8}", "PID", "PPID", "CPU%");
    println!("{:-<33}", "");

    if usage.processes.is_empty() {
        println!("(process {} not running)", usage.root_pid);
    }

    for p in &usage.processes {
        let pid = format!("{}{}", "  ".repeat(p.depth as usize), p.pid);
        let ppid = p
            .parent
            .map(|ppid| ppid.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<16} {:>7} {:>8.1}", pid, ppid, p.cpu_percent);
    }

    println!("{:-<33}", "");
    println!("{:<16} {:>7} {:>8.1}", "TOTAL", "", usage.total_cpu_percent);
    for warning in &usage.warnings {
        println!("warning: {}", warning);
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize)]
struct ErrorReport {
    schema_id: &'static str,
    timestamp: String,
    platform: &'static str,
    error_code: i32,
    error: String,
}

fn print_error_report(err: &CpuwatchError) {
    let report = ErrorReport {
        schema_id: ERROR_REPORT_V1,
        timestamp: current_timestamp(),
        platform: get_platform(),
        error_code: err.error_code(),
        error: err.to_string(),
    };
    if let Ok(json) = to_json(&report) {
        println!("{}", json);
    }
}
