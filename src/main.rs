// Harness binary - runs the configured timers against the shared queue and writes CSV statistics
//
// The binary parses flags on top of the default (or file-provided) configuration, initializes
// logging, runs every timer to completion, and prints a short summary of the run.

use std::path::PathBuf;
use std::time::Duration;
use timer_queue_bench::stats::Summary;
use timer_queue_bench::{Harness, HarnessConfig, HarnessError, TimerConfig};
use timer_queue_bench::{Result, StartDelay};
use tracing_subscriber::EnvFilter;

/// Command-line overrides applied on top of the base configuration.
#[derive(Debug, Default)]
struct CliOptions {
    /// JSON configuration file replacing the built-in defaults.
    config: Option<PathBuf>,
    workers: Option<usize>,
    capacity: Option<usize>,
    output_dir: Option<PathBuf>,
    /// Divide every timer's iteration count by this factor.
    scale: Option<usize>,
    /// Replacement timer list; empty keeps the configured timers.
    timers: Vec<TimerConfig>,
    shutdown_timeout: Option<Duration>,
}

fn invalid(flag: &str, value: &str) -> HarnessError {
    HarnessError::InvalidConfig(format!("invalid value `{value}` for {flag}"))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| invalid(flag, value))
}

/// Parse `<period_ms>:<iterations>[:<delay_ms>]`.
fn parse_timer(value: &str) -> Result<TimerConfig> {
    let mut parts = value.split(':');
    let period_ms: u64 = parse_number("--timer", parts.next().unwrap_or_default())?;
    let iterations: usize = parse_number("--timer", parts.next().unwrap_or_default())?;
    let mut timer = TimerConfig::new(Duration::from_millis(period_ms), iterations);
    if let Some(delay) = parts.next() {
        let delay_ms: u64 = parse_number("--timer", delay)?;
        timer = timer.with_start_delay(StartDelay::After(Duration::from_millis(delay_ms)));
    }
    if parts.next().is_some() {
        return Err(invalid("--timer", value));
    }
    Ok(timer)
}

fn apply_option(options: &mut CliOptions, key: &str, value: &str) -> Result<()> {
    match key {
        "--config" => options.config = Some(PathBuf::from(value)),
        "--workers" => options.workers = Some(parse_number(key, value)?),
        "--capacity" => options.capacity = Some(parse_number(key, value)?),
        "--output-dir" => options.output_dir = Some(PathBuf::from(value)),
        "--scale" => options.scale = Some(parse_number(key, value)?),
        "--timer" => options.timers.push(parse_timer(value)?),
        "--shutdown-timeout-ms" => {
            options.shutdown_timeout = Some(Duration::from_millis(parse_number(key, value)?))
        }
        _ => {
            return Err(HarnessError::InvalidConfig(format!("unknown flag `{key}`")));
        }
    }
    Ok(())
}

/// Parse flags given as `--key=value` or `--key value`.
///
/// # Supported flags
/// - `--config <file.json>`
/// - `--workers <n>`, `--capacity <n>`
/// - `--output-dir <dir>`
/// - `--scale <n>`: divide every iteration count by `n`
/// - `--timer <period_ms>:<iterations>[:<delay_ms>]` (repeatable, replaces configured timers)
/// - `--shutdown-timeout-ms <ms>`
fn parse_cli_options(args: impl IntoIterator<Item = String>) -> Result<CliOptions> {
    let mut options = CliOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if let Some((key, value)) = arg.split_once('=') {
            apply_option(&mut options, key, value)?;
        } else {
            let value = args
                .next()
                .ok_or_else(|| HarnessError::InvalidConfig(format!("{arg} needs a value")))?;
            apply_option(&mut options, &arg, &value)?;
        }
    }
    Ok(options)
}

/// Build the final configuration: file (or defaults) first, then flag overrides.
fn resolve_config(options: CliOptions) -> Result<HarnessConfig> {
    let mut config = match &options.config {
        Some(path) => HarnessConfig::from_json_file(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(workers) = options.workers {
        config.workers = workers;
    }
    if let Some(capacity) = options.capacity {
        config.queue_capacity = capacity;
    }
    if let Some(dir) = options.output_dir {
        config.output_dir = dir;
    }
    if !options.timers.is_empty() {
        config.timers = options.timers;
    }
    if options.shutdown_timeout.is_some() {
        config.shutdown_timeout = options.shutdown_timeout;
    }
    if let Some(scale) = options.scale {
        config = config.scaled(scale);
    }
    config.validate()?;
    Ok(config)
}

fn print_summary(label: &str, summary: Option<Summary>) {
    match summary {
        Some(s) => println!(
            "{label:<28} n={:<8} min={:<8} p50={:<8} p99={:<8} max={:<8} mean={:.1}",
            s.count, s.min, s.p50, s.p99, s.max, s.mean
        ),
        None => println!("{label:<28} n=0"),
    }
}

/// Main entry point.
///
/// # Example Usage
/// ```bash
/// # Reference workload (one hour)
/// cargo run --release
///
/// # Ten-second smoke run with a larger queue
/// cargo run --release -- --scale=360 --capacity=8 --output-dir=out
/// ```
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let options = parse_cli_options(std::env::args().skip(1))?;
    let config = resolve_config(options)?;
    let report = Harness::new(config)?.run()?;

    println!();
    println!(
        "accepted={} dropped={} consumed={}",
        report.accepted(),
        report.dropped,
        report.consumed
    );
    print_summary("queue wait (us)", report.queue_wait_summary());
    for timer in &report.timers {
        let label = format!("timer {}ms producer (us)", timer.stats.period.as_millis());
        print_summary(&label, Summary::from_samples(&timer.stats.producer_us));
    }
    println!("\nAccumulator is {}\nProcess complete...", report.accumulator);
    Ok(())
}
