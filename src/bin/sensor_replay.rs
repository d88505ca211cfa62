use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flate2::read::GzDecoder;
use serde::Deserialize;
use sensor_logger::{
    read_log, DeviceInfo, LoggerConfig, ManualClock, SensorLogger, TimedEvent,
};

#[derive(Parser, Debug)]
#[command(name = "sensor_replay")]
#[command(about = "Replay recorded sensor traces into CSV logs and inspect the result", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed a JSON event trace through the logger and write <out>.csv
    Record {
        /// Path to trace .json[.gz]
        #[arg(long)]
        trace: PathBuf,

        /// Output path without the .csv extension
        #[arg(long)]
        out: PathBuf,

        /// Logger config JSON (defaults to all sensors enabled)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the header and per-tag record counts of a CSV log
    Summarize {
        #[arg(long)]
        log: PathBuf,
    },
}

#[derive(Deserialize)]
struct Trace {
    #[serde(default)]
    device: DeviceInfo,
    events: Vec<TimedEvent>,
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn load_trace(path: &Path) -> Result<Trace> {
    let reader = open_maybe_gz(path)?;
    serde_json::from_reader(reader).with_context(|| format!("parsing trace {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<LoggerConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Ok(LoggerConfig::from_json(&json)?)
        }
        None => Ok(LoggerConfig::all_sensors()),
    }
}

fn record(trace_path: &Path, out: &Path, config_path: Option<&Path>) -> Result<()> {
    let trace = load_trace(trace_path)?;
    let config = load_config(config_path)?;

    let clock = ManualClock::new();
    let mut logger = SensorLogger::with_clock(config, clock.clone());
    logger.start(out, &trace.device)?;

    let mut last_elapsed = i64::MIN;
    for event in &trace.events {
        if event.elapsed_ms < last_elapsed {
            log::warn!(
                "Out-of-order event at {} ms (previous {} ms), stamping at {} ms",
                event.elapsed_ms,
                last_elapsed,
                last_elapsed
            );
        }
        last_elapsed = last_elapsed.max(event.elapsed_ms);
        clock.set(event.elapsed_ms);
        logger.handle_event(&event.event);
    }

    let stats = logger.stop()?;
    println!("Wrote {}", stats.path.display());
    println!("  Events replayed:    {}", trace.events.len());
    println!("  Records written:    {}", stats.total_written());
    println!("  Warm-up suppressed: {}", stats.suppressed_warmup);
    println!("  Write failures:     {}", stats.write_failures);
    for (tag, count) in &stats.records_written {
        println!("  {:<24}{}", tag, count);
    }
    Ok(())
}

fn summarize(path: &Path) -> Result<()> {
    let parsed = read_log(open_maybe_gz(path)?)
        .with_context(|| format!("reading log {}", path.display()))?;
    if parsed.records.is_empty() {
        bail!("{} contains no records", path.display());
    }

    for (key, value) in parsed.device.header_lines() {
        println!("{:<14}{}", key, value);
    }
    println!();
    println!("Records:  {}", parsed.records.len());
    println!("Duration: {:.1} s", parsed.duration_ms() as f64 / 1000.0);
    for (tag, count) in parsed.tag_counts() {
        println!("  {:<24}{}", tag, count);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Record {
            trace,
            out,
            config,
        } => record(&trace, &out, config.as_deref()),
        Command::Summarize { log } => summarize(&log),
    }
}
