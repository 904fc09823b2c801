//! maestro - command-line score player.
//!
//! Loads a JSON score, compiles it and performs it against the system
//! clock, printing every outgoing MIDI message. Useful for exercising a
//! score end to end without wiring up a real output device.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- score.json            # play the whole score
//! cargo run -- score.json --speed 2  # twice as fast
//! ```

use anyhow::{Context, Result};
use maestro::{
    MessageSink, PerformanceObserver, PerformanceOptions, Recording, Scheduler, Score,
    SystemTimeSource,
};
use std::path::PathBuf;

/// Command-line options for the player.
struct CliOptions {
    /// Path to the JSON score to perform.
    score: PathBuf,
    /// Playback speed factor.
    speed: f64,
    /// Capture a recording and report its size at the end.
    record: bool,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `<score.json>`: the score to play (required)
    /// - `--speed <factor>` or `-s <factor>`: playback speed (default 1.0)
    /// - `--record` or `-r`: record the performance
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut score: Option<PathBuf> = None;
        let mut speed = 1.0f64;
        let mut record = false;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--speed" | "-s" => {
                    i += 1;
                    if i >= args.len() {
                        eprintln!("Error: --speed requires a factor argument");
                        std::process::exit(1);
                    }
                    speed = args[i]
                        .parse()
                        .with_context(|| format!("invalid speed factor: {}", args[i]))?;
                    if speed <= 0.0 {
                        eprintln!("Error: speed factor must be positive");
                        std::process::exit(1);
                    }
                }
                "--record" | "-r" => record = true,
                "--help" | "-h" => {
                    println!("Usage: maestro <score.json> [--speed <factor>] [--record]");
                    std::process::exit(0);
                }
                other if score.is_none() && !other.starts_with('-') => {
                    score = Some(PathBuf::from(other));
                }
                other => {
                    eprintln!("Error: unknown argument: {other}");
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        let Some(score) = score else {
            eprintln!("Usage: maestro <score.json> [--speed <factor>] [--record]");
            std::process::exit(1);
        };
        Ok(Self {
            score,
            speed,
            record,
        })
    }
}

/// Prints each outgoing message instead of driving a device.
struct ConsoleSink;

impl MessageSink for ConsoleSink {
    fn send(&mut self, bytes: &[u8], timestamp_ms: f64) {
        println!("{timestamp_ms:10.1} ms  {bytes:02X?}");
    }
}

/// Reports performance progress on the console.
struct ConsoleObserver;

impl PerformanceObserver for ConsoleObserver {
    fn region_ended(&mut self, region_index: usize) {
        println!("-- region {region_index} ended --");
    }

    fn performance_ended(&mut self, recording: Option<Recording>, realized_duration_ms: f64) {
        println!("-- performance ended after {realized_duration_ms:.0} ms --");
        if let Some(recording) = recording {
            println!("-- recorded {} messages --", recording.len());
        }
    }
}

fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    // Initialize logging (optional, for debugging)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let json = std::fs::read_to_string(&cli.score)
        .with_context(|| format!("failed to read score: {}", cli.score.display()))?;
    let score = Score::from_json(&json)
        .with_context(|| format!("failed to compile score: {}", cli.score.display()))?;

    let mut options = PerformanceOptions::whole_score(&score);
    options.speed_factor = cli.speed;
    options.record = cli.record;

    let time_source = SystemTimeSource::new(Box::new(ConsoleSink));
    let mut scheduler = Scheduler::new(score, Box::new(time_source), Box::new(ConsoleObserver));
    scheduler.play(options);
    scheduler.run_blocking();
    Ok(())
}
