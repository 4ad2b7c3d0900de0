//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "feeder", version, about = "Scheduled two-actuator feed controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/feeder.toml")]
    pub config: PathBuf,

    /// Print results and errors as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Use the simulated bench plant instead of the indicator and relays
    #[arg(long, action = ArgAction::SetTrue)]
    pub simulate: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduled control loop until interrupted
    Run {
        /// Stop after this many ticks
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
    },
    /// Run one manual feeding cycle to completion
    Feed {
        /// Target weight for this cycle (defaults to feeding.target_weight)
        #[arg(long, value_name = "WEIGHT")]
        target: Option<f32>,
    },
    /// Read the four bin weights once
    Bins,
    /// Show the configured feed times and the next one due today
    Schedule,
    /// Switch one actuator on for a few seconds, then off
    Relay {
        /// Actuator number (1 or 2)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        actuator: u8,
        /// Seconds to hold the output on
        #[arg(long, default_value_t = 3)]
        secs: u64,
    },
    /// Print the most recent feed history rows
    History {
        /// Number of rows to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Quick health check (config, history file, indicator link)
    SelfCheck,
}
