//! fpsprof CLI
//!
//! Renders reports from saved event logs and measures the profiler's
//! own overhead on this machine.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use fpsprof::capture::{CalibrationConfig, TrimPolicy};
use fpsprof::commands::{
    display_version, execute_report, run_calibration, validate_args, validate_log_file, ReportArgs,
};
use fpsprof::utils::config::{
    CALIBRATION_SAMPLES_ENV, CALIBRATION_TRIALS_ENV, DEFAULT_CALIBRATION_SAMPLES,
    DEFAULT_CALIBRATION_TRIALS, REPORT_ALL,
};

/// fpsprof - call-interval profiler reports
#[derive(Parser, Debug)]
#[command(name = "fpsprof")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a report from an event log
    Report {
        /// Event log to analyse
        log: PathBuf,

        /// Section bitmask: 1 thread roots, 2 detailed tree,
        /// 4 recursion-collapsed tree, 8 functions
        #[arg(short, long, default_value_t = REPORT_ALL, value_parser = parse_sections)]
        sections: u32,

        /// Output path for a JSON summary (optional)
        #[arg(short, long)]
        json: Option<PathBuf>,

        /// Keep raw timings instead of subtracting calibrated overhead
        #[arg(long)]
        no_mitigate: bool,
    },

    /// Check that an event log decodes and reconstructs
    Validate {
        /// Event log to check
        log: PathBuf,
    },

    /// Measure instrumentation overhead on this machine
    Calibrate {
        /// Dummy intervals per trial
        #[arg(long, env = CALIBRATION_SAMPLES_ENV, default_value_t = DEFAULT_CALIBRATION_SAMPLES)]
        samples: u32,

        /// Number of trials
        #[arg(long, env = CALIBRATION_TRIALS_ENV, default_value_t = DEFAULT_CALIBRATION_TRIALS)]
        trials: u32,

        /// Discard trials beyond this many standard deviations instead of
        /// dropping the extreme ones
        #[arg(long)]
        sigma: Option<f64>,
    },

    /// Display version information
    Version,
}

/// Accepts decimal or `0x` hex
fn parse_sections(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid section mask '{}': {}", value, e))
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Report {
            log,
            sections,
            json,
            no_mitigate,
        } => {
            let args = ReportArgs {
                log_path: log,
                sections,
                output_json: json,
                mitigate: !no_mitigate,
            };

            // Validate args first
            validate_args(&args)?;

            let report = execute_report(&args)?;
            print!("{}", report);
        }

        Commands::Validate { log } => {
            validate_log_file(&log)?;
        }

        Commands::Calibrate {
            samples,
            trials,
            sigma,
        } => {
            let mut config = CalibrationConfig::new()
                .with_samples(samples)
                .with_trials(trials);
            if let Some(k) = sigma {
                config = config.with_trim(TrimPolicy::SigmaClip { k });
            }
            run_calibration(&config)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
