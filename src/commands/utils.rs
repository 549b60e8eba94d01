use crate::aggregator::{analyze_log, AnalysisOptions};
use crate::capture::{calibrate, CalibrationConfig};
use crate::codec::Decoder;
use crate::utils::config::SCHEMA_VERSION;
use anyhow::{Context, Result};
use std::path::Path;

/// Check that an event log decodes and reconstructs cleanly
pub fn validate_log_file(file_path: &Path) -> Result<()> {
    println!("Validating event log: {}", file_path.display());

    let log = Decoder::new()
        .read_file(file_path)
        .with_context(|| format!("Failed to read event log {}", file_path.display()))?;

    println!("✓ Valid event log");
    println!(
        "  Calibration: {} samples, self {} ns, children {} ns",
        log.calibration.samples, log.calibration.self_ns, log.calibration.children_ns
    );
    println!("  Threads: {}", log.threads.len());
    println!("  Events: {}", log.event_count());

    match analyze_log(&log, &AnalysisOptions::new()) {
        Ok(run) => {
            if let Some(frame) = run.frame_thread() {
                println!(
                    "  Frame thread: {} ({} frames, {:.1} fps)",
                    frame.thread_id,
                    frame.frame_count(),
                    frame.fps()
                );
            }
            for failure in &run.failures {
                println!("  ✗ Thread {}: {}", failure.thread_id, failure.error);
            }
            if !run.failures.is_empty() {
                anyhow::bail!("{} thread(s) failed to reconstruct", run.failures.len());
            }
        }
        Err(e) => anyhow::bail!("Event log cannot be reported: {}", e),
    }

    Ok(())
}

/// Measure and print this machine's instrumentation overhead
pub fn run_calibration(config: &CalibrationConfig) -> Result<()> {
    println!(
        "Calibrating: {} trials of {} intervals",
        config.trials, config.samples
    );
    let calibration = calibrate(config).context("Calibration run failed")?;

    println!("  Self overhead:     {:.1} ns/call", calibration.self_per_call_ns());
    println!("  Children overhead: {:.1} ns/call", calibration.children_per_call_ns());
    println!(
        "  Header triple:     {} {} {}",
        calibration.samples, calibration.self_ns, calibration.children_ns
    );
    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("fpsprof v{}", env!("CARGO_PKG_VERSION"));
    println!("Summary Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("An in-process call-interval profiler for frame-driven applications.");
}
