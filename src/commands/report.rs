//! Report command implementation.
//!
//! The report command:
//! 1. Decodes an event log
//! 2. Analyses every thread (trees, mitigation, statistics)
//! 3. Prints the selected text sections
//! 4. Optionally writes a JSON summary

use crate::aggregator::{analyze_log, AnalysisOptions};
use crate::codec::Decoder;
use crate::output::{render_report, to_summary, write_summary};
use crate::utils::config::REPORT_ALL;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the report command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct ReportArgs {
    /// Event log to analyse
    pub log_path: PathBuf,

    /// `REPORT_*` section bitmask
    pub sections: u32,

    /// Output path for the JSON summary (optional)
    pub output_json: Option<PathBuf>,

    /// Subtract calibrated overhead
    pub mitigate: bool,
}

impl Default for ReportArgs {
    fn default() -> Self {
        Self {
            log_path: PathBuf::new(),
            sections: REPORT_ALL,
            output_json: None,
            mitigate: true,
        }
    }
}

/// Execute the report command, returning the rendered text
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Unreadable or malformed event log
/// * No frame thread in the log
/// * JSON write errors
pub fn execute_report(args: &ReportArgs) -> Result<String> {
    let start_time = Instant::now();

    info!("Reading event log: {}", args.log_path.display());
    let mut decoder = Decoder::new();
    let log = decoder
        .read_file(&args.log_path)
        .with_context(|| format!("Failed to read event log {}", args.log_path.display()))?;
    debug!(
        "Decoded {} events on {} threads ({} distinct names)",
        log.event_count(),
        log.threads.len(),
        decoder.interner().len()
    );

    let options = AnalysisOptions::new().with_mitigation(args.mitigate);
    let run = analyze_log(&log, &options).context("Failed to analyse event log")?;
    for failure in &run.failures {
        warn!("Thread {} left out of the report: {}", failure.thread_id, failure.error);
    }

    let report = render_report(&run, args.sections);

    if let Some(path) = &args.output_json {
        let summary = to_summary(&run, args.mitigate && log.calibration.is_calibrated());
        write_summary(&summary, path).context("Failed to write JSON summary")?;
        info!("✓ Summary written to: {}", path.display());
    }

    info!(
        "Report completed in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(report)
}

/// Validate report arguments
///
/// **Public** - can be called before execute_report for early validation
pub fn validate_args(args: &ReportArgs) -> Result<()> {
    if args.sections == 0 {
        anyhow::bail!("At least one report section must be selected");
    }
    if args.sections & !REPORT_ALL != 0 {
        anyhow::bail!(
            "Unknown report section bits in {:#x} (valid: {:#x})",
            args.sections,
            REPORT_ALL
        );
    }
    if !args.log_path.is_file() {
        anyhow::bail!("Event log not found: {}", args.log_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Calibration, Event, EventLog};
    use crate::codec::{write_log, EncodeOptions};
    use crate::output::read_summary;

    fn write_test_log(dir: &std::path::Path) -> PathBuf {
        let mut log = EventLog::new(Calibration::new(1000, 10_000, 20_000));
        let mut events = Vec::new();
        for i in 0..5u64 {
            let base = i * 1_000_000;
            events.push(Event::new("frame", 0, base, base + 900_000).with_frame(true));
            events.push(Event::new("physics", 1, base + 1_000, base + 300_000));
        }
        log.threads.insert(0, events);
        let path = dir.join("run.log");
        write_log(&log, &path, &EncodeOptions::new()).unwrap();
        path
    }

    #[test]
    fn test_execute_report_with_json() {
        let dir = tempfile::tempdir().unwrap();
        let args = ReportArgs {
            log_path: write_test_log(dir.path()),
            output_json: Some(dir.path().join("out/summary.json")),
            ..Default::default()
        };
        validate_args(&args).unwrap();

        let report = execute_report(&args).unwrap();
        assert!(report.contains("physics"));

        let summary = read_summary(dir.path().join("out/summary.json")).unwrap();
        assert!(summary.mitigated);
        assert_eq!(summary.threads[0].frames, 5);
    }

    #[test]
    fn test_validate_args_sections() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = write_test_log(dir.path());

        let zero = ReportArgs {
            log_path: log_path.clone(),
            sections: 0,
            ..Default::default()
        };
        assert!(validate_args(&zero).is_err());

        let unknown = ReportArgs {
            log_path,
            sections: 0x10,
            ..Default::default()
        };
        assert!(validate_args(&unknown).is_err());
    }

    #[test]
    fn test_validate_args_missing_log() {
        let args = ReportArgs {
            log_path: PathBuf::from("/nonexistent/run.log"),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }
}
