//! JSON report writer.
//!
//! Writes a `ProfileSummary` (calibration plus per-thread function
//! statistics) to disk with pretty formatting.

use crate::aggregator::{FunctionStat, RunProfile};
use crate::capture::Calibration;
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::OutputError;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Top-level summary structure written to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    /// Schema version for compatibility checking
    pub version: String,

    /// RFC 3339 timestamp of report generation
    pub generated_at: String,

    /// Overhead calibration carried by the event log
    pub calibration: Calibration,

    /// Whether calibrated overhead was subtracted from the timings
    pub mitigated: bool,

    /// Analysed threads, frame thread first
    pub threads: Vec<ThreadSummary>,

    /// Threads dropped from the report
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: u32,
    pub frame_thread: bool,
    pub frames: u64,
    pub frame_time_ns: u64,
    pub fps: f64,
    /// Raw intervals captured on the thread
    pub events: u64,
    /// Recursion-free per-function totals, hottest first
    pub functions: Vec<FunctionStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    pub thread_id: u32,
    pub error: String,
}

/// Build the serializable summary of an analysed run
pub fn to_summary(run: &RunProfile, mitigated: bool) -> ProfileSummary {
    ProfileSummary {
        version: SCHEMA_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339(),
        calibration: run.calibration,
        mitigated,
        threads: run
            .threads
            .iter()
            .map(|t| ThreadSummary {
                thread_id: t.thread_id,
                frame_thread: t.is_frame_thread(),
                frames: t.frame_count(),
                frame_time_ns: t.frame_time_ns(),
                fps: t.fps(),
                events: t.event_count(),
                functions: t.stats.clone(),
            })
            .collect(),
        failures: run
            .failures
            .iter()
            .map(|f| FailureSummary {
                thread_id: f.thread_id,
                error: f.error.to_string(),
            })
            .collect(),
    }
}

/// Write a summary to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_summary(summary: &ProfileSummary, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing summary to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, summary).map_err(OutputError::SerializationFailed)?;

    info!(
        "Summary written successfully ({} bytes)",
        calculate_file_size(output_path)
    );

    Ok(())
}

/// Write a summary to a string
pub fn summary_to_string(summary: &ProfileSummary) -> Result<String, OutputError> {
    serde_json::to_string_pretty(summary).map_err(OutputError::SerializationFailed)
}

/// Validate that output path is writable
///
/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.exists() && path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a summary back from a JSON file
///
/// **Public** - useful for validation and testing
pub fn read_summary(input_path: impl AsRef<Path>) -> Result<ProfileSummary, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading summary from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let summary: ProfileSummary =
        serde_json::from_reader(file).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Summary loaded: version {}, {} threads",
        summary.version,
        summary.threads.len()
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{analyze_log, AnalysisOptions};
    use crate::capture::{Event, EventLog};
    use tempfile::NamedTempFile;

    fn create_test_summary() -> ProfileSummary {
        let mut log = EventLog::new(Calibration::new(100, 2_000, 3_000));
        log.threads.insert(
            0,
            vec![
                Event::new("frame", 0, 0, 1_000_000).with_frame(true),
                Event::new("update", 1, 10, 400_000),
            ],
        );
        let run = analyze_log(&log, &AnalysisOptions::new()).unwrap();
        to_summary(&run, true)
    }

    #[test]
    fn test_write_and_read_summary() {
        let summary = create_test_summary();
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        write_summary(&summary, path).unwrap();
        let loaded = read_summary(path).unwrap();

        assert_eq!(loaded.version, SCHEMA_VERSION);
        assert_eq!(loaded.calibration, summary.calibration);
        assert_eq!(loaded.threads.len(), 1);
        assert_eq!(loaded.threads[0].functions, summary.threads[0].functions);
        assert!(loaded.threads[0].frame_thread);
        assert!(loaded.failures.is_empty());
    }

    #[test]
    fn test_summary_to_string_has_timestamp() {
        let text = summary_to_string(&create_test_summary()).unwrap();
        assert!(text.contains("\"generated_at\""));
        assert!(text.contains("\"update\""));
    }

    #[test]
    fn test_validate_output_path_empty() {
        let result = validate_output_path(Path::new(""));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_output_path_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = validate_output_path(temp_dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/summary.json");

        write_summary(&create_test_summary(), &nested_path).unwrap();

        assert!(nested_path.exists());
    }
}
