//! Report writers for analysed runs.
//!
//! This module handles:
//! - JSON summaries (calibration plus per-thread function statistics)
//! - Text reports (thread roots, call trees, function tables)

pub mod json;
pub mod text;

// Re-export main functions
pub use json::{read_summary, summary_to_string, to_summary, write_summary, ProfileSummary, ThreadSummary};
pub use text::render_report;
