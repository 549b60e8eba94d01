//! Aggregation of captured events into call trees and statistics.
//!
//! This module transforms one thread's event list into:
//! - The full call tree, with repeated siblings merged
//! - A recursion-free variant of that tree
//! - Overhead-mitigated timings
//! - Per-function statistics

pub mod mitigation;
pub mod profile;
pub mod recursion;
pub mod stats;
pub mod tree;

// Re-export main types and functions
pub use mitigation::mitigate;
pub use profile::{analyze_log, analyze_thread, AnalysisOptions, RunProfile, ThreadFailure, ThreadProfile};
pub use recursion::collapse_recursion;
pub use stats::{check_recursion, collect_statistics, FunctionStat};
pub use tree::{CallTree, Node, NodeId};
