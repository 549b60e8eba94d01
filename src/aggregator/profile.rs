//! Per-thread and per-run analysis pipeline.
//!
//! Each thread goes through build, mitigation, recursion collapsing and
//! statistics on its own; a failure only drops that thread from the run.

use log::{debug, info, warn};

use super::mitigation::mitigate;
use super::recursion::collapse_recursion;
use super::stats::{collect_statistics, FunctionStat};
use super::tree::CallTree;
use crate::capture::{Calibration, Event, EventLog};
use crate::utils::error::{AnalysisError, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Subtract calibrated instrumentation overhead
    pub mitigate: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { mitigate: true }
    }
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mitigation(mut self, mitigate: bool) -> Self {
        self.mitigate = mitigate;
        self
    }
}

/// Both tree variants of one thread plus its function statistics
#[derive(Debug, Clone)]
pub struct ThreadProfile {
    pub thread_id: u32,
    pub full: CallTree,
    pub collapsed: CallTree,
    pub stats: Vec<FunctionStat>,
}

impl ThreadProfile {
    pub fn is_frame_thread(&self) -> bool {
        self.full.root().frame
    }

    /// Number of frames, or 0 on a thread without a frame boundary
    pub fn frame_count(&self) -> u64 {
        self.full
            .frame_node()
            .map(|id| self.full.node(id).count)
            .unwrap_or(0)
    }

    /// Total wallclock spent in frames
    pub fn frame_time_ns(&self) -> u64 {
        self.full
            .frame_node()
            .map(|id| self.full.node(id).realtime_ns)
            .unwrap_or(0)
    }

    /// Frames per second over the whole capture
    pub fn fps(&self) -> f64 {
        let time = self.frame_time_ns();
        if time == 0 {
            return 0.0;
        }
        self.frame_count() as f64 * 1e9 / time as f64
    }

    pub fn event_count(&self) -> u64 {
        self.full
            .preorder()
            .into_iter()
            .filter(|&id| id != self.full.root_id())
            .map(|id| self.full.node(id).count)
            .sum()
    }
}

/// A thread whose analysis failed
#[derive(Debug, Clone)]
pub struct ThreadFailure {
    pub thread_id: u32,
    pub error: AnalysisError,
}

/// Analysis of every thread in a log
#[derive(Debug, Clone)]
pub struct RunProfile {
    pub calibration: Calibration,
    /// The frame thread comes first
    pub threads: Vec<ThreadProfile>,
    pub failures: Vec<ThreadFailure>,
}

impl RunProfile {
    pub fn frame_thread(&self) -> Option<&ThreadProfile> {
        self.threads.first().filter(|t| t.is_frame_thread())
    }
}

/// Run the full pipeline over one thread's events
pub fn analyze_thread(
    thread_id: u32,
    events: &[Event],
    calibration: &Calibration,
    options: &AnalysisOptions,
) -> Result<ThreadProfile, AnalysisError> {
    let mut full = CallTree::build(events)?;
    if options.mitigate {
        mitigate(&mut full, calibration);
    }
    let collapsed = collapse_recursion(&full);
    let stats = collect_statistics(&collapsed)?;

    debug!(
        "Thread {}: {} nodes, {} collapsed, {} functions",
        thread_id,
        full.len(),
        collapsed.len(),
        stats.len()
    );
    Ok(ThreadProfile {
        thread_id,
        full,
        collapsed,
        stats,
    })
}

/// Analyse every thread of a log independently.
///
/// Fails only when no surviving thread carries a frame boundary.
pub fn analyze_log(log: &EventLog, options: &AnalysisOptions) -> Result<RunProfile, ProtocolError> {
    let mut threads = Vec::new();
    let mut failures = Vec::new();

    for (&thread_id, events) in &log.threads {
        match analyze_thread(thread_id, events, &log.calibration, options) {
            Ok(profile) => threads.push(profile),
            Err(error) => {
                warn!("Skipping thread {}: {}", thread_id, error);
                failures.push(ThreadFailure { thread_id, error });
            }
        }
    }

    let frame_threads = threads.iter().filter(|t| t.is_frame_thread()).count();
    if frame_threads == 0 {
        return Err(ProtocolError::NoFrameThread);
    }
    if frame_threads > 1 {
        debug!("{} frame threads found, using the first", frame_threads);
    }
    // Stable: the remaining threads keep id order
    threads.sort_by_key(|t| !t.is_frame_thread());

    info!(
        "Analysed {} threads ({} failed)",
        threads.len(),
        failures.len()
    );
    Ok(RunProfile {
        calibration: log.calibration,
        threads,
        failures,
    })
}
