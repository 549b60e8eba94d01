//! fpsprof
//!
//! In-process call-interval profiler for frame-driven applications.
//! Instrumented code opens and closes named intervals per thread; the
//! captured intervals are rebuilt into call trees, corrected for the
//! instrumentation's own measured cost, and folded into per-function
//! statistics relative to the frame.
//!
//! ## Getting Started
//!
//! ```ignore
//! use fpsprof::capture;
//!
//! loop {
//!     let _frame = capture::frame_scope("frame");
//!     {
//!         let _g = capture::scope("update");
//!         update();
//!     }
//!     render();
//! }
//! ```
//!
//! At shutdown, take the collected log from `capture::Registry::global()`
//! and either serialize it with `codec::write_log` or analyse it directly
//! with `aggregator::analyze_log`. The `fpsprof` CLI renders reports from
//! saved logs.

pub mod aggregator;
pub mod capture;
pub mod codec;
pub mod commands;
pub mod output;
pub mod utils;

pub use aggregator::{analyze_log, analyze_thread, AnalysisOptions, CallTree, FunctionStat, RunProfile, ThreadProfile};
pub use capture::{Calibration, Event, EventLog, Registry};
pub use codec::{deserialize, serialize};
