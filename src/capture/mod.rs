//! Low-overhead interval capture.
//!
//! This module handles:
//! - Pooled per-thread storage of capture records
//! - The push/pop recorder and its stack-discipline check
//! - Overhead self-calibration
//! - The registry that collects finished threads

pub mod calibrate;
pub mod clock;
pub mod record;
pub mod recorder;
pub mod registry;
pub mod scope;
pub mod storage;

// Re-export main types
pub use calibrate::{calibrate, Calibration, CalibrationConfig, TrimPolicy};
pub use record::{Event, EventLog, Name};
pub use recorder::{Handle, ThreadRecorder};
pub use registry::{CollectingSink, ProfilerConfig, Registry, ThreadSink};
pub use scope::{finish, flush_thread, frame_scope, pop, push, push_frame, scope, ScopeGuard};
pub use storage::PagedStorage;
