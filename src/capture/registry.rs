//! Thread registry: the process context every recorder reports to.
//!
//! Owns the capture epoch, the lazily computed calibration and the map of
//! finished per-thread event lists. The map is touched once per thread, at
//! hand-off, under a mutex.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use log::{debug, info, warn};

use super::calibrate::{calibrate, Calibration, CalibrationConfig};
use super::record::{Event, EventLog};
use super::recorder::ThreadRecorder;
use crate::aggregator::{analyze_log, AnalysisOptions};
use crate::codec::{write_log, EncodeOptions};
use crate::output::render_report;
use crate::utils::config::{REPORT_ALL, REPORT_FILE_ENV, SERIALIZE_FILE_ENV};
use crate::utils::error::{OutputError, ShutdownError};

/// Receives one finished thread's event list
pub trait ThreadSink: Send + Sync {
    fn accept(&self, events: Vec<Event>);
}

/// Sink that keeps every hand-off in arrival order
#[derive(Default)]
pub struct CollectingSink {
    threads: Mutex<Vec<Vec<Event>>>,
}

impl CollectingSink {
    pub fn take(&self) -> Vec<Vec<Event>> {
        std::mem::take(&mut *self.threads.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl ThreadSink for CollectingSink {
    fn accept(&self, events: Vec<Event>) {
        self.threads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(events);
    }
}

/// Process-wide profiler configuration
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    pub calibration: CalibrationConfig,
    /// Read CPU time from the process clock instead of the thread clock
    pub process_clock: bool,
    /// Event log written by `Registry::finish`
    pub serialize_path: Option<PathBuf>,
    /// Text report written by `Registry::finish`
    pub report_path: Option<PathBuf>,
    /// `REPORT_*` sections of that report
    pub report_sections: u32,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            process_clock: false,
            serialize_path: None,
            report_path: None,
            report_sections: REPORT_ALL,
        }
    }
}

impl ProfilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calibration and shutdown output paths taken from the environment
    pub fn from_env() -> Self {
        Self {
            calibration: CalibrationConfig::from_env(),
            serialize_path: std::env::var_os(SERIALIZE_FILE_ENV).map(PathBuf::from),
            report_path: std::env::var_os(REPORT_FILE_ENV).map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn with_serialize_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.serialize_path = Some(path.into());
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn with_report_sections(mut self, sections: u32) -> Self {
        self.report_sections = sections;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_process_clock(mut self, process_clock: bool) -> Self {
        self.process_clock = process_clock;
        self
    }
}

pub struct Registry {
    epoch: Instant,
    config: ProfilerConfig,
    calibration: OnceLock<Calibration>,
    threads: Mutex<BTreeMap<u32, Vec<Event>>>,
    next_thread_id: AtomicU32,
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    pub fn new(config: ProfilerConfig) -> Self {
        Self {
            epoch: Instant::now(),
            config,
            calibration: OnceLock::new(),
            threads: Mutex::new(BTreeMap::new()),
            next_thread_id: AtomicU32::new(0),
        }
    }

    /// Registry with a fixed calibration, skipping self-measurement
    pub fn with_calibration(config: ProfilerConfig, calibration: Calibration) -> Self {
        let registry = Self::new(config);
        let _ = registry.calibration.set(calibration);
        registry
    }

    /// The process-global registry behind the thread-local capture API.
    ///
    /// Unless `init_global` ran first, the configuration comes from the
    /// environment.
    pub fn global() -> &'static Arc<Registry> {
        GLOBAL.get_or_init(|| Arc::new(Registry::new(ProfilerConfig::from_env())))
    }

    /// Configure the global registry. Returns false if it already exists.
    pub fn init_global(config: ProfilerConfig) -> bool {
        GLOBAL.set(Arc::new(Registry::new(config))).is_ok()
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Calibration triple, measured on first use and fixed afterwards
    pub fn calibration(&self) -> Calibration {
        *self.calibration.get_or_init(|| match calibrate(&self.config.calibration) {
            Ok(calibration) => {
                info!(
                    "wallclock penalty per call (nsec): self {:.2}, children {:.2}",
                    calibration.self_per_call_ns(),
                    calibration.children_per_call_ns()
                );
                calibration
            }
            Err(e) => {
                warn!("Overhead calibration failed, mitigation disabled: {}", e);
                Calibration::default()
            }
        })
    }

    /// New recorder for the calling thread.
    ///
    /// Calibration runs here if it has not yet, so that it never overlaps a
    /// real capture.
    pub fn recorder(self: &Arc<Self>) -> ThreadRecorder {
        self.calibration();
        let sink: Arc<dyn ThreadSink> = self.clone();
        ThreadRecorder::new(sink, self.epoch).with_process_clock(self.config.process_clock)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Move every collected thread out into an `EventLog`.
    pub fn take_log(&self) -> EventLog {
        let threads = std::mem::take(&mut *self.threads.lock().unwrap_or_else(|e| e.into_inner()));
        EventLog {
            calibration: self.calibration(),
            threads,
        }
    }
}

impl Registry {
    /// Shutdown hand-off: take the log, then write the configured event log
    /// and text report, in that order.
    ///
    /// Threads still running keep their events; only what was handed off
    /// before this call is written.
    pub fn finish(&self) -> Result<EventLog, ShutdownError> {
        let log = self.take_log();
        info!(
            "Profiler shutdown: {} events on {} threads",
            log.event_count(),
            log.threads.len()
        );

        if let Some(path) = &self.config.serialize_path {
            write_log(&log, path, &EncodeOptions::new())?;
        }
        if let Some(path) = &self.config.report_path {
            let run = analyze_log(&log, &AnalysisOptions::new())?;
            write_report(&render_report(&run, self.config.report_sections), path)?;
        }
        Ok(log)
    }
}

fn write_report(report: &str, path: &Path) -> Result<(), OutputError> {
    info!("Writing report to: {}", path.display());
    std::fs::write(path, report).map_err(OutputError::WriteFailed)
}

impl ThreadSink for Registry {
    fn accept(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        let thread_id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        debug!("Thread {} handed off {} events", thread_id, events.len());
        threads.insert(thread_id, events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ProtocolError;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::with_calibration(
            ProfilerConfig::new(),
            Calibration::new(1000, 20_000, 50_000),
        ))
    }

    #[test]
    fn test_threads_get_sequential_ids() {
        let registry = registry();
        for _ in 0..3 {
            let mut rec = registry.recorder();
            let h = rec.push("job", false);
            rec.pop(h).unwrap();
        }
        let log = registry.take_log();
        assert_eq!(log.threads.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(log.calibration, Calibration::new(1000, 20_000, 50_000));
    }

    #[test]
    fn test_empty_thread_is_skipped() {
        let registry = registry();
        drop(registry.recorder());
        assert_eq!(registry.thread_count(), 0);
    }

    #[test]
    fn test_hand_off_from_spawned_threads() {
        let registry = registry();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut rec = registry.recorder();
                    let f = rec.push("frame", true);
                    rec.pop(f).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.thread_count(), 4);
        assert_eq!(registry.take_log().event_count(), 4);
        assert_eq!(registry.thread_count(), 0);
    }

    #[test]
    fn test_thread_ids_not_reused_after_take() {
        let registry = registry();
        let record_one = |registry: &Arc<Registry>| {
            let mut rec = registry.recorder();
            let h = rec.push("job", false);
            rec.pop(h).unwrap();
        };
        record_one(&registry);
        let first = registry.take_log();
        record_one(&registry);
        let second = registry.take_log();
        assert_eq!(first.threads.keys().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(second.threads.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_finish_writes_log_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("run.log");
        let report_path = dir.path().join("run.txt");
        let config = ProfilerConfig::new()
            .with_serialize_path(&log_path)
            .with_report_path(&report_path);
        let registry = Arc::new(Registry::with_calibration(
            config,
            Calibration::new(1000, 20_000, 50_000),
        ));
        {
            let mut rec = registry.recorder();
            for _ in 0..3 {
                let frame = rec.push("frame", true);
                let draw = rec.push("draw", false);
                rec.pop(draw).unwrap();
                rec.pop(frame).unwrap();
            }
        }

        let log = registry.finish().unwrap();
        assert_eq!(log.event_count(), 6);
        assert_eq!(registry.thread_count(), 0);

        let written = crate::codec::Decoder::new().read_file(&log_path).unwrap();
        assert_eq!(written.event_count(), 6);
        assert_eq!(written.calibration, log.calibration);

        let report = std::fs::read_to_string(&report_path).unwrap();
        assert!(report.contains("Detailed report [ 1 thread(s) ]"));
        assert!(report.contains("draw"));
    }

    #[test]
    fn test_finish_without_frame_thread_still_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("run.log");
        let config = ProfilerConfig::new()
            .with_serialize_path(&log_path)
            .with_report_path(dir.path().join("run.txt"));
        let registry = Arc::new(Registry::with_calibration(config, Calibration::default()));
        {
            let mut rec = registry.recorder();
            let h = rec.push("io", false);
            rec.pop(h).unwrap();
        }

        assert!(matches!(
            registry.finish(),
            Err(ShutdownError::Protocol(ProtocolError::NoFrameThread))
        ));
        assert!(log_path.exists());
    }
}
