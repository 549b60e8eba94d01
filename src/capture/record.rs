//! Capture records and finalized events.
//!
//! A `CaptureRecord` is the raw slot written on the hot path; it only holds
//! `&'static str` names and raw clock readings. When a thread's buffer is
//! drained, every completed record becomes an immutable `Event`.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use super::calibrate::Calibration;

/// Interval name.
///
/// Captured names are borrowed for the process lifetime. Names read back from
/// a log are shared through the decoder's interner.
#[derive(Clone)]
pub enum Name {
    Static(&'static str),
    Shared(Arc<str>),
}

impl Name {
    pub fn as_str(&self) -> &str {
        match self {
            Name::Static(s) => s,
            Name::Shared(s) => s,
        }
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for Name {
    fn from(name: &'static str) -> Self {
        Name::Static(name)
    }
}

impl From<Arc<str>> for Name {
    fn from(name: Arc<str>) -> Self {
        Name::Shared(name)
    }
}

/// Raw slot written by `push` and finalized by `pop`
#[derive(Debug, Clone, Copy)]
pub(crate) struct CaptureRecord {
    pub(crate) name: &'static str,
    pub(crate) stack_level: i32,
    pub(crate) frame: bool,
    pub(crate) process_clock: bool,
    pub(crate) start_wc: u64,
    pub(crate) stop_wc: u64,
    pub(crate) start_cpu: u64,
    pub(crate) stop_cpu: u64,
    pub(crate) complete: bool,
}

impl CaptureRecord {
    pub(crate) fn new(name: &'static str, stack_level: i32, frame: bool, process_clock: bool) -> Self {
        Self {
            name,
            stack_level,
            frame,
            process_clock,
            start_wc: 0,
            stop_wc: 0,
            start_cpu: 0,
            stop_cpu: 0,
            complete: false,
        }
    }

    pub(crate) fn into_event(self) -> Event {
        Event {
            name: Name::Static(self.name),
            stack_level: self.stack_level,
            frame: self.frame,
            process_clock: self.process_clock,
            start_ns: self.start_wc,
            stop_ns: self.stop_wc.max(self.start_wc),
            cpu_ns: self.stop_cpu.saturating_sub(self.start_cpu),
        }
    }
}

/// A finished interval: one push/pop pair on one thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: Name,
    /// Zero-based nesting depth at push time
    pub stack_level: i32,
    /// Marks the repeatedly invoked top-level unit (one frame)
    pub frame: bool,
    /// CPU time was read from the process clock rather than the thread clock
    pub process_clock: bool,
    /// Wallclock ns since the capture epoch
    pub start_ns: u64,
    pub stop_ns: u64,
    /// CPU time spent inside the interval; zero when unavailable
    pub cpu_ns: u64,
}

impl Event {
    pub fn new(name: impl Into<Name>, stack_level: i32, start_ns: u64, stop_ns: u64) -> Self {
        Self {
            name: name.into(),
            stack_level,
            frame: false,
            process_clock: false,
            start_ns,
            stop_ns,
            cpu_ns: 0,
        }
    }

    pub fn with_frame(mut self, frame: bool) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_cpu(mut self, cpu_ns: u64) -> Self {
        self.cpu_ns = cpu_ns;
        self
    }

    pub fn duration_ns(&self) -> u64 {
        self.stop_ns.saturating_sub(self.start_ns)
    }

    /// Equality over the fields a log must reproduce exactly
    pub fn same_interval(&self, other: &Event) -> bool {
        self.name == other.name
            && self.stack_level == other.stack_level
            && self.frame == other.frame
            && self.start_ns == other.start_ns
            && self.stop_ns == other.stop_ns
    }
}

/// Everything collected for one run: calibration plus per-thread events
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub calibration: Calibration,
    pub threads: BTreeMap<u32, Vec<Event>>,
}

impl EventLog {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            calibration,
            threads: BTreeMap::new(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.threads.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_equality_ignores_storage() {
        let shared: Arc<str> = Arc::from("update");
        assert_eq!(Name::from("update"), Name::from(shared));
        assert_eq!(Name::from("update"), "update");
    }

    #[test]
    fn test_record_clamps_cpu_delta() {
        let mut record = CaptureRecord::new("tick", 0, true, false);
        record.start_wc = 10;
        record.stop_wc = 25;
        record.start_cpu = 500;
        record.stop_cpu = 400;
        record.complete = true;

        let event = record.into_event();
        assert_eq!(event.cpu_ns, 0);
        assert_eq!(event.duration_ns(), 15);
        assert!(event.frame);
    }
}
