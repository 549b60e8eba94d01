//! Per-thread recorder: push/pop over pooled storage.
//!
//! A recorder is owned by exactly one thread. `push` allocates a record,
//! stamps its start clocks and returns a handle; `pop` checks stack
//! discipline and stamps the stop clocks. On `flush` (or drop) the buffer is
//! drained and handed to the attached sink exactly once.

use std::sync::Arc;
use std::time::Instant;

use log::warn;

use super::clock::{cpu_now_ns, wallclock_ns};
use super::record::{CaptureRecord, Event};
use super::registry::ThreadSink;
use super::storage::PagedStorage;
use crate::utils::config::RESERVE_FACTOR;
use crate::utils::error::{CaptureError, OpenInterval, StackDiagnostic};

/// Opaque reference to an open interval, returned by `push`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(pub(crate) usize);

pub struct ThreadRecorder {
    storage: PagedStorage<CaptureRecord>,
    sink: Arc<dyn ThreadSink>,
    epoch: Instant,
    process_clock: bool,
    depth: i32,
    frame_items_prev: usize,
    frame_items_max: usize,
    poisoned: bool,
    flushed: bool,
}

impl ThreadRecorder {
    pub fn new(sink: Arc<dyn ThreadSink>, epoch: Instant) -> Self {
        Self::with_storage(sink, epoch, PagedStorage::new())
    }

    pub(crate) fn with_storage(
        sink: Arc<dyn ThreadSink>,
        epoch: Instant,
        storage: PagedStorage<CaptureRecord>,
    ) -> Self {
        Self {
            storage,
            sink,
            epoch,
            process_clock: false,
            depth: 0,
            frame_items_prev: 0,
            frame_items_max: 0,
            poisoned: false,
            flushed: false,
        }
    }

    /// Measure CPU time with the process clock instead of the thread clock
    pub fn with_process_clock(mut self, process_clock: bool) -> Self {
        self.process_clock = process_clock;
        self
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    #[inline]
    fn stamp_wc(&self) -> u64 {
        wallclock_ns(self.epoch).saturating_sub(self.storage.alloc_overhead_ns())
    }

    /// Open an interval named `name` at the current depth.
    #[inline]
    pub fn push(&mut self, name: &'static str, frame: bool) -> Handle {
        if self.depth == 0 {
            // New top-level unit: size the next frame from the largest so far.
            let count = self.storage.len();
            let items = count - self.frame_items_prev;
            self.frame_items_max = self.frame_items_max.max(items);
            self.frame_items_prev = count;
            self.storage.reserve(RESERVE_FACTOR * self.frame_items_max);
        }
        let record = CaptureRecord::new(name, self.depth, frame, self.process_clock);
        let idx = self.storage.alloc_item(record);
        self.depth += 1;

        let start_wc = self.stamp_wc();
        let start_cpu = cpu_now_ns(self.process_clock);
        if let Some(record) = self.storage.get_mut(idx) {
            record.start_wc = start_wc;
            record.start_cpu = start_cpu;
        }
        Handle(idx)
    }

    /// Close the interval behind `handle`.
    ///
    /// The interval must be the innermost open one; anything else is a stack
    /// violation and leaves this recorder poisoned.
    #[inline]
    pub fn pop(&mut self, handle: Handle) -> Result<(), CaptureError> {
        let level = match self.storage.get(handle.0) {
            Some(record) => record.stack_level,
            None => return Err(CaptureError::InvalidHandle(handle.0)),
        };
        self.depth -= 1;
        if level != self.depth {
            self.poisoned = true;
            return Err(CaptureError::StackMismatch(self.diagnose(handle)));
        }

        let stop_wc = self.stamp_wc();
        let stop_cpu = cpu_now_ns(self.process_clock);
        if let Some(record) = self.storage.get_mut(handle.0) {
            record.stop_wc = stop_wc;
            record.stop_cpu = stop_cpu;
            record.complete = true;
        }
        Ok(())
    }

    fn diagnose(&self, handle: Handle) -> StackDiagnostic {
        let (exit_name, exit_level) = self
            .storage
            .get(handle.0)
            .map(|r| (r.name, r.stack_level))
            .unwrap_or(("?", -1));
        let open = self
            .storage
            .iter()
            .filter(|r| !r.complete)
            .map(|r| OpenInterval {
                name: r.name.to_string(),
                stack_level: r.stack_level,
                is_exit: r.stack_level == exit_level && r.name == exit_name,
            })
            .collect();
        StackDiagnostic {
            open,
            exit_name: exit_name.to_string(),
            exit_level,
            current_level: self.depth,
        }
    }

    /// Drain the buffer and hand it to the sink. Later calls do nothing.
    pub fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;

        if self.poisoned {
            warn!(
                "Discarding {} records of a thread that violated stack discipline",
                self.storage.len()
            );
            self.storage.drain().for_each(drop);
            return;
        }

        let mut unfinished = 0usize;
        let events: Vec<Event> = self
            .storage
            .drain()
            .filter(|r| {
                unfinished += usize::from(!r.complete);
                r.complete
            })
            .map(CaptureRecord::into_event)
            .collect();
        if unfinished > 0 {
            warn!("Dropping {} intervals still open at thread hand-off", unfinished);
        }
        if events.is_empty() {
            return;
        }
        self.sink.accept(events);
    }
}

impl Drop for ThreadRecorder {
    fn drop(&mut self) {
        self.flush();
    }
}
