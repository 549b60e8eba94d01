//! Thread-local capture API over the global registry.
//!
//! Each thread lazily gets its own `ThreadRecorder` bound to
//! `Registry::global()`. The recorder hands its events off when the thread's
//! TLS is torn down, or earlier through `flush_thread`.

use std::cell::RefCell;

use log::error;

use super::record::EventLog;
use super::recorder::{Handle, ThreadRecorder};
use super::registry::Registry;
use crate::utils::error::{CaptureError, ShutdownError};

thread_local! {
    static RECORDER: RefCell<Option<ThreadRecorder>> = const { RefCell::new(None) };
}

fn with_recorder<R>(f: impl FnOnce(&mut ThreadRecorder) -> R) -> R {
    RECORDER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let recorder = slot.get_or_insert_with(|| Registry::global().recorder());
        f(recorder)
    })
}

/// Open a named interval on the calling thread
#[inline]
pub fn push(name: &'static str) -> Handle {
    with_recorder(|r| r.push(name, false))
}

/// Open the calling thread's frame-boundary interval
#[inline]
pub fn push_frame(name: &'static str) -> Handle {
    with_recorder(|r| r.push(name, true))
}

/// Close the innermost interval opened on the calling thread
#[inline]
pub fn pop(handle: Handle) -> Result<(), CaptureError> {
    with_recorder(|r| r.pop(handle))
}

/// Hand the calling thread's events to the global registry now.
///
/// The next `push` on this thread starts a fresh recorder.
pub fn flush_thread() {
    let recorder = RECORDER.with(|cell| cell.borrow_mut().take());
    drop(recorder);
}

/// Flush the calling thread, then write the global registry's shutdown
/// outputs.
pub fn finish() -> Result<EventLog, ShutdownError> {
    flush_thread();
    Registry::global().finish()
}

/// Closes its interval when dropped
#[must_use = "dropping the guard immediately closes the interval; bind it with `let _guard = ...`"]
pub struct ScopeGuard {
    handle: Handle,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Err(e) = pop(self.handle) {
            error!("{}", e);
        }
    }
}

/// Scoped interval: `let _g = fpsprof::capture::scope("load");`
pub fn scope(name: &'static str) -> ScopeGuard {
    ScopeGuard { handle: push(name) }
}

/// Scoped frame-boundary interval
pub fn frame_scope(name: &'static str) -> ScopeGuard {
    ScopeGuard {
        handle: push_frame(name),
    }
}
