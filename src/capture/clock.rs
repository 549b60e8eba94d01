//! Wallclock and CPU clocks used by the recorder.
//!
//! Wallclock readings are nanoseconds since a per-context epoch. CPU clocks
//! come from `clock_gettime` with the thread or process CPU-time clock; on
//! platforms without them CPU time reads as zero.

use std::time::Instant;

/// Nanoseconds elapsed since `epoch`
#[inline]
pub fn wallclock_ns(epoch: Instant) -> u64 {
    Instant::now().saturating_duration_since(epoch).as_nanos() as u64
}

/// CPU time of the calling thread, or of the whole process
#[inline]
pub fn cpu_now_ns(process_clock: bool) -> u64 {
    if process_clock {
        process_cpu_ns()
    } else {
        thread_cpu_ns()
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
mod imp {
    use nix::time::{clock_gettime, ClockId};

    fn read(clock: ClockId) -> u64 {
        match clock_gettime(clock) {
            Ok(ts) => ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64,
            Err(_) => 0,
        }
    }

    pub fn thread_cpu_ns() -> u64 {
        read(ClockId::CLOCK_THREAD_CPUTIME_ID)
    }

    pub fn process_cpu_ns() -> u64 {
        read(ClockId::CLOCK_PROCESS_CPUTIME_ID)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
mod imp {
    pub fn thread_cpu_ns() -> u64 {
        0
    }

    pub fn process_cpu_ns() -> u64 {
        0
    }
}

pub use imp::{process_cpu_ns, thread_cpu_ns};
