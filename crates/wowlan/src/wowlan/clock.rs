//! Boot-time clock.
//!
//! Dark resume throttling and the wake alarms are about wall time spent in
//! suspend, which `CLOCK_MONOTONIC` (and therefore `tokio::time`) does not
//! count. They read `CLOCK_BOOTTIME` through [`Clock`] instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Time since boot, including time spent suspended.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// `CLOCK_BOOTTIME`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootClock;

impl Clock for BootClock {
    fn now(&self) -> Duration {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) };
        if rc != 0 {
            tracing::error!(
                "clock_gettime(CLOCK_BOOTTIME) failed: {}",
                std::io::Error::last_os_error()
            );
            return Duration::ZERO;
        }
        Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
    }
}

/// Boot clock for tests: the tokio clock plus time declared as spent
/// suspended with [`suspend_for`](Self::suspend_for).
///
/// Clones share the suspended total, so a test can keep one clone while the
/// controller owns another.
#[derive(Debug, Clone)]
pub struct SimulatedBootClock {
    origin: Instant,
    suspended_ns: Arc<AtomicU64>,
}

impl SimulatedBootClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            suspended_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Let `d` pass on this clock only, as the host does while asleep.
    pub fn suspend_for(&self, d: Duration) {
        let ns = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        self.suspended_ns.fetch_add(ns, Ordering::Relaxed);
    }
}

impl Default for SimulatedBootClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimulatedBootClock {
    fn now(&self) -> Duration {
        self.origin.elapsed() + Duration::from_nanos(self.suspended_ns.load(Ordering::Relaxed))
    }
}
