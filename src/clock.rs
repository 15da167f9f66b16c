//! Injected time source.
//!
//! Polling loops are built from bounded sleeps. Keeping the clock behind a
//! trait lets tests drive scans and connect confirmation with a manual clock
//! instead of wall-time sleeps.

use std::time::{Duration, Instant};

/// A monotonic time source with a blocking sleep.
pub trait Clock {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Blocks for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
