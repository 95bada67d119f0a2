//! Exponential backoff with a sleep cap, shared by the spin-wait
//! coordination primitives (semaphore, barrier, latch, pool).
//!
//! Doubles from 1us up to a 1ms cap, per spec.

use std::thread;
use std::time::Duration;

const MIN_DELAY_NANOS: u64 = 1_000;
const MAX_DELAY_NANOS: u64 = 1_000_000;

/// Tracks the current delay for a single wait loop.
pub struct Backoff {
    delay_nanos: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Backoff {
            delay_nanos: MIN_DELAY_NANOS,
        }
    }

    /// Spin or sleep once, then grow the delay for next time.
    pub fn snooze(&mut self) {
        if self.delay_nanos <= MIN_DELAY_NANOS {
            thread::yield_now();
        } else {
            thread::sleep(Duration::from_nanos(self.delay_nanos));
        }
        self.delay_nanos = (self.delay_nanos * 2).min(MAX_DELAY_NANOS);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
