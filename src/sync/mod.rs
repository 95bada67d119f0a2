//! Cross-process synchronization primitives (spec.md §4.10-§4.12).
//!
//! None of these block on an OS futex/condvar: every wait loop is
//! exponential backoff over a shared-memory atomic, since the processes
//! on either side of the segment may not even share a kernel scheduler
//! class, let alone a futex word the OS understands as shared.

pub mod barrier;
pub mod latch;
pub mod semaphore;

use std::time::{Duration, Instant};

use crate::backoff::Backoff;

/// Poll `condition` with backoff until it returns `true` or `deadline`
/// elapses. Shared by the `wait_timeout` variants below.
fn spin_until_timeout(deadline: Instant, mut condition: impl FnMut() -> bool) -> bool {
    let mut backoff = Backoff::new();
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return condition();
        }
        backoff.snooze();
    }
}

pub(crate) fn deadline(timeout_ms: u64) -> Instant {
    Instant::now() + Duration::from_millis(timeout_ms)
}

pub(crate) use spin_until_timeout as spin_wait;
