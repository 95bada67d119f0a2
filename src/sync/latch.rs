//! One-shot countdown latch (spec.md §4.12). Monotone non-increasing,
//! saturates at 0, never resets — contrast with [`crate::sync::barrier::Barrier`].

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backoff::Backoff;
use crate::segment::Segment;
use crate::structures::{allocate, lookup};
use crate::sync::{deadline, spin_wait};

#[repr(C)]
struct Header {
    count: AtomicU32,
    initial: u32,
}

const HEADER_SIZE: usize = size_of::<Header>();

pub struct Latch {
    base: *mut u8,
}

unsafe impl Send for Latch {}
unsafe impl Sync for Latch {}

impl Latch {
    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    pub fn create_in(segment: &Segment, name: &str, initial: u32) -> crate::error::Result<Self> {
        let base = allocate(segment, name, HEADER_SIZE as u32)?;
        unsafe {
            let header = &mut *(base as *mut Header);
            header.count = AtomicU32::new(initial);
            header.initial = initial;
        }
        Ok(Latch { base })
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        Ok(Latch { base })
    }

    pub fn count(&self) -> u32 {
        self.header().count.load(Ordering::Acquire)
    }

    pub fn initial(&self) -> u32 {
        self.header().initial
    }

    /// Decrement by `n`, saturating at 0.
    pub fn count_down(&self, n: u32) {
        let header = self.header();
        loop {
            let c = header.count.load(Ordering::Relaxed);
            if c == 0 {
                return;
            }
            let next = c.saturating_sub(n);
            if header
                .count
                .compare_exchange_weak(c, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    pub fn try_wait(&self) -> bool {
        self.count() == 0
    }

    pub fn wait(&self) {
        let mut backoff = Backoff::new();
        while !self.try_wait() {
            backoff.snooze();
        }
    }

    pub fn wait_timeout(&self, timeout_ms: u64) -> bool {
        spin_wait(deadline(timeout_ms), || self.try_wait())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering as CO};
    use std::sync::Arc;
    use std::thread;

    fn unique_name(tag: &str) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        format!(
            "/zeroipc_test_latch_{tag}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, CO::Relaxed)
        )
    }

    #[test]
    fn five_waiters_released_after_three_count_downs() {
        let name = unique_name("waiters");
        let seg = Arc::new(Segment::create(&name, 1 << 16, 8).unwrap());
        let latch = Arc::new(Latch::create_in(&seg, "l", 3).unwrap());

        assert!(!latch.try_wait());

        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || latch.wait())
            })
            .collect();

        latch.count_down(1);
        assert!(!latch.try_wait());
        latch.count_down(1);
        assert!(!latch.try_wait());
        latch.count_down(1);
        assert!(latch.try_wait());

        for w in waiters {
            w.join().unwrap();
        }
        Segment::destroy(&name).unwrap();
    }

    #[test]
    fn count_down_saturates_at_zero() {
        let name = unique_name("saturate");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let latch = Latch::create_in(&seg, "l", 2).unwrap();
        latch.count_down(10);
        assert_eq!(latch.count(), 0);
        assert!(latch.try_wait());
        Segment::destroy(&name).unwrap();
    }

    #[test]
    fn wait_timeout_fails_if_never_reached() {
        let name = unique_name("timeout");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let latch = Latch::create_in(&seg, "l", 1).unwrap();
        assert!(!latch.wait_timeout(20));
        Segment::destroy(&name).unwrap();
    }
}
