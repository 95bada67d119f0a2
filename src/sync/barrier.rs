//! Reusable cyclic barrier (spec.md §4.11).
//!
//! The `n`th arrival resets `arrived` *before* advancing `generation`,
//! so no early arrival of the next cycle can observe `arrived == n` for
//! the cycle that just closed.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backoff::Backoff;
use crate::segment::Segment;
use crate::structures::{allocate, lookup};
use crate::sync::{deadline, spin_wait};

#[repr(C)]
struct Header {
    arrived: AtomicU32,
    generation: AtomicU32,
    n: u32,
    _pad: u32,
}

const HEADER_SIZE: usize = size_of::<Header>();

pub struct Barrier {
    base: *mut u8,
}

unsafe impl Send for Barrier {}
unsafe impl Sync for Barrier {}

impl Barrier {
    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    pub fn create_in(
        segment: &Segment,
        name: &str,
        num_participants: u32,
    ) -> crate::error::Result<Self> {
        let base = allocate(segment, name, HEADER_SIZE as u32)?;
        unsafe {
            let header = &mut *(base as *mut Header);
            header.arrived = AtomicU32::new(0);
            header.generation = AtomicU32::new(0);
            header.n = num_participants;
            header._pad = 0;
        }
        Ok(Barrier { base })
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        Ok(Barrier { base })
    }

    pub fn generation(&self) -> u32 {
        self.header().generation.load(Ordering::Acquire)
    }

    pub fn arrived(&self) -> u32 {
        self.header().arrived.load(Ordering::Acquire)
    }

    /// Block until every participant for this cycle has called `wait`.
    pub fn wait(&self) {
        let header = self.header();
        let my_gen = header.generation.load(Ordering::Acquire);
        let arrived_now = header.arrived.fetch_add(1, Ordering::AcqRel) + 1;

        if arrived_now == header.n {
            header.arrived.store(0, Ordering::Release);
            header.generation.fetch_add(1, Ordering::Release);
            return;
        }

        let mut backoff = Backoff::new();
        while header.generation.load(Ordering::Acquire) == my_gen {
            backoff.snooze();
        }
    }

    /// Same protocol as [`Barrier::wait`], but on timeout this
    /// participant withdraws by decrementing `arrived` and returns
    /// `false`. spec.md §4.11 documents the resulting race: if the
    /// last arrival lands during this withdrawal window, both sides
    /// can observe an inconsistent count. Left as-is per spec.
    pub fn wait_timeout(&self, timeout_ms: u64) -> bool {
        let header = self.header();
        let my_gen = header.generation.load(Ordering::Acquire);
        let arrived_now = header.arrived.fetch_add(1, Ordering::AcqRel) + 1;

        if arrived_now == header.n {
            header.arrived.store(0, Ordering::Release);
            header.generation.fetch_add(1, Ordering::Release);
            return true;
        }

        let passed = spin_wait(deadline(timeout_ms), || {
            header.generation.load(Ordering::Acquire) != my_gen
        });
        if !passed {
            header.arrived.fetch_sub(1, Ordering::AcqRel);
        }
        passed
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
            "/zeroipc_test_barrier_{tag}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, CO::Relaxed)
        )
    }

    #[test]
    fn four_threads_cycle_twice() {
        let name = unique_name("cycle");
        let seg = Arc::new(Segment::create(&name, 1 << 16, 8).unwrap());
        let barrier = Arc::new(Barrier::create_in(&seg, "b", 4).unwrap());

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    barrier.wait();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(barrier.generation(), 2);
        assert_eq!(barrier.arrived(), 0);
        Segment::destroy(&name).unwrap();
    }

    #[test]
    fn timeout_withdraws_when_incomplete() {
        let name = unique_name("timeout");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let barrier = Barrier::create_in(&seg, "b", 2).unwrap();
        assert!(!barrier.wait_timeout(20));
        assert_eq!(barrier.arrived(), 0);
        assert_eq!(barrier.generation(), 0);
        Segment::destroy(&name).unwrap();
    }
}
