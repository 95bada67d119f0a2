//! Counting semaphore (spec.md §4.10).

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backoff::Backoff;
use crate::segment::Segment;
use crate::structures::{allocate, lookup};
use crate::sync::{deadline, spin_wait};

#[repr(C)]
struct Header {
    count: AtomicU32,
    waiting: AtomicU32,
    max_count: u32,
    _pad: u32,
}

const HEADER_SIZE: usize = size_of::<Header>();

pub struct Semaphore {
    base: *mut u8,
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    /// `max_count == 0` means unbounded.
    pub fn create_in(
        segment: &Segment,
        name: &str,
        initial_count: u32,
        max_count: u32,
    ) -> crate::error::Result<Self> {
        let base = allocate(segment, name, HEADER_SIZE as u32)?;
        unsafe {
            let header = &mut *(base as *mut Header);
            header.count = AtomicU32::new(initial_count);
            header.waiting = AtomicU32::new(0);
            header.max_count = max_count;
            header._pad = 0;
        }
        Ok(Semaphore { base })
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        Ok(Semaphore { base })
    }

    pub fn count(&self) -> u32 {
        self.header().count.load(Ordering::Acquire)
    }

    pub fn waiting(&self) -> u32 {
        self.header().waiting.load(Ordering::Relaxed)
    }

    pub fn try_acquire(&self) -> bool {
        let header = self.header();
        loop {
            let c = header.count.load(Ordering::Acquire);
            if c == 0 {
                return false;
            }
            if header
                .count
                .compare_exchange_weak(c, c - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn acquire(&self) {
        let header = self.header();
        header.waiting.fetch_add(1, Ordering::Relaxed);
        let mut backoff = Backoff::new();
        loop {
            if self.try_acquire() {
                break;
            }
            backoff.snooze();
        }
        header.waiting.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns `false` on timeout rather than acquiring.
    pub fn acquire_timeout(&self, timeout_ms: u64) -> bool {
        let header = self.header();
        header.waiting.fetch_add(1, Ordering::Relaxed);
        let ok = spin_wait(deadline(timeout_ms), || self.try_acquire());
        header.waiting.fetch_sub(1, Ordering::Relaxed);
        ok
    }

    /// Increment `count`, clamped at `max_count` when it is nonzero.
    pub fn release(&self) {
        let header = self.header();
        loop {
            let c = header.count.load(Ordering::Relaxed);
            let max = header.max_count;
            if max > 0 && c >= max {
                return;
            }
            if header
                .count
                .compare_exchange_weak(c, c + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }
}
