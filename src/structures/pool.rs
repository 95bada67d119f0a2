//! Object pool with a tagged-index free-list (spec.md §4.9).
//!
//! Free slots form a singly-linked list of indices threaded through the
//! slots themselves (`next_free: u32` ahead of each element), with the
//! list head kept in the header. The bare 32-bit head from the wire
//! table in spec.md §5 is ABA-vulnerable: acquire/release/re-acquire of
//! the same index between another thread's read and CAS lets a stale
//! compare-exchange succeed against a head that only looks unchanged.
//! Per spec.md §4.9/§9 this crate packs a 32-bit generation tag into the
//! high bits of a 64-bit `free_head`, incrementing the tag on every
//! successful pop so a freed-and-reused index can never compare equal
//! to its earlier incarnation.

use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::backoff::Backoff;
use crate::segment::Segment;
use crate::structures::{allocate, lookup};

const SENTINEL: u32 = u32::MAX;

#[repr(C)]
struct Header {
    free_head: AtomicU64,
    capacity: u32,
    allocated: AtomicU32,
}

const HEADER_SIZE: usize = size_of::<Header>();

#[repr(C)]
struct Slot<T> {
    next_free: u32,
    _pad: u32,
    element: T,
}

fn pack(index: u32, tag: u32) -> u64 {
    ((tag as u64) << 32) | index as u64
}

fn unpack(word: u64) -> (u32, u32) {
    (word as u32, (word >> 32) as u32)
}

/// A handle returned by [`Pool::acquire`]. Opaque; pass back to
/// [`Pool::release`] or [`Pool::get`]/[`Pool::set`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(u32);

pub struct Pool<T> {
    base: *mut u8,
    capacity: u32,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Pool<T> {}
unsafe impl<T: Send> Sync for Pool<T> {}

impl<T: Copy> Pool<T> {
    fn slot_stride() -> usize {
        size_of::<Slot<T>>()
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    fn slot(&self, index: u32) -> &Slot<T> {
        unsafe {
            &*(self.base.add(HEADER_SIZE + index as usize * Self::slot_stride()) as *const Slot<T>)
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn slot_mut(&self, index: u32) -> &mut Slot<T> {
        unsafe {
            &mut *(self.base.add(HEADER_SIZE + index as usize * Self::slot_stride())
                as *mut Slot<T>)
        }
    }

    pub fn create_in(segment: &Segment, name: &str, capacity: usize) -> crate::error::Result<Self> {
        let total = HEADER_SIZE + capacity * Self::slot_stride();
        let base = allocate(segment, name, total as u32)?;
        unsafe {
            let header = &mut *(base as *mut Header);
            header.free_head = AtomicU64::new(pack(0, 0));
            header.capacity = capacity as u32;
            header.allocated = AtomicU32::new(0);
        }
        let pool = Pool {
            base,
            capacity: capacity as u32,
            _marker: PhantomData,
        };
        for i in 0..capacity as u32 {
            let next = if i + 1 == capacity as u32 { SENTINEL } else { i + 1 };
            pool.slot_mut(i).next_free = next;
        }
        Ok(pool)
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        let capacity = unsafe { (*(base as *const Header)).capacity };
        Ok(Pool {
            base,
            capacity,
            _marker: PhantomData,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn allocated(&self) -> u32 {
        self.header().allocated.load(Ordering::Acquire)
    }

    /// Claim a free slot. `None` if the pool is exhausted.
    pub fn acquire(&self) -> Option<Handle> {
        let header = self.header();
        loop {
            let word = header.free_head.load(Ordering::Acquire);
            let (index, tag) = unpack(word);
            if index == SENTINEL {
                return None;
            }
            let next = self.slot(index).next_free;
            let new_word = pack(next, tag.wrapping_add(1));
            if header
                .free_head
                .compare_exchange_weak(word, new_word, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                header.allocated.fetch_add(1, Ordering::Relaxed);
                return Some(Handle(index));
            }
        }
    }

    /// Return a handle to the free-list.
    pub fn release(&self, handle: Handle) {
        let header = self.header();
        loop {
            let word = header.free_head.load(Ordering::Acquire);
            let (index, tag) = unpack(word);
            self.slot_mut(handle.0).next_free = index;
            let new_word = pack(handle.0, tag.wrapping_add(1));
            if header
                .free_head
                .compare_exchange_weak(word, new_word, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                header.allocated.fetch_sub(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Blocking variant of [`Pool::acquire`] that backs off instead of
    /// returning `None` on exhaustion.
    pub fn acquire_blocking(&self) -> Handle {
        let mut backoff = Backoff::new();
        loop {
            if let Some(h) = self.acquire() {
                return h;
            }
            backoff.snooze();
        }
    }

    pub fn get(&self, handle: Handle) -> T {
        self.slot(handle.0).element
    }

    pub fn set(&self, handle: Handle, value: T) {
        self.slot_mut(handle.0).element = value;
    }
}
