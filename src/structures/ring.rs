//! SPSC ring buffer (spec.md §4.6): same header shape as the MPMC
//! queue, but only ever written by one producer / read by one consumer,
//! so plain acquire/release loads and stores replace the queue's CAS.
//!
//! Grounded directly in
//! `examples/other_examples/43560dc1_DieHard073055-PerpSignalHFT__src-ipc-shm_queue.rs.rs`,
//! whose `push`/`pop` use exactly this relaxed-own-index /
//! acquire-other-index / release-publish protocol over a raw mmap.
//!
//! Instantiating with `T = u8` gives the byte-ring streaming mode the
//! spec mentions — no special-casing needed since byte is just another
//! `Copy` element type.

use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::segment::Segment;
use crate::structures::{allocate, lookup};

#[repr(C)]
struct Header {
    write_pos: AtomicU64,
    read_pos: AtomicU64,
    capacity: u64,
}

const HEADER_SIZE: usize = size_of::<Header>();

pub struct Ring<T> {
    base: *mut u8,
    capacity: u64,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T: Copy> Ring<T> {
    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    fn payload(&self) -> *mut T {
        unsafe { self.base.add(HEADER_SIZE) as *mut T }
    }

    pub fn create_in(segment: &Segment, name: &str, capacity: usize) -> crate::error::Result<Self> {
        assert!(capacity >= 2, "ring capacity must be at least 2");
        let total = HEADER_SIZE + capacity * size_of::<T>();
        let base = allocate(segment, name, total as u32)?;
        unsafe {
            let header = &mut *(base as *mut Header);
            header.write_pos = AtomicU64::new(0);
            header.read_pos = AtomicU64::new(0);
            header.capacity = capacity as u64;
        }
        Ok(Ring {
            base,
            capacity: capacity as u64,
            _marker: PhantomData,
        })
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        let capacity = unsafe { (*(base as *const Header)).capacity };
        Ok(Ring {
            base,
            capacity,
            _marker: PhantomData,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Producer-only: write one element. Returns `false` if full.
    pub fn write(&self, value: T) -> bool {
        let header = self.header();
        let write_pos = header.write_pos.load(Ordering::Relaxed);
        let read_pos = header.read_pos.load(Ordering::Acquire);
        let next = (write_pos + 1) % self.capacity;
        if next == read_pos {
            return false; // full
        }
        unsafe {
            *self.payload().add(write_pos as usize) = value;
        }
        header.write_pos.store(next, Ordering::Release);
        true
    }

    /// Consumer-only: read one element. Returns `None` if empty.
    pub fn read(&self) -> Option<T> {
        let header = self.header();
        let read_pos = header.read_pos.load(Ordering::Relaxed);
        let write_pos = header.write_pos.load(Ordering::Acquire);
        if read_pos == write_pos {
            return None; // empty
        }
        let value = unsafe { *self.payload().add(read_pos as usize) };
        let next = (read_pos + 1) % self.capacity;
        header.read_pos.store(next, Ordering::Release);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn unique_name(tag: &str) -> String {
        use std::sync::atomic::{AtomicU64 as Counter, Ordering};
        static COUNTER: Counter = Counter::new(0);
        format!(
            "/zeroipc_test_ring_{tag}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn spsc_preserves_order() {
        let name = unique_name("order");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let r = Ring::<i32>::create_in(&seg, "r", 4).unwrap();
        assert!(r.write(1));
        assert!(r.write(2));
        assert!(r.write(3));
        assert!(!r.write(4)); // one slot reserved
        assert_eq!(r.read(), Some(1));
        assert_eq!(r.read(), Some(2));
        assert_eq!(r.read(), Some(3));
        assert_eq!(r.read(), None);
        Segment::destroy(&name).unwrap();
    }

    #[test]
    fn byte_ring_streaming() {
        let name = unique_name("bytes");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let r = Ring::<u8>::create_in(&seg, "r", 16).unwrap();
        for b in b"hello" {
            assert!(r.write(*b));
        }
        let mut out = Vec::new();
        while let Some(b) = r.read() {
            out.push(b);
        }
        assert_eq!(out, b"hello");
        Segment::destroy(&name).unwrap();
    }

    #[test]
    fn spsc_across_threads() {
        let name = unique_name("threads");
        let seg = Arc::new(Segment::create(&name, 1 << 16, 8).unwrap());
        let r = Arc::new(Ring::<i32>::create_in(&seg, "r", 64).unwrap());

        let writer = {
            let r = Arc::clone(&r);
            thread::spawn(move || {
                for i in 0..1000 {
                    while !r.write(i) {
                        thread::yield_now();
                    }
                }
            })
        };
        let reader = {
            let r = Arc::clone(&r);
            thread::spawn(move || {
                let mut got = Vec::new();
                while got.len() < 1000 {
                    if let Some(v) = r.read() {
                        got.push(v);
                    } else {
                        thread::yield_now();
                    }
                }
                got
            })
        };
        writer.join().unwrap();
        let got = reader.join().unwrap();
        assert_eq!(got, (0..1000).collect::<Vec<_>>());
        Segment::destroy(&name).unwrap();
    }
}
