//! Lock-free MPMC bounded ring queue (spec.md §4.4).
//!
//! Two atomic indices, `head` (next slot to read) and `tail` (next slot
//! to write), both taken modulo `capacity`. One slot is always reserved
//! so `head == tail` is unambiguously "empty". Grounded in the
//! acquire/release index protocol of
//! `examples/other_examples/2fb40d95_debasishg-ringmpsc-rs__crates-ringmpsc-src-ring.rs.rs`,
//! generalized from SPSC to MPMC via CAS on both indices per spec.

use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::{fence, AtomicU64, Ordering};

use crate::segment::Segment;
use crate::structures::{allocate, lookup};

#[repr(C)]
struct Header {
    head: AtomicU64,
    tail: AtomicU64,
    capacity: u64,
}

const HEADER_SIZE: usize = size_of::<Header>();

pub struct Queue<T> {
    base: *mut u8,
    capacity: u64,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T: Copy> Queue<T> {
    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    fn payload(&self) -> *mut T {
        unsafe { self.base.add(HEADER_SIZE) as *mut T }
    }

    /// Create a queue of `capacity` slots (must be >= 2: one slot is
    /// always reserved to distinguish empty from full).
    pub fn create_in(segment: &Segment, name: &str, capacity: usize) -> crate::error::Result<Self> {
        assert!(capacity >= 2, "queue capacity must be at least 2");
        let total = HEADER_SIZE + capacity * size_of::<T>();
        let base = allocate(segment, name, total as u32)?;
        unsafe {
            let header = &mut *(base as *mut Header);
            header.head = AtomicU64::new(0);
            header.tail = AtomicU64::new(0);
            header.capacity = capacity as u64;
        }
        Ok(Queue {
            base,
            capacity: capacity as u64,
            _marker: PhantomData,
        })
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        let capacity = unsafe { (*(base as *const Header)).capacity };
        Ok(Queue {
            base,
            capacity,
            _marker: PhantomData,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Attempt to enqueue `value`. Returns `false` if the queue is full.
    pub fn enqueue(&self, value: T) -> bool {
        let header = self.header();
        loop {
            let tail = header.tail.load(Ordering::Relaxed);
            let next = (tail + 1) % self.capacity;
            if next == header.head.load(Ordering::Acquire) {
                return false; // full
            }
            if header
                .tail
                .compare_exchange_weak(tail, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                unsafe {
                    *self.payload().add(tail as usize) = value;
                }
                fence(Ordering::Release);
                return true;
            }
        }
    }

    /// Attempt to dequeue a value. Returns `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        let header = self.header();
        loop {
            let head = header.head.load(Ordering::Relaxed);
            if head == header.tail.load(Ordering::Acquire) {
                return None; // empty
            }
            let next = (head + 1) % self.capacity;
            if header
                .head
                .compare_exchange_weak(head, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                fence(Ordering::Acquire);
                let value = unsafe { *self.payload().add(head as usize) };
                return Some(value);
            }
        }
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
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("/zeroipc_test_queue_{tag}_{}_{}", std::process::id(), n)
    }

    #[test]
    fn single_threaded_is_fifo() {
        let name = unique_name("fifo");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let q = Queue::<i64>::create_in(&seg, "q", 8).unwrap();
        for i in 0..5 {
            assert!(q.enqueue(i));
        }
        for i in 0..5 {
            assert_eq!(q.dequeue(), Some(i));
        }
        assert_eq!(q.dequeue(), None);
        Segment::destroy(&name).unwrap();
    }

    #[test]
    fn full_queue_rejects_enqueue() {
        let name = unique_name("full");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let q = Queue::<i64>::create_in(&seg, "q", 4).unwrap();
        assert!(q.enqueue(1));
        assert!(q.enqueue(2));
        assert!(q.enqueue(3));
        assert!(!q.enqueue(4)); // one slot always reserved
        assert_eq!(q.dequeue(), Some(1));
        assert!(q.enqueue(4));
    }

    #[test]
    fn mpmc_preserves_multiset_under_contention() {
        let name = unique_name("mpmc");
        let seg = Arc::new(Segment::create(&name, 1 << 20, 8).unwrap());
        let q = Arc::new(Queue::<i64>::create_in(&seg, "q", 1024).unwrap());

        let producers: Vec<_> = (0..2)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let base = p * 10_000;
                    for i in 0..10_000i64 {
                        loop {
                            if q.enqueue(base + i) {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while got.len() < 10_000 {
                        if let Some(v) = q.dequeue() {
                            got.push(v);
                        } else {
                            thread::yield_now();
                        }
                    }
                    got
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        let mut all: Vec<i64> = Vec::new();
        for c in consumers {
            all.extend(c.join().unwrap());
        }
        all.sort_unstable();
        let expected: Vec<i64> = (0..20_000).collect();
        assert_eq!(all, expected);
        assert_eq!(q.dequeue(), None);
        Segment::destroy(&name).unwrap();
    }
}
