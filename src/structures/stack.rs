//! Lock-free LIFO stack with a single atomic index (spec.md §4.5,
//! Treiber-style but over an index rather than a linked list, since no
//! native pointers may appear on the wire — spec.md §9).

use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::{fence, AtomicU64, Ordering};

use crate::segment::Segment;
use crate::structures::{allocate, lookup};

#[repr(C)]
struct Header {
    top: AtomicU64,
    capacity: u64,
}

const HEADER_SIZE: usize = size_of::<Header>();

pub struct Stack<T> {
    base: *mut u8,
    capacity: u64,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Stack<T> {}
unsafe impl<T: Send> Sync for Stack<T> {}

impl<T: Copy> Stack<T> {
    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    fn payload(&self) -> *mut T {
        unsafe { self.base.add(HEADER_SIZE) as *mut T }
    }

    pub fn create_in(segment: &Segment, name: &str, capacity: usize) -> crate::error::Result<Self> {
        let total = HEADER_SIZE + capacity * size_of::<T>();
        let base = allocate(segment, name, total as u32)?;
        unsafe {
            let header = &mut *(base as *mut Header);
            header.top = AtomicU64::new(0);
            header.capacity = capacity as u64;
        }
        Ok(Stack {
            base,
            capacity: capacity as u64,
            _marker: PhantomData,
        })
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        let capacity = unsafe { (*(base as *const Header)).capacity };
        Ok(Stack {
            base,
            capacity,
            _marker: PhantomData,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn push(&self, value: T) -> bool {
        let header = self.header();
        loop {
            let top = header.top.load(Ordering::Relaxed);
            if top >= self.capacity {
                return false;
            }
            if header
                .top
                .compare_exchange_weak(top, top + 1, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                unsafe {
                    *self.payload().add(top as usize) = value;
                }
                fence(Ordering::Release);
                return true;
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        let header = self.header();
        loop {
            let top = header.top.load(Ordering::Acquire);
            if top == 0 {
                return None;
            }
            if header
                .top
                .compare_exchange_weak(top, top - 1, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                let value = unsafe { *self.payload().add((top - 1) as usize) };
                return Some(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        use std::sync::atomic::{AtomicU64 as Counter, Ordering};
        static COUNTER: Counter = Counter::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("/zeroipc_test_stack_{tag}_{}_{}", std::process::id(), n)
    }

    #[test]
    fn single_threaded_is_lifo() {
        let name = unique_name("lifo");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let s = Stack::<i32>::create_in(&seg, "s", 8).unwrap();
        for i in 0..5 {
            assert!(s.push(i));
        }
        for i in (0..5).rev() {
            assert_eq!(s.pop(), Some(i));
        }
        assert_eq!(s.pop(), None);
        Segment::destroy(&name).unwrap();
    }

    #[test]
    fn full_stack_rejects_push() {
        let name = unique_name("full");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let s = Stack::<i32>::create_in(&seg, "s", 2).unwrap();
        assert!(s.push(1));
        assert!(s.push(2));
        assert!(!s.push(3));
        Segment::destroy(&name).unwrap();
    }
}
