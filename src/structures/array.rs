//! A contiguous, fixed-capacity typed region (spec.md §4.3).
//!
//! Element type `T` is a contract between creator and opener — the
//! table only ever stores the total byte size. Concurrent reads/writes
//! are race-free only for atomic element types; mixed concurrent access
//! to non-atomic elements is the caller's contract to uphold, per spec.

use std::marker::PhantomData;
use std::mem::size_of;

use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::structures::{allocate, lookup};

const HEADER_SIZE: usize = 8; // capacity: u64

/// Non-owning view over an `Array<T>` region inside a segment.
///
/// # Safety contract
/// The segment this view was created from, or any segment mapping the
/// same shared-memory object, must outlive this view.
pub struct Array<T> {
    base: *mut u8,
    capacity: u64,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Array<T> {}
unsafe impl<T: Sync> Sync for Array<T> {}

impl<T: Copy> Array<T> {
    fn header_capacity(base: *mut u8) -> u64 {
        unsafe { *(base as *const u64) }
    }

    fn set_header_capacity(base: *mut u8, capacity: u64) {
        unsafe { *(base as *mut u64) = capacity };
    }

    fn payload(&self) -> *mut T {
        unsafe { self.base.add(HEADER_SIZE) as *mut T }
    }

    /// Create a new array of `capacity` elements named `name` in `segment`.
    pub fn create_in(segment: &Segment, name: &str, capacity: usize) -> Result<Self> {
        let total = HEADER_SIZE + capacity * size_of::<T>();
        let base = allocate(segment, name, total as u32)?;
        Self::set_header_capacity(base, capacity as u64);
        Ok(Array {
            base,
            capacity: capacity as u64,
            _marker: PhantomData,
        })
    }

    /// Open an existing array named `name` in `segment`.
    pub fn open_in(segment: &Segment, name: &str) -> Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        let capacity = Self::header_capacity(base);
        Ok(Array {
            base,
            capacity,
            _marker: PhantomData,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn get(&self, index: usize) -> Result<T> {
        if index as u64 >= self.capacity {
            return Err(Error::OutOfBounds {
                index: index as u64,
                capacity: self.capacity,
            });
        }
        Ok(unsafe { *self.payload().add(index) })
    }

    pub fn set(&self, index: usize, value: T) -> Result<()> {
        if index as u64 >= self.capacity {
            return Err(Error::OutOfBounds {
                index: index as u64,
                capacity: self.capacity,
            });
        }
        unsafe { *self.payload().add(index) = value };
        Ok(())
    }

    /// Raw pointer to the payload plus its capacity, for bulk access.
    pub fn as_raw(&self) -> (*mut T, usize) {
        (self.payload(), self.capacity())
    }
}
