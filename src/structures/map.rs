//! Open-addressed hash map with linear probing (spec.md §4.7).
//!
//! Bucket states and the probe-then-memcmp lookup pattern are grounded
//! in the teacher's `src/shm/hashtable.rs`. The teacher reclaims
//! removed slots with backward-shift deletion; this spec requires
//! tombstones that are never reclaimed (§4.7's invariant: "persistent
//! high churn eventually fills the table"), so buckets carry an
//! explicit `EMPTY`/`OCCUPIED`/`TOMBSTONE` state instead.
//!
//! `size` increments on every successful CAS into `OCCUPIED`, whether
//! the prior state was `EMPTY` or `TOMBSTONE` — scenario S6 (spec.md
//! §8) requires re-inserting an erased key to bring `size` back up, so
//! a tombstone-slot reuse must count as a new live entry. See
//! DESIGN.md for the full note on this reconciliation.

use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::hash::fnv1a;
use crate::segment::Segment;
use crate::structures::{allocate, lookup};

const EMPTY: u8 = 0;
const OCCUPIED: u8 = 1;
const TOMBSTONE: u8 = 2;

#[repr(C)]
struct Header {
    bucket_count: u64,
    size: AtomicU64,
}

const HEADER_SIZE: usize = size_of::<Header>();

#[repr(C)]
struct Bucket<K, V> {
    state: AtomicU8,
    _pad: [u8; 7],
    key: K,
    value: V,
}

/// A key type usable in [`Map`]/[`Set`]: copyable, comparable, and
/// reducible to the byte representation the wire-contract hash runs
/// over.
pub trait WireKey: Copy + PartialEq {
    fn hash_bytes(&self) -> Vec<u8>;
}

macro_rules! impl_wire_key_for_int {
    ($($t:ty),*) => {
        $(impl WireKey for $t {
            fn hash_bytes(&self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }
        })*
    };
}
impl_wire_key_for_int!(u8, u16, u32, u64, i8, i16, i32, i64);

fn key_hash<K: WireKey>(key: &K) -> u64 {
    fnv1a(&key.hash_bytes())
}

pub struct Map<K, V> {
    base: *mut u8,
    bucket_count: u64,
    _marker: PhantomData<(K, V)>,
}

unsafe impl<K: Send, V: Send> Send for Map<K, V> {}
unsafe impl<K: Send, V: Send> Sync for Map<K, V> {}

impl<K: WireKey, V: Copy> Map<K, V> {
    fn bucket_stride() -> usize {
        size_of::<Bucket<K, V>>()
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    fn bucket(&self, index: u64) -> &Bucket<K, V> {
        unsafe {
            &*(self
                .base
                .add(HEADER_SIZE + index as usize * Self::bucket_stride())
                as *const Bucket<K, V>)
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn bucket_mut(&self, index: u64) -> &mut Bucket<K, V> {
        unsafe {
            &mut *(self
                .base
                .add(HEADER_SIZE + index as usize * Self::bucket_stride())
                as *mut Bucket<K, V>)
        }
    }

    /// Create a map with `bucket_count` buckets. The caller is
    /// responsible for sizing `bucket_count` to keep load factor low;
    /// spec.md §4.7 notes the table is never rehashed.
    pub fn create_in(
        segment: &Segment,
        name: &str,
        bucket_count: usize,
    ) -> crate::error::Result<Self> {
        let total = HEADER_SIZE + bucket_count * Self::bucket_stride();
        let base = allocate(segment, name, total as u32)?;
        unsafe {
            let header = &mut *(base as *mut Header);
            header.bucket_count = bucket_count as u64;
            header.size = AtomicU64::new(0);
        }
        let map = Map {
            base,
            bucket_count: bucket_count as u64,
            _marker: PhantomData,
        };
        for i in 0..bucket_count as u64 {
            map.bucket(i).state.store(EMPTY, Ordering::Relaxed);
        }
        Ok(map)
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        let bucket_count = unsafe { (*(base as *const Header)).bucket_count };
        Ok(Map {
            base,
            bucket_count,
            _marker: PhantomData,
        })
    }

    pub fn size(&self) -> u64 {
        self.header().size.load(Ordering::Acquire)
    }

    pub fn bucket_count(&self) -> u64 {
        self.bucket_count
    }

    /// Insert or update `key` -> `value`. Returns `false` only if the
    /// table is full (every bucket probed without finding a home).
    pub fn insert(&self, key: K, value: V) -> bool {
        let hash = key_hash(&key);
        let mut idx = hash % self.bucket_count;

        for _ in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            let state = bucket.state.load(Ordering::Acquire);

            if state == OCCUPIED && bucket.key == key {
                self.bucket_mut(idx).value = value;
                return true;
            }

            if state == EMPTY || state == TOMBSTONE {
                if bucket
                    .state
                    .compare_exchange(state, OCCUPIED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let b = self.bucket_mut(idx);
                    b.key = key;
                    b.value = value;
                    self.header().size.fetch_add(1, Ordering::AcqRel);
                    return true;
                }
                // lost the CAS race; re-probe the same bucket's new state
                continue;
            }

            idx = (idx + 1) % self.bucket_count;
        }
        false // table full
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let hash = key_hash(key);
        let mut idx = hash % self.bucket_count;

        for _ in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            match bucket.state.load(Ordering::Acquire) {
                EMPTY => return None,
                OCCUPIED if bucket.key == *key => return Some(bucket.value),
                _ => {}
            }
            idx = (idx + 1) % self.bucket_count;
        }
        None
    }

    pub fn erase(&self, key: &K) -> bool {
        let hash = key_hash(key);
        let mut idx = hash % self.bucket_count;

        for _ in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            match bucket.state.load(Ordering::Acquire) {
                EMPTY => return false,
                OCCUPIED if bucket.key == *key => {
                    if bucket
                        .state
                        .compare_exchange(
                            OCCUPIED,
                            TOMBSTONE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.header().size.fetch_sub(1, Ordering::AcqRel);
                        return true;
                    }
                    return false;
                }
                _ => {}
            }
            idx = (idx + 1) % self.bucket_count;
        }
        false
    }
}
