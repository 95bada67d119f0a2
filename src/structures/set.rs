//! Hash set (spec.md §4.8): identical to [`crate::structures::map::Map`]
//! minus the value field, same probing/ordering rules.

use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::hash::fnv1a;
use crate::segment::Segment;
use crate::structures::map::WireKey;
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
struct Bucket<K> {
    state: AtomicU8,
    _pad: [u8; 7],
    key: K,
}

fn key_hash<K: WireKey>(key: &K) -> u64 {
    fnv1a(&key.hash_bytes())
}

pub struct Set<K> {
    base: *mut u8,
    bucket_count: u64,
    _marker: PhantomData<K>,
}

unsafe impl<K: Send> Send for Set<K> {}
unsafe impl<K: Send> Sync for Set<K> {}

impl<K: WireKey> Set<K> {
    fn bucket_stride() -> usize {
        size_of::<Bucket<K>>()
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.base as *const Header) }
    }

    fn bucket(&self, index: u64) -> &Bucket<K> {
        unsafe {
            &*(self
                .base
                .add(HEADER_SIZE + index as usize * Self::bucket_stride())
                as *const Bucket<K>)
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn bucket_mut(&self, index: u64) -> &mut Bucket<K> {
        unsafe {
            &mut *(self
                .base
                .add(HEADER_SIZE + index as usize * Self::bucket_stride())
                as *mut Bucket<K>)
        }
    }

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
        let set = Set {
            base,
            bucket_count: bucket_count as u64,
            _marker: PhantomData,
        };
        for i in 0..bucket_count as u64 {
            set.bucket(i).state.store(EMPTY, Ordering::Relaxed);
        }
        Ok(set)
    }

    pub fn open_in(segment: &Segment, name: &str) -> crate::error::Result<Self> {
        let (base, _size) = lookup(segment, name)?;
        let bucket_count = unsafe { (*(base as *const Header)).bucket_count };
        Ok(Set {
            base,
            bucket_count,
            _marker: PhantomData,
        })
    }

    pub fn size(&self) -> u64 {
        self.header().size.load(Ordering::Acquire)
    }

    pub fn contains(&self, key: &K) -> bool {
        let hash = key_hash(key);
        let mut idx = hash % self.bucket_count;
        for _ in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            match bucket.state.load(Ordering::Acquire) {
                EMPTY => return false,
                OCCUPIED if bucket.key == *key => return true,
                _ => {}
            }
            idx = (idx + 1) % self.bucket_count;
        }
        false
    }

    pub fn insert(&self, key: K) -> bool {
        let hash = key_hash(&key);
        let mut idx = hash % self.bucket_count;

        for _ in 0..self.bucket_count {
            let bucket = self.bucket(idx);
            let state = bucket.state.load(Ordering::Acquire);

            if state == OCCUPIED && bucket.key == key {
                return true; // already present
            }

            if state == EMPTY || state == TOMBSTONE {
                if bucket
                    .state
                    .compare_exchange(state, OCCUPIED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.bucket_mut(idx).key = key;
                    self.header().size.fetch_add(1, Ordering::AcqRel);
                    return true;
                }
                continue;
            }

            idx = (idx + 1) % self.bucket_count;
        }
        false
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

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        use std::sync::atomic::{AtomicU64 as Counter, Ordering};
        static COUNTER: Counter = Counter::new(0);
        format!(
            "/zeroipc_test_set_{tag}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn insert_contains_erase() {
        let name = unique_name("basic");
        let seg = Segment::create(&name, 1 << 16, 8).unwrap();
        let s = Set::<u64>::create_in(&seg, "s", 64).unwrap();
        for i in 0..20u64 {
            assert!(s.insert(i));
        }
        assert_eq!(s.size(), 20);
        for i in 0..20u64 {
            assert!(s.contains(&i));
        }
        for i in (0..20u64).step_by(2) {
            assert!(s.erase(&i));
        }
        assert_eq!(s.size(), 10);
        for i in 0..20u64 {
            assert_eq!(s.contains(&i), i % 2 == 1);
        }
        Segment::destroy(&name).unwrap();
    }
}
