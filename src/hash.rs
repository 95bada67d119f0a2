//! FNV-1a, the wire-contract hash for the map and set structures.
//!
//! Deterministic and language-neutral: every participant on a segment
//! must use the same hash, so this is specified rather than left to
//! `std::hash::Hash` (whose output is not guaranteed stable across
//! compilations, let alone across languages).

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Hash a byte slice with FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(fnv1a(&[]), FNV_OFFSET_BASIS);
    }

    #[test]
    fn deterministic() {
        assert_eq!(fnv1a(b"hello"), fnv1a(b"hello"));
        assert_ne!(fnv1a(b"hello"), fnv1a(b"hellp"));
    }
}
