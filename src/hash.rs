//! Deterministic hashing for session snapshots.
//!
//! [`SessionSnapshot`](crate::SessionSnapshot) checksums let a replay or a second run of
//! the same replica be checked against the first. `std`'s `DefaultHasher` is randomly
//! seeded per process, so two runs would disagree on identical state; FNV-1a with fixed
//! constants does not.
//!
//! Snapshots of different peers do not share a checksum even when they agree: spawn
//! times and retire reasons are local to each peer.
//!
//! ```
//! use whack_sync::hash::{fnv1a_hash, DeterministicHasher};
//! use std::hash::{Hash, Hasher};
//!
//! let mut hasher = DeterministicHasher::new();
//! (3u32, "slot").hash(&mut hasher);
//! assert_eq!(hasher.finish(), fnv1a_hash(&(3u32, "slot")));
//! ```
//!
//! FNV-1a is not cryptographically secure.

use std::hash::{Hash, Hasher};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// A [`Hasher`] implementing 64-bit FNV-1a.
#[derive(Debug, Clone)]
pub struct DeterministicHasher {
    state: u64,
}

impl DeterministicHasher {
    /// Creates a hasher at the FNV-1a offset basis.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Default for DeterministicHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for DeterministicHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Hashes `value` with a fresh [`DeterministicHasher`].
#[inline]
pub fn fnv1a_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DeterministicHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_hash_equal() {
        assert_eq!(fnv1a_hash(&42u32), fnv1a_hash(&42u32));
        assert_ne!(fnv1a_hash(&42u32), fnv1a_hash(&43u32));
    }

    #[test]
    fn order_matters_for_slices() {
        assert_ne!(fnv1a_hash(&[1u8, 2][..]), fnv1a_hash(&[2u8, 1][..]));
    }

    #[test]
    fn empty_hasher_is_offset_basis() {
        assert_eq!(DeterministicHasher::new().finish(), FNV_OFFSET_BASIS);
    }

    #[test]
    fn known_fnv1a_vectors() {
        let mut hasher = DeterministicHasher::new();
        hasher.write(b"a");
        assert_eq!(hasher.finish(), 0xaf63_dc4c_8601_ec8c);

        let mut hasher = DeterministicHasher::new();
        hasher.write(b"foobar");
        assert_eq!(hasher.finish(), 0x8594_4171_f739_67e8);
    }
}
