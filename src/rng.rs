//! Seedable PCG32 random number generator used for spawn scheduling.
//!
//! Spawn times, slot choices, and randomized backoff all draw from a single
//! [`Pcg32`] owned by the scheduler. Seeding it with [`SeedableRng::seed_from_u64`]
//! makes a whole session reproducible; [`SeedableRng::from_entropy`] is used otherwise.
//!
//! Not cryptographically secure.
//!
//! ```rust
//! use whack_sync::rng::{Pcg32, Rng, SeedableRng};
//!
//! let mut rng = Pcg32::seed_from_u64(12345);
//! let millis = rng.gen_range_u64_inclusive(0..=30_000);
//! assert!(millis <= 30_000);
//! ```

use crate::{
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
};

/// PCG-XSH-RR with 64 bits of state and 32-bit output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

const PCG_DEFAULT_STREAM: u64 = 1442695040888963407;
const PCG_MULTIPLIER: u64 = 6364136223846793005;

impl Pcg32 {
    /// Creates a generator from an initial state and a stream selector.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        let inc = (stream << 1) | 1;
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Generates the next 32-bit value.
    #[inline]
    #[must_use]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generates the next 64-bit value from two 32-bit draws.
    #[inline]
    #[must_use]
    pub fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }
}

/// Construction of generators from seeds.
pub trait SeedableRng: Sized {
    /// Deterministic construction from a 64-bit seed.
    #[must_use]
    fn seed_from_u64(seed: u64) -> Self;

    /// Construction from timing and thread identity. Differs between runs.
    #[must_use]
    fn from_entropy() -> Self;
}

impl SeedableRng for Pcg32 {
    fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_STREAM)
    }

    fn from_entropy() -> Self {
        Self::seed_from_u64(entropy_seed())
    }
}

/// Uniform draws over the ranges the scheduler needs.
pub trait Rng {
    /// Returns the next 32-bit value.
    fn next_u32(&mut self) -> u32;

    /// Returns the next 64-bit value.
    fn next_u64(&mut self) -> u64;

    /// Uniform `u64` in `[start, end]`.
    ///
    /// If `start > end`, reports a violation and returns `start`.
    fn gen_range_u64_inclusive(&mut self, range: std::ops::RangeInclusive<u64>) -> u64 {
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "gen_range_u64_inclusive called with invalid range [{}..={}]",
                start,
                end
            );
            return start;
        }
        let span = (end - start).wrapping_add(1);
        if span == 0 {
            return self.next_u64();
        }
        // Rejection sampling keeps the draw unbiased.
        let threshold = span.wrapping_neg() % span;
        loop {
            let value = self.next_u64();
            if value >= threshold {
                return start + value % span;
            }
        }
    }

    /// Uniform `usize` in `[start, end)`.
    ///
    /// If the range is empty, reports a violation and returns `start`.
    fn gen_range_usize(&mut self, range: std::ops::Range<usize>) -> usize {
        if range.is_empty() {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "gen_range_usize called with empty range [{}..{})",
                range.start,
                range.end
            );
            return range.start;
        }
        let last = (range.end - 1) as u64;
        self.gen_range_u64_inclusive(range.start as u64..=last) as usize
    }

    /// Uniform `f64` in `[0.0, 1.0)`.
    fn gen_f64(&mut self) -> f64 {
        let value = self.next_u64() >> 11;
        value as f64 / (1u64 << 53) as f64
    }

    /// `true` with the given probability, clamped to `[0.0, 1.0]`.
    fn gen_bool(&mut self, probability: f64) -> bool {
        let p = probability.clamp(0.0, 1.0);
        self.gen_f64() < p
    }
}

impl Rng for Pcg32 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        Self::next_u32(self)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        Self::next_u64(self)
    }
}

/// A non-reproducible 64-bit value, used for session nonces.
#[must_use]
pub fn entropy_u64() -> u64 {
    Pcg32::from_entropy().next_u64()
}

fn entropy_seed() -> u64 {
    use crate::hash::DeterministicHasher;
    use std::hash::{Hash, Hasher};
    use web_time::{Instant, SystemTime, UNIX_EPOCH};

    let mut hasher = DeterministicHasher::new();
    std::thread::current().id().hash(&mut hasher);
    if let Ok(since_epoch) = SystemTime::now().duration_since(UNIX_EPOCH) {
        since_epoch.as_nanos().hash(&mut hasher);
    }
    Instant::now().elapsed().as_nanos().hash(&mut hasher);
    hasher.finish().wrapping_add(0x9e3779b97f4a7c15)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Pcg32::seed_from_u64(12345);
        let mut b = Pcg32::seed_from_u64(12345);
        for _ in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Pcg32::seed_from_u64(1);
        let mut b = Pcg32::seed_from_u64(2);
        let same = (0..100).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 5);
    }

    #[test]
    fn gen_range_u64_stays_in_bounds() {
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..10_000 {
            let v = rng.gen_range_u64_inclusive(0..=30_000);
            assert!(v <= 30_000);
        }
    }

    #[test]
    fn gen_range_u64_hits_both_ends_of_small_range() {
        let mut rng = Pcg32::seed_from_u64(99);
        let mut seen = [false; 3];
        for _ in 0..1000 {
            seen[rng.gen_range_u64_inclusive(10..=12) as usize - 10] = true;
        }
        assert_eq!(seen, [true, true, true]);
    }

    #[test]
    fn gen_range_u64_single_value() {
        let mut rng = Pcg32::seed_from_u64(3);
        assert_eq!(rng.gen_range_u64_inclusive(5..=5), 5);
    }

    #[test]
    fn gen_range_u64_full_range_does_not_panic() {
        let mut rng = Pcg32::seed_from_u64(3);
        let _ = rng.gen_range_u64_inclusive(0..=u64::MAX);
    }

    #[test]
    fn gen_range_usize_excludes_end() {
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..10_000 {
            let v = rng.gen_range_usize(1..16);
            assert!((1..16).contains(&v));
        }
    }

    #[test]
    fn gen_range_usize_empty_returns_start() {
        let mut rng = Pcg32::seed_from_u64(11);
        assert_eq!(rng.gen_range_usize(4..4), 4);
    }

    #[test]
    fn gen_f64_in_unit_interval() {
        let mut rng = Pcg32::seed_from_u64(5);
        for _ in 0..10_000 {
            let v = rng.gen_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn gen_bool_extremes() {
        let mut rng = Pcg32::seed_from_u64(5);
        assert!((0..100).all(|_| !rng.gen_bool(0.0)));
        assert!((0..100).all(|_| rng.gen_bool(1.0)));
    }
}
