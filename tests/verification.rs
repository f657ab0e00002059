//! Verification integration tests.
//!
//! - Property tests: board and counter invariants under random schedules and random
//!   inbound traffic, decoder robustness
//! - Determinism tests: seeded schedules replay identically

mod verification {
    pub mod determinism;
    pub mod property;
}
