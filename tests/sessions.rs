//! Session integration tests.
//!
//! - Host and guest replicas over the in-memory network
//! - Tap resolution, stale taps and session end
//! - Builder validation

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

mod sessions {
    pub mod builder;
    pub mod host_guest;
    pub mod taps;
}
