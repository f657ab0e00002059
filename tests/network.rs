//! Network integration tests.
//!
//! - Replica convergence and safety through ChaosTransport (duplication, delay, loss)
//! - Host and guest over real UDP sockets on loopback

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

mod network {
    pub mod resilience;
    pub mod udp;
}
