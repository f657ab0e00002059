//! Common test infrastructure shared across integration tests.
//!
//! - `test_utils`: session constructors, a recording render sink, polling helpers and a
//!   reach-limited transport
//!
//! # Usage
//!
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::{forced_host, guest, RecordingSink, SinkCall};
//! ```

pub mod test_utils;

#[allow(unused_imports)]
pub use test_utils::{
    forced_host, guest, init_tracing, ms, poll_all, slot, spawned_slots, RecordingSink, SinkCall,
    StarLink, MAX_POLL_ROUNDS,
};

#[allow(unused_imports)]
pub use test_utils::poll_with_sleep;
