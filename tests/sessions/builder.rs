//! Builder validation and defaults seen from outside the crate.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use whack_sync::{
    BackoffPolicy, BoardConfig, ExpiryPolicy, MemoryNetwork, ProtocolConfig, Role,
    ScheduleConfig, SessionBuilder, WhackError,
};
use web_time::Duration;

fn start(builder: SessionBuilder<u8>) -> Result<(), WhackError> {
    let network = MemoryNetwork::new();
    builder.start_session(network.endpoint(0)).map(|_| ())
}

#[test]
fn presets_start() {
    for config in [
        ScheduleConfig::classic(),
        ScheduleConfig::quick(),
        ScheduleConfig::deterministic(9),
    ] {
        start(SessionBuilder::new().with_schedule_config(config)).unwrap();
    }
    start(SessionBuilder::new().with_role(Role::Guest)).unwrap();
}

#[test]
fn invalid_backoff_is_rejected() {
    let err = start(SessionBuilder::new().with_schedule_config(ScheduleConfig {
        backoff: BackoffPolicy::Randomized {
            min: Duration::from_millis(50),
            max: Duration::from_millis(10),
        },
        ..ScheduleConfig::default()
    }))
    .unwrap_err();
    assert!(matches!(err, WhackError::InvalidConfig { field: "backoff", .. }));
}

#[test]
fn zero_expiry_is_rejected() {
    let err = start(SessionBuilder::new().with_schedule_config(ScheduleConfig {
        expiry: ExpiryPolicy::After(Duration::ZERO),
        ..ScheduleConfig::default()
    }))
    .unwrap_err();
    assert!(matches!(err, WhackError::InvalidConfig { field: "expiry", .. }));
}

#[test]
fn tiny_board_is_rejected() {
    let err = start(SessionBuilder::new().with_board_config(BoardConfig {
        slot_count: 0,
        ..BoardConfig::default()
    }))
    .unwrap_err();
    assert!(matches!(err, WhackError::InvalidConfig { field: "slot_count", .. }));
}

#[test]
fn oversized_world_reference_limit_is_rejected() {
    let err = start(SessionBuilder::new().with_protocol_config(ProtocolConfig {
        max_world_reference_bytes: usize::MAX,
        ..ProtocolConfig::default()
    }))
    .unwrap_err();
    assert!(matches!(
        err,
        WhackError::InvalidConfig {
            field: "max_world_reference_bytes",
            ..
        }
    ));
}
