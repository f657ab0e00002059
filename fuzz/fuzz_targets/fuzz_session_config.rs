//! Fuzz target for SessionBuilder configuration.
//!
//! Arbitrary configuration values must either be rejected with an error or produce a
//! session that polls without panicking.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use web_time::Duration;
use whack_sync::{
    BackoffPolicy, BoardConfig, ExpiryPolicy, ManualClock, MemoryNetwork, ProtocolConfig,
    ScheduleConfig, SessionBuilder,
};

#[derive(Debug, Arbitrary)]
struct FuzzConfig {
    total_targets: u16,
    horizon_ms: u32,
    backoff_min_ms: u16,
    backoff_max_ms: u16,
    randomized: bool,
    max_claim_attempts: u8,
    expiry_ms: Option<u16>,
    slot_count: u8,
    max_queued_events: u16,
    seed: u64,
}

fuzz_target!(|cfg: FuzzConfig| {
    let backoff = if cfg.randomized {
        BackoffPolicy::Randomized {
            min: Duration::from_millis(cfg.backoff_min_ms.into()),
            max: Duration::from_millis(cfg.backoff_max_ms.into()),
        }
    } else {
        BackoffPolicy::Fixed(Duration::from_millis(cfg.backoff_min_ms.into()))
    };
    let schedule = ScheduleConfig {
        total_targets: cfg.total_targets.into(),
        horizon: Duration::from_millis(cfg.horizon_ms.into()),
        backoff,
        max_claim_attempts: cfg.max_claim_attempts.into(),
        expiry: cfg
            .expiry_ms
            .map_or(ExpiryPolicy::Never, |ms| ExpiryPolicy::After(Duration::from_millis(ms.into()))),
        rng_seed: Some(cfg.seed),
    };
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let result = SessionBuilder::<u8>::new()
        .with_schedule_config(schedule)
        .with_board_config(BoardConfig {
            slot_count: cfg.slot_count.into(),
            ..BoardConfig::default()
        })
        .with_protocol_config(ProtocolConfig {
            max_queued_events: cfg.max_queued_events.into(),
            ..ProtocolConfig::default()
        })
        .with_clock(clock.clone())
        .start_session(network.endpoint(0));
    if let Ok(mut session) = result {
        for _ in 0..16 {
            clock.advance_millis(500);
            session.poll();
        }
    }
});
