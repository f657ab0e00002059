//! Replicas under hostile delivery.
//!
//! Delivery is best-effort with no retransmission, so convergence is only asserted for
//! delay and duplication. Loss and reordering are checked for safety: no panics, at most
//! one target per slot, and consistent counters.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use whack_sync::telemetry::InvariantChecker;
use whack_sync::{
    ChaosConfig, ChaosTransport, ExpiryPolicy, ManualClock, MemoryNetwork, Role, ScheduleConfig,
    SessionBuilder, WhackSession,
};

fn host_with(
    transport: ChaosTransport<u8, whack_sync::MemoryTransport<u8>>,
    clock: &ManualClock,
    seed: u64,
) -> WhackSession<u8> {
    SessionBuilder::new()
        .with_role(Role::Host)
        .with_schedule_config(ScheduleConfig {
            total_targets: 12,
            expiry: ExpiryPolicy::After(crate::common::ms(400)),
            ..ScheduleConfig::deterministic(seed)
        })
        .with_clock(clock.clone())
        .start_session(transport)
        .unwrap()
}

fn guest_with(
    transport: ChaosTransport<u8, whack_sync::MemoryTransport<u8>>,
    clock: &ManualClock,
) -> WhackSession<u8> {
    crate::common::guest(transport, clock, 12)
}

/// Steps the clock through the whole horizon, then drains in-flight traffic.
fn run(clock: &ManualClock, sessions: &mut [&mut WhackSession<u8>]) {
    for _ in 0..400 {
        clock.advance_millis(100);
        crate::common::poll_all(sessions, 1);
        for session in sessions.iter_mut() {
            session.state().check_invariants().unwrap();
        }
    }
    crate::common::poll_all(sessions, 10);
}

#[test]
fn delayed_and_duplicated_delivery_converges() {
    crate::common::init_tracing();
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let chaos = |seed| {
        ChaosConfig::builder()
            .duplication_rate(0.5)
            .delay_polls(3)
            .seed(seed)
            .build()
    };
    let mut host = host_with(ChaosTransport::new(network.endpoint(0), chaos(1)), &clock, 21);
    let mut guest_a = guest_with(ChaosTransport::new(network.endpoint(1), chaos(2)), &clock);
    let mut guest_b = guest_with(ChaosTransport::new(network.endpoint(2), chaos(3)), &clock);

    run(&clock, &mut [&mut host, &mut guest_a, &mut guest_b]);

    assert!(host.is_complete());
    for guest in [&guest_a, &guest_b] {
        assert!(guest.is_complete(), "guest did not converge: {:?}", guest);
        assert_eq!(guest.state().grid().occupied_count(), 0);
        assert_eq!(guest.state().retired_count(), host.state().retired_count());
    }
}

#[test]
fn lossy_reordered_delivery_stays_safe() {
    crate::common::init_tracing();
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = host_with(
        ChaosTransport::new(network.endpoint(0), ChaosConfig::terrible_network()),
        &clock,
        5,
    );
    let mut guest = guest_with(
        ChaosTransport::new(
            network.endpoint(1),
            ChaosConfig::builder()
                .packet_loss_rate(0.3)
                .reorder_rate(0.5)
                .seed(8)
                .build(),
        ),
        &clock,
    );

    run(&clock, &mut [&mut host, &mut guest]);

    assert!(host.is_complete());
    let guest_state = guest.state();
    assert!(guest_state.active_count() as usize == guest_state.grid().occupied_count());
    assert!(guest_state.remaining() + guest_state.active_count() + guest_state.retired_count()
        == guest_state.total());
}
