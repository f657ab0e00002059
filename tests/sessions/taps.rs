//! Tap resolution through the session facade and a render sink.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{forced_host, guest, poll_all, slot, RecordingSink, SinkCall};
use whack_sync::{
    BackoffPolicy, ManualClock, MemoryNetwork, RetireReason, ScheduleConfig, SessionBuilder,
    SessionStatus, TapOutcome, TargetId, WhackEvent,
};

#[test]
fn full_round_through_render_sink() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(100, 1), (200, 2)]);
    let mut sink = RecordingSink::default();

    clock.advance_millis(100);
    host.poll();
    let first = host.state().grid().occupancy(slot(1)).target().unwrap();
    host.on_tap_resolved(Some(first));
    clock.advance_millis(100);
    host.poll();
    let second = host.state().grid().occupancy(slot(2)).target().unwrap();
    host.on_tap_resolved(Some(second));
    host.dispatch_events(&mut sink);

    assert_eq!(
        sink.calls,
        vec![
            SinkCall::Spawn(slot(1), first),
            SinkCall::Remaining(1),
            SinkCall::Retire(first, slot(1), RetireReason::Hit),
            SinkCall::Score(1),
            SinkCall::Spawn(slot(2), second),
            SinkCall::Remaining(0),
            SinkCall::Retire(second, slot(2), RetireReason::Hit),
            SinkCall::Score(2),
            SinkCall::Complete(2),
        ]
    );
    assert_eq!(host.status(), SessionStatus::Complete);
}

#[test]
fn tap_racing_a_remote_retirement_is_stale() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 3)]);
    let mut guest = guest(network.endpoint(1), &clock, 1);
    poll_all(&mut [&mut host, &mut guest], 2);
    let target = host.state().grid().occupancy(slot(3)).target().unwrap();

    host.on_tap_resolved(Some(target));
    guest.poll();
    let _ = guest.events().count();

    assert_eq!(
        guest.on_tap_resolved(Some(target)),
        Some(TapOutcome::AlreadyRetired)
    );
    assert_eq!(guest.score(), 0);
    assert_eq!(
        guest.events().collect::<Vec<_>>(),
        vec![WhackEvent::StaleTap {
            target,
            outcome: TapOutcome::AlreadyRetired,
        }]
    );
}

#[test]
fn unknown_and_missed_taps_change_nothing() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 3)]);
    host.poll();
    let before = host.snapshot();

    assert_eq!(host.on_tap_resolved(None), None);
    assert_eq!(
        host.on_tap_resolved(Some(TargetId::new(u128::MAX))),
        Some(TapOutcome::Unknown)
    );
    assert_eq!(host.snapshot(), before);
}

#[test]
fn forced_collision_defers_then_spawns() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = SessionBuilder::<u8>::new()
        .with_schedule_config(ScheduleConfig {
            backoff: BackoffPolicy::Fixed(crate::common::ms(50)),
            ..ScheduleConfig::deterministic(4)
        })
        .with_forced_schedule(vec![
            (crate::common::ms(1), slot(1)),
            (crate::common::ms(2), slot(2)),
            (crate::common::ms(2), slot(1)),
        ])
        .with_clock(clock.clone())
        .start_session(network.endpoint(0))
        .unwrap();

    clock.advance_millis(2);
    host.poll();
    assert_eq!(host.state().active_count(), 2);
    assert_eq!(host.remaining(), 1);
    assert_eq!(host.next_timer_at(), Some(whack_sync::SimTime::from_millis(52)));

    let blocker = host.state().grid().occupancy(slot(1)).target().unwrap();
    host.on_tap_resolved(Some(blocker));
    clock.advance_millis(50);
    host.poll();
    assert_eq!(host.remaining(), 0);
    assert_eq!(host.state().active_count(), 2);
    assert!(!host.state().grid().occupancy(slot(1)).is_empty());
    assert_ne!(host.state().grid().occupancy(slot(1)).target(), Some(blocker));
}

#[test]
fn starved_target_is_reported_and_counted_down() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let observer = std::sync::Arc::new(whack_sync::telemetry::CollectingObserver::new());
    let mut host = SessionBuilder::<u8>::new()
        .with_schedule_config(ScheduleConfig {
            max_claim_attempts: 2,
            backoff: BackoffPolicy::Fixed(crate::common::ms(10)),
            ..ScheduleConfig::deterministic(4)
        })
        .with_forced_schedule(vec![
            (crate::common::ms(0), slot(1)),
            (crate::common::ms(0), slot(1)),
        ])
        .with_clock(clock.clone())
        .with_violation_observer(observer.clone())
        .start_session(network.endpoint(0))
        .unwrap();
    let mut guest = guest(network.endpoint(1), &clock, 2);

    clock.advance_millis(100);
    poll_all(&mut [&mut host, &mut guest], 2);

    let events: Vec<_> = host.events().collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, WhackEvent::SpawnStarved { attempts: 2, .. })));
    assert_eq!(host.remaining(), 0);
    assert!(observer.has_violation(whack_sync::telemetry::ViolationKind::Scheduling));
    assert_eq!(guest.remaining(), 0);
    assert_eq!(guest.state().active_count(), 1);
}
