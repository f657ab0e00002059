//! Host and guest replicas converging over the in-memory network.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::{
    forced_host, guest, ms, poll_all, slot, spawned_slots, RecordingSink, StarLink,
};
use whack_sync::{
    ChaosConfig, ChaosTransport, Destination, ManualClock, MemoryNetwork, RetireReason, Role,
    SessionBuilder, SessionStatus, SyncWarningKind, TapOutcome, Transport, WhackEvent,
};

#[test]
fn host_placement_spawns_once_on_guest() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 5)]);
    let mut guest = guest(network.endpoint(1), &clock, 1);

    poll_all(&mut [&mut host, &mut guest], 3);

    let mut sink = RecordingSink::default();
    guest.dispatch_events(&mut sink);
    assert_eq!(sink.spawns_at(slot(5)), 1);
    assert_eq!(sink.last_remaining(), Some(0));

    let host_target = host.state().grid().occupancy(slot(5)).target();
    assert!(host_target.is_some());
    assert_eq!(guest.state().grid().occupancy(slot(5)).target(), host_target);
    assert_eq!(guest.snapshot().occupancy, host.snapshot().occupancy);
}

#[test]
fn duplicated_placements_apply_once() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let duplicating = ChaosTransport::new(
        network.endpoint(0),
        ChaosConfig::builder().duplication_rate(1.0).seed(3).build(),
    );
    let mut host = forced_host(duplicating, &clock, &[(0, 2), (10, 3)]);
    let mut guest = guest(network.endpoint(1), &clock, 2);

    host.poll();
    clock.advance_millis(10);
    poll_all(&mut [&mut host, &mut guest], 2);

    let events: Vec<_> = guest.events().collect();
    assert_eq!(spawned_slots(&events), vec![slot(2), slot(3)]);
    assert_eq!(guest.remaining(), 0);
    assert_eq!(guest.state().active_count(), 2);
}

#[test]
fn host_hit_retires_target_on_guest_without_scoring() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 4)]);
    let mut guest = guest(network.endpoint(1), &clock, 1);
    poll_all(&mut [&mut host, &mut guest], 2);
    let target = host.state().grid().occupancy(slot(4)).target().unwrap();
    let _ = guest.events().count();

    assert_eq!(host.on_tap_resolved(Some(target)), Some(TapOutcome::Scored));
    guest.poll();

    let events: Vec<_> = guest.events().collect();
    assert!(events.contains(&WhackEvent::Retired {
        target,
        slot: slot(4),
        reason: RetireReason::Remote,
    }));
    assert!(events.contains(&WhackEvent::SessionComplete { score: 0 }));
    assert_eq!(guest.score(), 0);
    assert_eq!(host.score(), 1);
    assert!(guest.state().grid().occupancy(slot(4)).is_empty());
    assert_eq!(guest.status(), SessionStatus::Complete);
}

#[test]
fn guest_hit_is_announced_to_host() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 7)]);
    let mut guest = guest(network.endpoint(1), &clock, 1);
    poll_all(&mut [&mut host, &mut guest], 2);
    let target = guest.state().grid().occupancy(slot(7)).target().unwrap();

    assert_eq!(guest.on_tap_resolved(Some(target)), Some(TapOutcome::Scored));
    host.poll();

    assert!(host.state().grid().occupancy(slot(7)).is_empty());
    assert_eq!(host.score(), 0);
    assert_eq!(guest.score(), 1);
    assert!(host.is_complete());
}

#[test]
fn host_relays_guest_hits_to_other_guests() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 4), (1_000, 4)]);
    let mut guest_a = guest(StarLink::new(network.endpoint(1), &[0]), &clock, 2);
    let mut guest_b = guest(StarLink::new(network.endpoint(2), &[0]), &clock, 2);
    poll_all(&mut [&mut host, &mut guest_a, &mut guest_b], 2);

    let first = host.state().grid().occupancy(slot(4)).target().unwrap();
    assert_eq!(guest_b.state().grid().occupancy(slot(4)).target(), Some(first));
    assert_eq!(guest_a.on_tap_resolved(Some(first)), Some(TapOutcome::Scored));
    poll_all(&mut [&mut host, &mut guest_a, &mut guest_b], 2);

    assert!(guest_b.state().grid().occupancy(slot(4)).is_empty());
    assert!(guest_b.events().any(|event| event
        == WhackEvent::Retired {
            target: first,
            slot: slot(4),
            reason: RetireReason::Remote,
        }));

    clock.advance_millis(1_000);
    poll_all(&mut [&mut host, &mut guest_a, &mut guest_b], 2);
    let second = host.state().grid().occupancy(slot(4)).target().unwrap();
    assert_ne!(second, first);
    for replica in [&guest_a, &guest_b] {
        assert_eq!(replica.state().grid().occupancy(slot(4)).target(), Some(second));
        assert_eq!(replica.remaining(), 0);
        assert_eq!(replica.snapshot().occupancy, host.snapshot().occupancy);
    }
    assert_eq!(guest_a.score(), 1);
    assert_eq!(guest_b.score(), 0);
}

#[test]
fn guest_follows_host_total_over_its_own_config() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 5)]);
    let mut guest = guest(network.endpoint(1), &clock, 15);
    poll_all(&mut [&mut host, &mut guest], 2);

    assert_eq!(guest.state().total(), 1);
    assert_eq!(guest.remaining(), 0);
    let target = guest.state().grid().occupancy(slot(5)).target().unwrap();
    guest.on_tap_resolved(Some(target));
    poll_all(&mut [&mut host, &mut guest], 2);

    assert!(guest.is_complete());
    assert!(host.is_complete());
    assert!(guest
        .events()
        .any(|event| event == WhackEvent::SessionComplete { score: 1 }));
}

#[test]
fn guest_with_small_config_mirrors_every_host_target() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 1), (0, 2), (0, 3)]);
    let mut guest = guest(network.endpoint(1), &clock, 1);
    poll_all(&mut [&mut host, &mut guest], 2);

    assert_eq!(guest.state().active_count(), 3);
    assert_eq!(guest.remaining(), host.remaining());
    assert!(!guest.events().any(|event| matches!(event, WhackEvent::SyncWarning { .. })));
}

#[test]
fn named_host_ignores_first_impostor() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut guest = SessionBuilder::<u8>::new()
        .with_role(Role::Guest)
        .with_host(0)
        .with_clock(clock.clone())
        .start_session(network.endpoint(1))
        .unwrap();
    let mut impostor = forced_host(network.endpoint(2), &clock, &[(0, 6)]);
    impostor.poll();
    guest.poll();
    assert!(guest.state().grid().occupancy(slot(6)).is_empty());

    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 5)]);
    poll_all(&mut [&mut host, &mut guest], 2);
    assert!(guest.state().grid().occupancy(slot(5)).target().is_some());
    assert_eq!(guest.host_address(), Some(&0));
    let rejected = guest
        .events()
        .filter(|event| {
            matches!(
                event,
                WhackEvent::SyncWarning {
                    peer: 2,
                    kind: SyncWarningKind::NotAuthoritative { .. },
                }
            )
        })
        .count();
    assert_eq!(rejected, 2);
}

#[test]
fn late_guest_receives_world_reference() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(60_000, 1)]);
    host.set_world_reference(vec![1, 2, 3, 4]).unwrap();

    let mut late = guest(network.endpoint(9), &clock, 1);
    poll_all(&mut [&mut host, &mut late], 2);

    assert_eq!(late.world_reference(), Some(&[1u8, 2, 3, 4][..]));
    assert_eq!(late.host_address(), Some(&0));
    assert!(late.events().any(|event| event
        == WhackEvent::WorldReferenceReceived {
            peer: 0,
            snapshot: vec![1, 2, 3, 4],
        }));
}

#[test]
fn guest_cannot_publish_world_reference() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut guest = guest(network.endpoint(1), &clock, 1);
    assert!(guest.set_world_reference(vec![1]).is_err());
    assert_eq!(guest.world_reference(), None);
}

#[test]
fn garbage_payload_leaves_replica_untouched() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 5)]);
    let mut guest = guest(network.endpoint(1), &clock, 1);
    poll_all(&mut [&mut host, &mut guest], 2);
    let _ = guest.events().count();
    let before = guest.snapshot();

    let mut attacker = network.endpoint(2);
    attacker.send(&[], &Destination::Peer(1));
    attacker.send(&[0xFF, 0, 0], &Destination::Peer(1));
    attacker.send(&[1, 0, 0, 0], &Destination::Peer(1));
    guest.poll();

    assert_eq!(guest.snapshot(), before);
    let warnings = guest
        .events()
        .filter(|event| {
            matches!(
                event,
                WhackEvent::SyncWarning {
                    peer: 2,
                    kind: SyncWarningKind::Malformed(_),
                }
            )
        })
        .count();
    assert_eq!(warnings, 3);
}

#[test]
fn placements_from_non_host_are_rejected() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 5)]);
    let mut guest_a = guest(network.endpoint(1), &clock, 1);
    let mut impostor = forced_host(network.endpoint(2), &clock, &[(5, 6)]);
    poll_all(&mut [&mut host, &mut guest_a], 2);

    clock.advance_millis(5);
    impostor.poll();
    guest_a.poll();

    assert!(guest_a.state().grid().occupancy(slot(6)).is_empty());
    assert!(guest_a.events().any(|event| matches!(
        event,
        WhackEvent::SyncWarning {
            peer: 2,
            kind: SyncWarningKind::NotAuthoritative { .. },
        }
    )));
}

#[test]
fn end_session_propagates_retirements() {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = forced_host(network.endpoint(0), &clock, &[(0, 1), (0, 2), (1_000, 3)]);
    let mut guest = guest(network.endpoint(1), &clock, 3);
    poll_all(&mut [&mut host, &mut guest], 2);
    assert_eq!(guest.state().active_count(), 2);

    host.end_session().unwrap();
    guest.poll();
    assert_eq!(guest.state().active_count(), 0);
    assert_eq!(guest.state().grid().occupied_count(), 0);
    assert_eq!(guest.remaining(), 0);
    assert_eq!(guest.status(), SessionStatus::Complete);

    clock.advance(ms(2_000));
    poll_all(&mut [&mut host, &mut guest], 2);
    assert_eq!(guest.state().grid().occupied_count(), 0);
    assert_eq!(host.status(), SessionStatus::Complete);
}

#[test]
fn peer_join_and_leave_events() {
    let network = MemoryNetwork::<u8>::new();
    let mut session = SessionBuilder::<u8>::new()
        .with_role(Role::Guest)
        .start_session(network.endpoint(0))
        .unwrap();
    let visitor = network.endpoint(5);
    session.poll();
    drop(visitor);
    session.poll();

    let events: Vec<_> = session.events().collect();
    assert_eq!(
        events,
        vec![
            WhackEvent::PeerJoined { peer: 5 },
            WhackEvent::PeerLeft { peer: 5 },
        ]
    );
    assert_eq!(session.peers().count(), 0);
}
