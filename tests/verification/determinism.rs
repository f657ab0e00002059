//! Seeded sessions replay identically.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use web_time::Duration;
use whack_sync::{
    ManualClock, MemoryNetwork, ScheduleConfig, SessionBuilder, SessionSnapshot, SlotIndex,
    TargetId, WhackEvent,
};

fn replay(seed: u64) -> (Vec<(SlotIndex, TargetId)>, SessionSnapshot) {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let mut host = SessionBuilder::<u8>::new()
        .with_schedule_config(ScheduleConfig::deterministic(seed))
        .with_clock(clock.clone())
        .start_session(network.endpoint(0))
        .unwrap();
    let mut spawns = Vec::new();
    for _ in 0..400 {
        clock.advance(Duration::from_millis(100));
        host.poll();
        for event in host.events() {
            if let WhackEvent::Spawned { slot, target } = event {
                spawns.push((slot, target));
            }
        }
        // Tap whatever is up so the board keeps moving.
        let visible: Vec<TargetId> = host
            .state()
            .targets()
            .filter(|t| t.state().is_active())
            .map(|t| t.id())
            .collect();
        for target in visible {
            host.on_tap_resolved(Some(target));
        }
    }
    (spawns, host.snapshot())
}

#[test]
fn same_seed_same_session() {
    let (spawns_a, snapshot_a) = replay(1234);
    let (spawns_b, snapshot_b) = replay(1234);
    assert_eq!(spawns_a.len(), 15);
    assert_eq!(spawns_a, spawns_b);
    assert_eq!(snapshot_a, snapshot_b);
    assert_eq!(snapshot_a.checksum, snapshot_b.checksum);
    assert_eq!(snapshot_a.score, 15);
}

#[test]
fn different_seeds_diverge() {
    let (spawns_a, _) = replay(1);
    let (spawns_b, _) = replay(2);
    assert_ne!(spawns_a, spawns_b);
}
