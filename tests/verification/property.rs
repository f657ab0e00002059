//! Property-based tests for the scheduler, the replica and the wire decoder.
//!
//! # Invariants Tested
//!
//! - At most one active target per slot, and every occupied slot names an active target
//!   that owns it
//! - remaining + active + retired == total after every step
//! - A seeded host always finishes once every timer has run
//! - Arbitrary inbound traffic never panics and never breaks the counters
//! - Applying the same placement twice equals applying it once
//! - The decoder rejects or accepts arbitrary bytes without panicking

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use proptest::prelude::*;
use web_time::Duration;
use whack_sync::__internal::decode_message;
use whack_sync::telemetry::InvariantChecker;
use whack_sync::{
    elect_host, BackoffPolicy, BoardDimensions, ExpiryPolicy, Occupancy, ScheduleConfig,
    SessionState, SimTime, SlotGrid, SlotIndex, SpawnScheduler, TargetId, TargetState,
};

fn assert_board_consistent(state: &SessionState) {
    state.check_invariants().unwrap();
    for slot in state.grid().slots() {
        if let Occupancy::Occupied(id) = slot.occupancy() {
            let target = state.target(id).expect("occupied slot names a known target");
            assert!(target.state().is_active(), "{id} occupies a slot but is not active");
            assert_eq!(target.slot(), slot.index());
        }
    }
    assert_eq!(
        state.remaining() + state.active_count() + state.retired_count(),
        state.total()
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn host_schedule_never_double_books(
        seed in any::<u64>(),
        total in 1u32..40,
        slot_count in 2usize..20,
        horizon_ms in 1u64..5_000,
        step_ms in 1u64..250,
        taps in proptest::collection::vec(any::<bool>(), 0..64),
    ) {
        let config = ScheduleConfig {
            total_targets: total,
            horizon: Duration::from_millis(horizon_ms),
            backoff: BackoffPolicy::Randomized {
                min: Duration::from_millis(10),
                max: Duration::from_millis(200),
            },
            max_claim_attempts: 5,
            expiry: ExpiryPolicy::After(Duration::from_millis(300)),
            rng_seed: Some(seed),
        };
        let mut state = SessionState::new(total, SlotGrid::build(slot_count, BoardDimensions::default()));
        let mut scheduler = SpawnScheduler::new(&config);
        prop_assert_eq!(scheduler.schedule(SimTime::ZERO, &mut state), total as usize);

        let end = horizon_ms + 5 * 200 + 300 + step_ms;
        let mut now = 0;
        let mut tap_index = 0;
        while now <= end {
            scheduler.advance(SimTime::from_millis(now), &mut state);
            assert_board_consistent(&state);
            if taps.get(tap_index).copied().unwrap_or(false) {
                let active = state
                    .targets()
                    .find(|t| t.state().is_active())
                    .map(|t| t.id());
                if let Some(id) = active {
                    state.resolve_tap(id);
                    assert_board_consistent(&state);
                }
            }
            tap_index += 1;
            now += step_ms;
        }

        prop_assert!(state.is_complete());
        prop_assert_eq!(scheduler.pending_timers(), 0);
        prop_assert!(state.score() <= total);
    }

    #[test]
    fn replica_survives_arbitrary_traffic(
        total in 0u32..12,
        ops in proptest::collection::vec(
            (0u8..4, 0u128..16, 0usize..20),
            0..80,
        ),
    ) {
        let mut state = SessionState::new(total, SlotGrid::build(16, BoardDimensions::default()));
        for (step, (op, id, slot)) in ops.into_iter().enumerate() {
            let id = TargetId::new(id);
            let slot = SlotIndex::new(slot);
            match op {
                0 => {
                    state.apply_placement(id, slot, SimTime::from_millis(step as u64));
                },
                1 if slot.is_valid_for(16) => {
                    state.apply_retire(id, slot);
                },
                2 => {
                    state.apply_drop(id);
                },
                _ => {
                    state.resolve_tap(id);
                },
            }
            assert_board_consistent(&state);
        }
    }

    #[test]
    fn placement_is_idempotent(
        id in any::<u128>(),
        slot in 0usize..16,
        repeats in 1usize..5,
    ) {
        let mut once = SessionState::new(3, SlotGrid::build(16, BoardDimensions::default()));
        once.apply_placement(TargetId::new(id), SlotIndex::new(slot), SimTime::ZERO);

        let mut many = SessionState::new(3, SlotGrid::build(16, BoardDimensions::default()));
        for _ in 0..=repeats {
            many.apply_placement(TargetId::new(id), SlotIndex::new(slot), SimTime::ZERO);
        }
        prop_assert_eq!(once.snapshot(), many.snapshot());
        prop_assert_eq!(
            many.target(TargetId::new(id)).map(|t| t.state()),
            Some(TargetState::Active { since: SimTime::ZERO })
        );
    }

    #[test]
    fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_message(&bytes);
    }

    #[test]
    fn host_election_ignores_candidate_order(
        candidates in proptest::collection::vec((any::<u8>(), 0u64..50), 1..10),
    ) {
        let forward = elect_host(candidates.iter().map(|(a, t)| (*a, SimTime::from_millis(*t))));
        let backward = elect_host(candidates.iter().rev().map(|(a, t)| (*a, SimTime::from_millis(*t))));
        prop_assert_eq!(forward, backward);

        let expected = candidates.iter().map(|(a, t)| (*t, *a)).min().map(|(_, a)| a);
        prop_assert_eq!(forward, expected);
    }
}
