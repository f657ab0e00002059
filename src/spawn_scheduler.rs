//! Decides when and where targets appear.
//!
//! Scheduling is pure data generation: every target gets an independent uniform fire time
//! in `[start, start + horizon]` and an independent uniform slot in `[1, slot_count - 1]`
//! (slot 0 is reserved). Collisions are not avoided up front. They are handled when a
//! timer fires: if the slot is still occupied the target is deferred by the configured
//! backoff, and after `max_claim_attempts` failed claims it is dropped as starved.
//!
//! Timers live in a min-heap keyed by `(time, insertion order)`. A deferral pushes a new
//! timer for the same target id; nothing is mutated in place. [`SpawnScheduler::cancel_all`]
//! clears the heap and bumps an epoch so that no timer from before the cancel can fire.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};
use web_time::Duration;

use crate::rng::{Pcg32, Rng, SeedableRng};
use crate::session_state::{ClaimResult, SessionState};
use crate::sessions::config::{BackoffPolicy, ExpiryPolicy, ScheduleConfig};
use crate::{RetireReason, SimTime, SlotIndex, TargetId};

/// Lifecycle of a target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetState {
    /// Scheduled, not yet visible.
    Pending,
    /// Visible and holding its slot.
    Active {
        /// When it became visible.
        since: SimTime,
    },
    /// Gone for good.
    Retired {
        /// Why it left.
        reason: RetireReason,
    },
}

impl TargetState {
    /// `true` for [`TargetState::Active`].
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, TargetState::Active { .. })
    }

    /// `true` for [`TargetState::Retired`].
    #[must_use]
    pub const fn is_retired(&self) -> bool {
        matches!(self, TargetState::Retired { .. })
    }
}

/// A scheduled mole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    id: TargetId,
    slot: SlotIndex,
    pub(crate) fire_at: SimTime,
    pub(crate) attempts: u32,
    pub(crate) state: TargetState,
}

impl Target {
    pub(crate) fn new(id: TargetId, slot: SlotIndex, fire_at: SimTime) -> Self {
        Self {
            id,
            slot,
            fire_at,
            attempts: 0,
            state: TargetState::Pending,
        }
    }

    /// Unique id, also the anchor id on the wire.
    #[must_use]
    pub const fn id(&self) -> TargetId {
        self.id
    }

    /// The slot this target wants.
    #[must_use]
    pub const fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Next (or last) fire time.
    #[must_use]
    pub const fn fire_at(&self) -> SimTime {
        self.fire_at
    }

    /// Claims attempted so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TargetState {
        self.state
    }
}

/// What a timer did when it fired.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The target took its slot and is now visible.
    Claimed {
        /// The target.
        target: TargetId,
        /// Its slot.
        slot: SlotIndex,
        /// The fire time.
        at: SimTime,
    },
    /// The slot was occupied; the target will try again.
    Deferred {
        /// The target.
        target: TargetId,
        /// The occupied slot.
        slot: SlotIndex,
        /// The new fire time, strictly later than the old one.
        retry_at: SimTime,
        /// Claims attempted so far.
        attempts: u32,
    },
    /// Out of attempts; the target was dropped.
    Starved {
        /// The target.
        target: TargetId,
        /// Claims attempted.
        attempts: u32,
    },
    /// The visibility window ran out.
    Expired {
        /// The target.
        target: TargetId,
        /// The slot it vacated.
        slot: SlotIndex,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum TimerKind {
    Fire,
    Expire,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Timer {
    at: SimTime,
    order: u64,
    epoch: u32,
    kind: TimerKind,
    target: TargetId,
}

/// Outcomes of one [`SpawnScheduler::advance`]. Usually zero or one per poll.
pub type Outcomes = SmallVec<[ScheduleOutcome; 4]>;

/// Generates targets and runs their fire and expiry timers.
///
/// ```
/// use whack_sync::{
///     BoardDimensions, ScheduleConfig, SessionState, SimTime, SlotGrid, SpawnScheduler,
/// };
///
/// let config = ScheduleConfig::deterministic(1);
/// let mut state = SessionState::new(config.total_targets, SlotGrid::build(16, BoardDimensions::default()));
/// let mut scheduler = SpawnScheduler::new(&config);
/// scheduler.schedule(SimTime::ZERO, &mut state);
///
/// let outcomes = scheduler.advance(SimTime::from_secs(30), &mut state);
/// assert!(!outcomes.is_empty());
/// assert!(state.active_count() > 0);
/// ```
#[derive(Debug, Clone)]
pub struct SpawnScheduler {
    config: ScheduleConfig,
    rng: Pcg32,
    nonce: u64,
    next_sequence: u64,
    next_order: u64,
    epoch: u32,
    timers: BinaryHeap<Reverse<Timer>>,
}

impl SpawnScheduler {
    /// Creates a scheduler. With `rng_seed` set, ids, times and slots are reproducible.
    #[must_use]
    pub fn new(config: &ScheduleConfig) -> Self {
        let mut rng = match config.rng_seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_entropy(),
        };
        let nonce = rng.next_u64();
        Self {
            config: *config,
            rng,
            nonce,
            next_sequence: 0,
            next_order: 0,
            epoch: 0,
            timers: BinaryHeap::new(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Draws `total_targets` targets starting at `start` and registers them as pending.
    ///
    /// Returns how many were registered; fewer than configured only if `state` has no room.
    pub fn schedule(&mut self, start: SimTime, state: &mut SessionState) -> usize {
        let horizon_ms = u64::try_from(self.config.horizon.as_millis()).unwrap_or(u64::MAX);
        let slot_count = state.grid().len();
        let mut registered = 0;
        for _ in 0..self.config.total_targets {
            let offset = self.rng.gen_range_u64_inclusive(0..=horizon_ms);
            let slot = SlotIndex::new(self.rng.gen_range_usize(1..slot_count));
            if self.add(start + Duration::from_millis(offset), slot, state) {
                registered += 1;
            }
        }
        debug!(
            registered,
            horizon_ms,
            start = %start,
            "Scheduled targets"
        );
        registered
    }

    /// Registers targets at exact `(offset from start, slot)` pairs instead of random draws.
    ///
    /// # Panics
    ///
    /// If a slot is off the board.
    pub fn schedule_forced(
        &mut self,
        start: SimTime,
        plan: &[(Duration, SlotIndex)],
        state: &mut SessionState,
    ) -> usize {
        let registered = plan
            .iter()
            .filter(|(offset, slot)| self.add(start + *offset, *slot, state))
            .count();
        debug!(registered, start = %start, "Scheduled forced targets");
        registered
    }

    fn add(&mut self, fire_at: SimTime, slot: SlotIndex, state: &mut SessionState) -> bool {
        let id = TargetId::from_parts(self.nonce, self.next_sequence);
        self.next_sequence += 1;
        if !state.register(Target::new(id, slot, fire_at)) {
            return false;
        }
        self.push(fire_at, TimerKind::Fire, id);
        true
    }

    fn push(&mut self, at: SimTime, kind: TimerKind, target: TargetId) {
        let timer = Timer {
            at,
            order: self.next_order,
            epoch: self.epoch,
            kind,
            target,
        };
        self.next_order += 1;
        self.timers.push(Reverse(timer));
    }

    /// Fires every timer due at or before `now`, in time order.
    pub fn advance(&mut self, now: SimTime, state: &mut SessionState) -> Outcomes {
        let mut outcomes = Outcomes::new();
        while let Some(Reverse(timer)) = self.timers.peek().copied() {
            if timer.at > now {
                break;
            }
            self.timers.pop();
            if timer.epoch != self.epoch {
                continue;
            }
            let outcome = match timer.kind {
                TimerKind::Fire => self.fire(timer, state),
                TimerKind::Expire => state
                    .retire(timer.target, RetireReason::Expired)
                    .map(|slot| ScheduleOutcome::Expired {
                        target: timer.target,
                        slot,
                    }),
            };
            if let Some(outcome) = outcome {
                trace!(?outcome, at = %timer.at, "Timer fired");
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    fn fire(&mut self, timer: Timer, state: &mut SessionState) -> Option<ScheduleOutcome> {
        match state.activate(timer.target, timer.at) {
            ClaimResult::Claimed(slot) => {
                if let ExpiryPolicy::After(window) = self.config.expiry {
                    self.push(timer.at + window, TimerKind::Expire, timer.target);
                }
                Some(ScheduleOutcome::Claimed {
                    target: timer.target,
                    slot,
                    at: timer.at,
                })
            },
            ClaimResult::Occupied(slot) => {
                let attempts = state.target(timer.target).map_or(0, |t| t.attempts());
                if attempts >= self.config.max_claim_attempts {
                    state.starve(timer.target);
                    return Some(ScheduleOutcome::Starved {
                        target: timer.target,
                        attempts,
                    });
                }
                let retry_at = timer.at + self.backoff_delay();
                state.defer(timer.target, retry_at);
                self.push(retry_at, TimerKind::Fire, timer.target);
                Some(ScheduleOutcome::Deferred {
                    target: timer.target,
                    slot,
                    retry_at,
                    attempts,
                })
            },
            ClaimResult::NotPending => None,
        }
    }

    fn backoff_delay(&mut self) -> Duration {
        let delay = match self.config.backoff {
            BackoffPolicy::Fixed(delay) => delay,
            BackoffPolicy::Randomized { min, max } => {
                let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
                let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(self.rng.gen_range_u64_inclusive(min_ms..=max_ms))
            },
        };
        delay.max(Duration::from_millis(1))
    }

    /// Drops every outstanding timer. Timers scheduled afterwards fire normally.
    pub fn cancel_all(&mut self) {
        self.timers.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Number of outstanding timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// When the next timer is due, if any.
    #[must_use]
    pub fn next_timer_at(&self) -> Option<SimTime> {
        self.timers.peek().map(|Reverse(timer)| timer.at)
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::slot_grid::{BoardDimensions, SlotGrid};
    use crate::telemetry::InvariantChecker;

    fn setup(config: ScheduleConfig, slots: usize) -> (SpawnScheduler, SessionState) {
        let state = SessionState::new(
            config.total_targets,
            SlotGrid::build(slots, BoardDimensions::default()),
        );
        (SpawnScheduler::new(&config), state)
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn random_schedule_respects_horizon_and_reserved_slot() {
        let (mut scheduler, mut state) = setup(ScheduleConfig::deterministic(3), 16);
        assert_eq!(scheduler.schedule(SimTime::from_secs(1), &mut state), 15);
        for target in state.targets() {
            assert!(target.fire_at() >= SimTime::from_secs(1));
            assert!(target.fire_at() <= SimTime::from_secs(31));
            assert!((1..16).contains(&target.slot().as_usize()));
        }
        state.check_invariants().unwrap();
    }

    #[test]
    fn same_seed_same_schedule() {
        let (mut a, mut state_a) = setup(ScheduleConfig::deterministic(9), 16);
        let (mut b, mut state_b) = setup(ScheduleConfig::deterministic(9), 16);
        a.schedule(SimTime::ZERO, &mut state_a);
        b.schedule(SimTime::ZERO, &mut state_b);
        assert_eq!(state_a.snapshot(), state_b.snapshot());
    }

    #[test]
    fn forced_collision_is_deferred_not_dropped() {
        let config = ScheduleConfig {
            total_targets: 3,
            ..ScheduleConfig::deterministic(0)
        };
        let (mut scheduler, mut state) = setup(config, 16);
        let (a, b) = (SlotIndex::new(1), SlotIndex::new(2));
        scheduler.schedule_forced(
            SimTime::ZERO,
            &[(ms(1), a), (ms(2), b), (ms(2), a)],
            &mut state,
        );

        let outcomes = scheduler.advance(SimTime::from_millis(2), &mut state);
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], ScheduleOutcome::Claimed { slot, .. } if slot == a));
        assert!(matches!(outcomes[1], ScheduleOutcome::Claimed { slot, .. } if slot == b));
        match outcomes[2] {
            ScheduleOutcome::Deferred {
                slot,
                retry_at,
                attempts,
                ..
            } => {
                assert_eq!(slot, a);
                assert!(retry_at > SimTime::from_millis(2));
                assert_eq!(attempts, 1);
            },
            other => panic!("expected Deferred, got {:?}", other),
        }
        assert_eq!(state.remaining(), 1);
        assert_eq!(scheduler.pending_timers(), 1);
        state.check_invariants().unwrap();
    }

    #[test]
    fn deferred_target_spawns_once_slot_frees() {
        let config = ScheduleConfig {
            total_targets: 2,
            backoff: BackoffPolicy::Fixed(ms(100)),
            ..ScheduleConfig::deterministic(0)
        };
        let (mut scheduler, mut state) = setup(config, 4);
        let slot = SlotIndex::new(1);
        scheduler.schedule_forced(SimTime::ZERO, &[(ms(0), slot), (ms(0), slot)], &mut state);
        let first = scheduler.advance(SimTime::ZERO, &mut state);
        let ScheduleOutcome::Claimed { target, .. } = first[0] else {
            panic!("expected Claimed, got {:?}", first[0]);
        };
        state.resolve_tap(target);

        let later = scheduler.advance(SimTime::from_millis(100), &mut state);
        assert!(matches!(later[0], ScheduleOutcome::Claimed { slot: s, .. } if s == slot));
        assert_eq!(state.remaining(), 0);
    }

    #[test]
    fn starvation_after_retry_cap() {
        let config = ScheduleConfig {
            total_targets: 2,
            max_claim_attempts: 3,
            backoff: BackoffPolicy::Fixed(ms(10)),
            ..ScheduleConfig::deterministic(0)
        };
        let (mut scheduler, mut state) = setup(config, 4);
        let slot = SlotIndex::new(2);
        scheduler.schedule_forced(SimTime::ZERO, &[(ms(0), slot), (ms(1), slot)], &mut state);

        let outcomes = scheduler.advance(SimTime::from_secs(10), &mut state);
        let deferrals = outcomes
            .iter()
            .filter(|o| matches!(o, ScheduleOutcome::Deferred { .. }))
            .count();
        assert_eq!(deferrals, 2);
        assert!(matches!(
            outcomes.last(),
            Some(ScheduleOutcome::Starved { attempts: 3, .. })
        ));
        assert_eq!(state.remaining(), 0);
        assert_eq!(state.retired_count(), 1);
        assert_eq!(scheduler.pending_timers(), 0);
        state.check_invariants().unwrap();
    }

    #[test]
    fn randomized_backoff_stays_in_range() {
        let config = ScheduleConfig {
            total_targets: 2,
            max_claim_attempts: 50,
            backoff: BackoffPolicy::Randomized {
                min: ms(20),
                max: ms(40),
            },
            ..ScheduleConfig::deterministic(5)
        };
        let (mut scheduler, mut state) = setup(config, 4);
        let slot = SlotIndex::new(3);
        scheduler.schedule_forced(SimTime::ZERO, &[(ms(0), slot), (ms(0), slot)], &mut state);
        let mut last = SimTime::ZERO;
        for outcome in scheduler.advance(SimTime::from_secs(60), &mut state) {
            if let ScheduleOutcome::Deferred { retry_at, .. } = outcome {
                let gap = retry_at.saturating_duration_since(last);
                assert!(gap >= ms(20) && gap <= ms(40), "gap {:?}", gap);
                last = retry_at;
            }
        }
    }

    #[test]
    fn expiry_retires_and_frees_slot() {
        let config = ScheduleConfig {
            total_targets: 1,
            expiry: ExpiryPolicy::After(ms(500)),
            ..ScheduleConfig::deterministic(0)
        };
        let (mut scheduler, mut state) = setup(config, 4);
        scheduler.schedule_forced(SimTime::ZERO, &[(ms(100), SlotIndex::new(1))], &mut state);
        scheduler.advance(SimTime::from_millis(100), &mut state);
        assert!(scheduler.advance(SimTime::from_millis(599), &mut state).is_empty());

        let outcomes = scheduler.advance(SimTime::from_millis(600), &mut state);
        assert!(matches!(outcomes[0], ScheduleOutcome::Expired { .. }));
        assert!(state.grid().occupancy(SlotIndex::new(1)).is_empty());
        assert!(state.is_complete());
    }

    #[test]
    fn expiry_after_tap_is_ignored() {
        let config = ScheduleConfig {
            total_targets: 1,
            expiry: ExpiryPolicy::After(ms(500)),
            ..ScheduleConfig::deterministic(0)
        };
        let (mut scheduler, mut state) = setup(config, 4);
        scheduler.schedule_forced(SimTime::ZERO, &[(ms(0), SlotIndex::new(1))], &mut state);
        let target = state.targets().next().unwrap().id();
        scheduler.advance(SimTime::ZERO, &mut state);
        state.resolve_tap(target);
        assert!(scheduler.advance(SimTime::from_secs(1), &mut state).is_empty());
        assert_eq!(state.score(), 1);
    }

    #[test]
    fn cancel_all_silences_timers() {
        let (mut scheduler, mut state) = setup(ScheduleConfig::deterministic(1), 16);
        scheduler.schedule(SimTime::ZERO, &mut state);
        assert_eq!(scheduler.pending_timers(), 15);
        scheduler.cancel_all();
        assert_eq!(scheduler.next_timer_at(), None);
        assert!(scheduler.advance(SimTime::from_secs(60), &mut state).is_empty());
        assert_eq!(state.active_count(), 0);
    }

    #[test]
    fn timers_after_session_end_do_nothing() {
        let (mut scheduler, mut state) = setup(ScheduleConfig::deterministic(1), 16);
        scheduler.schedule(SimTime::ZERO, &mut state);
        state.end();
        assert!(scheduler.advance(SimTime::from_secs(60), &mut state).is_empty());
    }

    #[test]
    fn ids_are_unique_and_sequential() {
        let (mut scheduler, mut state) = setup(ScheduleConfig::deterministic(2), 16);
        scheduler.schedule(SimTime::ZERO, &mut state);
        let sequences: Vec<u64> = state.targets().map(|t| t.id().sequence()).collect();
        assert_eq!(sequences, (0..15).collect::<Vec<_>>());
    }
}
