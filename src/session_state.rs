//! Score, remaining-target counter, per-slot occupancy and completion status.
//!
//! [`SessionState`] is the single writer for everything a session counts. The scheduler
//! asks it to activate targets, taps ask it to score, and the sync protocol asks it to
//! mirror remote placements. Every mutation keeps
//!
//! - `remaining + active + retired == total`,
//! - `active` equal to the number of occupied slots,
//! - `score` moving only when a tap retires an active target.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::fnv1a_hash;
use crate::slot_grid::{Occupancy, SlotGrid};
use crate::spawn_scheduler::{Target, TargetState};
use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::{RetireReason, SessionStatus, SimTime, SlotIndex, TargetId};

/// Result of resolving a tap against the session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TapOutcome {
    /// The target was active. It is now retired and the score went up.
    Scored,
    /// The target had already left the board. Nothing changed.
    AlreadyRetired,
    /// The target is not visible: never seen, or still waiting to spawn. Nothing changed.
    Unknown,
}

/// Result of mirroring a remote placement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// The slot is now occupied by the remote target.
    Applied,
    /// The anchor was already known. Nothing changed.
    DuplicateAnchor,
    /// The slot already holds a target. Nothing changed.
    SlotOccupied,
    /// The slot is not on this board. Nothing changed.
    SlotOutOfRange,
    /// Every target of the session is already accounted for. Nothing changed.
    Exhausted,
}

pub(crate) enum ClaimResult {
    Claimed(SlotIndex),
    Occupied(SlotIndex),
    NotPending,
}

/// One target as it appears in a [`SessionSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRecord {
    /// The target.
    pub id: TargetId,
    /// Its slot.
    pub slot: SlotIndex,
    /// Where it is in its lifecycle.
    pub state: TargetState,
}

/// A point-in-time copy of a [`SessionState`] with a deterministic checksum.
///
/// Two snapshots compare equal exactly when the states they were taken from agree on
/// counters, occupancy and every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Local score.
    pub score: u32,
    /// Targets not yet spawned or dropped.
    pub remaining: u32,
    /// Visible targets.
    pub active: u32,
    /// Targets that left the board or never made it.
    pub retired: u32,
    /// Targets in the session.
    pub total: u32,
    /// Running or complete.
    pub status: SessionStatus,
    /// Occupancy of every slot, by index.
    pub occupancy: Vec<Occupancy>,
    /// Every known target, by id.
    pub targets: Vec<TargetRecord>,
    /// FNV-1a over all of the above.
    pub checksum: u64,
}

/// Counters, occupancy and target lifecycle for one replica of a session.
///
/// ```
/// use whack_sync::{BoardDimensions, SessionState, SlotGrid, SlotIndex, TapOutcome, TargetId};
///
/// let mut state = SessionState::new(1, SlotGrid::build(16, BoardDimensions::default()));
/// let target = TargetId::new(1);
/// state.apply_placement(target, SlotIndex::new(5), Default::default());
/// assert_eq!(state.remaining(), 0);
/// assert_eq!(state.resolve_tap(target), TapOutcome::Scored);
/// assert_eq!(state.resolve_tap(target), TapOutcome::AlreadyRetired);
/// assert_eq!(state.score(), 1);
/// assert!(state.is_complete());
/// ```
#[derive(Debug, Clone)]
pub struct SessionState {
    grid: SlotGrid,
    targets: BTreeMap<TargetId, Target>,
    total: u32,
    remaining: u32,
    active: u32,
    retired: u32,
    score: u32,
    // Pending records; the rest of `remaining` has not been materialized yet.
    scheduled: u32,
    status: SessionStatus,
}

impl SessionState {
    /// A fresh session of `total` targets on `grid`.
    #[must_use]
    pub fn new(total: u32, grid: SlotGrid) -> Self {
        let mut state = Self {
            grid,
            targets: BTreeMap::new(),
            total,
            remaining: total,
            active: 0,
            retired: 0,
            score: 0,
            scheduled: 0,
            status: SessionStatus::Running,
        };
        state.update_status();
        state
    }

    /// The board.
    #[must_use]
    pub fn grid(&self) -> &SlotGrid {
        &self.grid
    }

    /// Local score.
    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Targets that have neither spawned nor been dropped.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Targets in the session.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Visible targets.
    #[must_use]
    pub fn active_count(&self) -> u32 {
        self.active
    }

    /// Retired targets.
    #[must_use]
    pub fn retired_count(&self) -> u32 {
        self.retired
    }

    /// Running or complete.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// `true` once nothing is left to spawn and nothing is visible.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining == 0 && self.active == 0
    }

    /// Looks up a target.
    #[must_use]
    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    /// All known targets in id order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> + '_ {
        self.targets.values()
    }

    /// Targets counted in `remaining` that have no record yet.
    #[must_use]
    pub fn unregistered(&self) -> u32 {
        self.remaining - self.scheduled
    }

    /// Adds a pending target produced by the scheduler.
    ///
    /// Returns `false` without change if the id is known or every target is already
    /// registered.
    ///
    /// # Panics
    ///
    /// If the target's slot is off the board.
    pub(crate) fn register(&mut self, target: Target) -> bool {
        assert!(
            target.slot().is_valid_for(self.grid.len()),
            "slot index {} out of range for a board of {} slots",
            target.slot(),
            self.grid.len()
        );
        if self.unregistered() == 0 || self.targets.contains_key(&target.id()) {
            return false;
        }
        self.scheduled += 1;
        self.targets.insert(target.id(), target);
        true
    }

    /// Fire-time claim: a pending target takes its slot if the slot is empty.
    pub(crate) fn activate(&mut self, id: TargetId, at: SimTime) -> ClaimResult {
        let Some(target) = self.targets.get_mut(&id) else {
            return ClaimResult::NotPending;
        };
        if target.state() != TargetState::Pending {
            return ClaimResult::NotPending;
        }
        target.attempts += 1;
        let slot = target.slot();
        if !self.grid.try_claim(slot, id) {
            return ClaimResult::Occupied(slot);
        }
        target.state = TargetState::Active { since: at };
        self.scheduled -= 1;
        self.remaining -= 1;
        self.active += 1;
        self.update_status();
        ClaimResult::Claimed(slot)
    }

    /// Records a deferred claim's new fire time.
    pub(crate) fn defer(&mut self, id: TargetId, retry_at: SimTime) {
        if let Some(target) = self.targets.get_mut(&id) {
            target.fire_at = retry_at;
        }
    }

    /// Drops a pending target that never found a free slot.
    pub(crate) fn starve(&mut self, id: TargetId) -> bool {
        match self.targets.get_mut(&id) {
            Some(target) if target.state() == TargetState::Pending => {
                target.state = TargetState::Retired {
                    reason: RetireReason::Starved,
                };
                self.scheduled -= 1;
                self.remaining -= 1;
                self.retired += 1;
                self.update_status();
                true
            },
            _ => false,
        }
    }

    /// Resolves a tap on `id`.
    pub fn resolve_tap(&mut self, id: TargetId) -> TapOutcome {
        match self.targets.get(&id).map(Target::state) {
            Some(TargetState::Active { .. }) => {
                self.retire(id, RetireReason::Hit);
                self.score += 1;
                TapOutcome::Scored
            },
            Some(TargetState::Retired { .. }) => TapOutcome::AlreadyRetired,
            Some(TargetState::Pending) | None => TapOutcome::Unknown,
        }
    }

    /// Retires an active target and frees its slot. Returns the slot, or `None` if the
    /// target was not active.
    pub fn retire(&mut self, id: TargetId, reason: RetireReason) -> Option<SlotIndex> {
        let target = self.targets.get_mut(&id)?;
        if !target.state().is_active() {
            return None;
        }
        target.state = TargetState::Retired { reason };
        let slot = target.slot();
        self.grid.release(slot);
        self.active -= 1;
        self.retired += 1;
        self.update_status();
        Some(slot)
    }

    /// Mirrors a placement made by another peer. Idempotent.
    pub fn apply_placement(
        &mut self,
        id: TargetId,
        slot: SlotIndex,
        at: SimTime,
    ) -> PlacementOutcome {
        if self.targets.contains_key(&id) {
            return PlacementOutcome::DuplicateAnchor;
        }
        let Some(existing) = self.grid.get(slot) else {
            return PlacementOutcome::SlotOutOfRange;
        };
        if !existing.occupancy().is_empty() {
            return PlacementOutcome::SlotOccupied;
        }
        if self.unregistered() == 0 {
            return PlacementOutcome::Exhausted;
        }
        self.grid.try_claim(slot, id);
        let mut target = Target::new(id, slot, at);
        target.attempts = 1;
        target.state = TargetState::Active { since: at };
        self.targets.insert(id, target);
        self.remaining -= 1;
        self.active += 1;
        self.update_status();
        PlacementOutcome::Applied
    }

    /// Mirrors a starvation drop announced by the host. Idempotent; `true` if applied.
    pub fn apply_drop(&mut self, id: TargetId) -> bool {
        if self.targets.contains_key(&id) || self.unregistered() == 0 {
            return false;
        }
        // A dropped target never had a slot.
        let mut target = Target::new(id, SlotIndex::new(0), SimTime::ZERO);
        target.state = TargetState::Retired {
            reason: RetireReason::Starved,
        };
        self.targets.insert(id, target);
        self.remaining -= 1;
        self.retired += 1;
        self.update_status();
        true
    }

    /// Mirrors a retirement announced by another peer. Idempotent.
    ///
    /// An unknown id means the retirement overtook its placement; the target is recorded
    /// as retired so the late placement is ignored. Returns the freed slot when a visible
    /// target was removed.
    pub fn apply_retire(&mut self, id: TargetId, slot: SlotIndex) -> Option<SlotIndex> {
        match self.targets.get(&id).map(Target::state) {
            Some(TargetState::Active { .. }) => self.retire(id, RetireReason::Remote),
            Some(_) => None,
            None => {
                if self.unregistered() > 0 {
                    let mut target = Target::new(id, slot, SimTime::ZERO);
                    target.state = TargetState::Retired {
                        reason: RetireReason::Remote,
                    };
                    self.targets.insert(id, target);
                    self.remaining -= 1;
                    self.retired += 1;
                    self.update_status();
                }
                None
            },
        }
    }

    /// Replaces the target total with the one the host announced. Targets already spawned
    /// or dropped stay accounted for and `remaining` takes up the difference.
    ///
    /// Returns `false` without change when `total` is zero, smaller than what is already
    /// accounted for, or when pending targets exist. Not meant for an ended session.
    pub fn adopt_total(&mut self, total: u32) -> bool {
        let accounted = self.active + self.retired;
        if total == 0 || total < accounted || self.scheduled > 0 {
            return false;
        }
        self.total = total;
        self.remaining = total - accounted;
        self.status = if self.is_complete() {
            SessionStatus::Complete
        } else {
            SessionStatus::Running
        };
        true
    }

    /// Ends the session: visible and pending targets retire with
    /// [`RetireReason::SessionEnded`] and the status becomes complete.
    ///
    /// Returns the targets that were visible, with the slots they vacated.
    pub fn end(&mut self) -> Vec<(TargetId, SlotIndex)> {
        let mut vacated = Vec::new();
        for target in self.targets.values_mut() {
            match target.state() {
                TargetState::Active { .. } => {
                    self.grid.release(target.slot());
                    vacated.push((target.id(), target.slot()));
                },
                TargetState::Pending => {},
                TargetState::Retired { .. } => continue,
            }
            target.state = TargetState::Retired {
                reason: RetireReason::SessionEnded,
            };
        }
        self.retired += self.active + self.remaining;
        self.active = 0;
        self.remaining = 0;
        self.scheduled = 0;
        self.status = SessionStatus::Complete;
        vacated
    }

    /// Copies the state for comparison.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let occupancy: Vec<Occupancy> = self.grid.slots().iter().map(|s| s.occupancy()).collect();
        let targets: Vec<TargetRecord> = self
            .targets
            .values()
            .map(|t| TargetRecord {
                id: t.id(),
                slot: t.slot(),
                state: t.state(),
            })
            .collect();
        let checksum = fnv1a_hash(&(
            self.score,
            self.remaining,
            self.active,
            self.retired,
            self.total,
            self.status,
            &occupancy,
            &targets,
        ));
        SessionSnapshot {
            score: self.score,
            remaining: self.remaining,
            active: self.active,
            retired: self.retired,
            total: self.total,
            status: self.status,
            occupancy,
            targets,
            checksum,
        }
    }

    fn update_status(&mut self) {
        if self.is_complete() {
            self.status = SessionStatus::Complete;
        }
    }
}

impl InvariantChecker for SessionState {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.remaining + self.active + self.retired != self.total {
            return Err(
                InvariantViolation::new("SessionState", "remaining + active + retired != total")
                    .with_details(format!(
                        "remaining={}, active={}, retired={}, total={}",
                        self.remaining, self.active, self.retired, self.total
                    )),
            );
        }
        if self.scheduled > self.remaining {
            return Err(InvariantViolation::new(
                "SessionState",
                "more pending records than remaining targets",
            )
            .with_details(format!(
                "scheduled={}, remaining={}",
                self.scheduled, self.remaining
            )));
        }
        let pending = self
            .targets
            .values()
            .filter(|t| t.state() == TargetState::Pending)
            .count();
        if pending != self.scheduled as usize {
            return Err(InvariantViolation::new(
                "SessionState",
                "pending record count out of sync",
            )
            .with_details(format!("records={}, counter={}", pending, self.scheduled)));
        }
        let occupied = self.grid.occupied_count();
        if occupied != self.active as usize {
            return Err(InvariantViolation::new(
                "SessionState",
                "active count differs from occupied slots",
            )
            .with_details(format!("active={}, occupied={}", self.active, occupied)));
        }
        for target in self.targets.values() {
            if target.state().is_active()
                && self.grid.occupancy(target.slot()) != Occupancy::Occupied(target.id())
            {
                return Err(InvariantViolation::new(
                    "SessionState",
                    "active target does not hold its slot",
                )
                .with_details(format!("target={}, slot={}", target.id(), target.slot())));
            }
        }
        if self.score > self.retired {
            return Err(InvariantViolation::new(
                "SessionState",
                "score exceeds retired targets",
            ));
        }
        Ok(())
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
    use crate::slot_grid::BoardDimensions;

    fn state(total: u32) -> SessionState {
        SessionState::new(total, SlotGrid::build(16, BoardDimensions::default()))
    }

    fn pending(id: u128, slot: usize) -> Target {
        Target::new(TargetId::new(id), SlotIndex::new(slot), SimTime::ZERO)
    }

    #[test]
    fn new_state_counts_everything_as_remaining() {
        let state = state(15);
        assert_eq!(state.remaining(), 15);
        assert_eq!(state.score(), 0);
        assert_eq!(state.status(), SessionStatus::Running);
        assert!(!state.is_complete());
        state.check_invariants().unwrap();
    }

    #[test]
    fn activation_moves_remaining_to_active() {
        let mut state = state(2);
        assert!(state.register(pending(1, 3)));
        assert!(matches!(
            state.activate(TargetId::new(1), SimTime::from_millis(10)),
            ClaimResult::Claimed(_)
        ));
        assert_eq!(state.remaining(), 1);
        assert_eq!(state.active_count(), 1);
        assert_eq!(
            state.grid().occupancy(SlotIndex::new(3)),
            Occupancy::Occupied(TargetId::new(1))
        );
        state.check_invariants().unwrap();
    }

    #[test]
    fn activation_on_occupied_slot_leaves_target_pending() {
        let mut state = state(2);
        state.register(pending(1, 3));
        state.register(pending(2, 3));
        state.activate(TargetId::new(1), SimTime::ZERO);
        assert!(matches!(
            state.activate(TargetId::new(2), SimTime::ZERO),
            ClaimResult::Occupied(_)
        ));
        assert_eq!(
            state.target(TargetId::new(2)).unwrap().state(),
            TargetState::Pending
        );
        assert_eq!(state.target(TargetId::new(2)).unwrap().attempts(), 1);
        state.check_invariants().unwrap();
    }

    #[test]
    fn register_refuses_more_than_total() {
        let mut state = state(1);
        assert!(state.register(pending(1, 1)));
        assert!(!state.register(pending(2, 2)));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn register_off_board_panics() {
        let mut state = state(1);
        state.register(pending(1, 16));
    }

    #[test]
    fn tap_scores_once() {
        let mut state = state(1);
        state.register(pending(1, 2));
        state.activate(TargetId::new(1), SimTime::ZERO);
        assert_eq!(state.resolve_tap(TargetId::new(1)), TapOutcome::Scored);
        assert_eq!(state.score(), 1);
        assert!(state.grid().occupancy(SlotIndex::new(2)).is_empty());
        assert_eq!(state.remaining(), 0);
        assert_eq!(state.status(), SessionStatus::Complete);
        assert_eq!(
            state.resolve_tap(TargetId::new(1)),
            TapOutcome::AlreadyRetired
        );
        assert_eq!(state.score(), 1);
        state.check_invariants().unwrap();
    }

    #[test]
    fn stale_taps_change_nothing() {
        let mut state = state(2);
        state.register(pending(1, 2));
        let before = state.snapshot();
        assert_eq!(state.resolve_tap(TargetId::new(99)), TapOutcome::Unknown);
        assert_eq!(state.resolve_tap(TargetId::new(1)), TapOutcome::Unknown);
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn starvation_counts_as_retired() {
        let mut state = state(1);
        state.register(pending(1, 2));
        assert!(state.starve(TargetId::new(1)));
        assert!(!state.starve(TargetId::new(1)));
        assert_eq!(state.remaining(), 0);
        assert_eq!(state.retired_count(), 1);
        assert!(state.is_complete());
        state.check_invariants().unwrap();
    }

    #[test]
    fn applying_a_placement_twice_equals_once() {
        let mut state = state(3);
        let id = TargetId::new(5);
        assert_eq!(
            state.apply_placement(id, SlotIndex::new(5), SimTime::ZERO),
            PlacementOutcome::Applied
        );
        let once = state.snapshot();
        assert_eq!(
            state.apply_placement(id, SlotIndex::new(5), SimTime::ZERO),
            PlacementOutcome::DuplicateAnchor
        );
        assert_eq!(state.snapshot(), once);
    }

    #[test]
    fn placement_on_occupied_slot_is_noop() {
        let mut state = state(3);
        state.apply_placement(TargetId::new(1), SlotIndex::new(5), SimTime::ZERO);
        let before = state.snapshot();
        assert_eq!(
            state.apply_placement(TargetId::new(2), SlotIndex::new(5), SimTime::ZERO),
            PlacementOutcome::SlotOccupied
        );
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn placement_off_board_is_rejected() {
        let mut state = state(3);
        assert_eq!(
            state.apply_placement(TargetId::new(1), SlotIndex::new(40), SimTime::ZERO),
            PlacementOutcome::SlotOutOfRange
        );
    }

    #[test]
    fn placement_beyond_total_is_rejected() {
        let mut state = state(1);
        state.apply_placement(TargetId::new(1), SlotIndex::new(1), SimTime::ZERO);
        assert_eq!(
            state.apply_placement(TargetId::new(2), SlotIndex::new(2), SimTime::ZERO),
            PlacementOutcome::Exhausted
        );
    }

    #[test]
    fn remote_retire_frees_slot_without_scoring() {
        let mut state = state(2);
        let id = TargetId::new(1);
        state.apply_placement(id, SlotIndex::new(4), SimTime::ZERO);
        assert_eq!(state.apply_retire(id, SlotIndex::new(4)), Some(SlotIndex::new(4)));
        assert_eq!(state.score(), 0);
        assert!(state.grid().occupancy(SlotIndex::new(4)).is_empty());
        assert_eq!(state.apply_retire(id, SlotIndex::new(4)), None);
        state.check_invariants().unwrap();
    }

    #[test]
    fn retire_overtaking_placement_suppresses_it() {
        let mut state = state(2);
        let id = TargetId::new(1);
        assert_eq!(state.apply_retire(id, SlotIndex::new(4)), None);
        assert_eq!(state.remaining(), 1);
        assert_eq!(
            state.apply_placement(id, SlotIndex::new(4), SimTime::ZERO),
            PlacementOutcome::DuplicateAnchor
        );
        assert!(state.grid().occupancy(SlotIndex::new(4)).is_empty());
        state.check_invariants().unwrap();
    }

    #[test]
    fn remote_drop_is_idempotent() {
        let mut state = state(2);
        assert!(state.apply_drop(TargetId::new(8)));
        assert!(!state.apply_drop(TargetId::new(8)));
        assert_eq!(state.remaining(), 1);
        state.check_invariants().unwrap();
    }

    #[test]
    fn adopted_total_keeps_accounted_targets() {
        let mut replica = state(15);
        replica.apply_placement(TargetId::new(1), SlotIndex::new(3), SimTime::ZERO);
        replica.apply_drop(TargetId::new(2));

        assert!(replica.adopt_total(4));
        assert_eq!(replica.total(), 4);
        assert_eq!(replica.remaining(), 2);
        replica.check_invariants().unwrap();

        assert!(!replica.adopt_total(1));
        assert!(!replica.adopt_total(0));
        assert_eq!(replica.total(), 4);
    }

    #[test]
    fn adopted_total_can_reopen_or_complete() {
        let mut replica = state(1);
        replica.apply_placement(TargetId::new(1), SlotIndex::new(3), SimTime::ZERO);
        replica.resolve_tap(TargetId::new(1));
        assert_eq!(replica.status(), SessionStatus::Complete);

        assert!(replica.adopt_total(2));
        assert_eq!(replica.status(), SessionStatus::Running);
        assert!(replica.adopt_total(1));
        assert_eq!(replica.status(), SessionStatus::Complete);
        assert!(replica.is_complete());
    }

    #[test]
    fn host_with_pending_targets_keeps_its_total() {
        let mut host = state(2);
        assert!(host.register(pending(1, 4)));
        assert!(!host.adopt_total(5));
        assert_eq!(host.total(), 2);
    }

    #[test]
    fn end_retires_everything() {
        let mut state = state(3);
        state.register(pending(1, 1));
        state.register(pending(2, 2));
        state.activate(TargetId::new(1), SimTime::ZERO);
        let vacated = state.end();
        assert_eq!(vacated, vec![(TargetId::new(1), SlotIndex::new(1))]);
        assert_eq!(state.remaining(), 0);
        assert_eq!(state.retired_count(), 3);
        assert_eq!(state.grid().occupied_count(), 0);
        assert_eq!(state.status(), SessionStatus::Complete);
        state.check_invariants().unwrap();
    }

    #[test]
    fn checksum_includes_local_spawn_times() {
        let mut early = state(1);
        let mut late = state(1);
        early.apply_placement(TargetId::new(1), SlotIndex::new(3), SimTime::from_millis(5));
        late.apply_placement(TargetId::new(1), SlotIndex::new(3), SimTime::from_millis(40));

        assert_eq!(early.snapshot().occupancy, late.snapshot().occupancy);
        assert_ne!(early.snapshot().checksum, late.snapshot().checksum);
    }

    #[test]
    fn snapshot_checksum_tracks_changes() {
        let mut state = state(2);
        let before = state.snapshot();
        state.apply_placement(TargetId::new(1), SlotIndex::new(1), SimTime::ZERO);
        let after = state.snapshot();
        assert_ne!(before.checksum, after.checksum);
        assert_eq!(after.checksum, state.snapshot().checksum);
    }
}
