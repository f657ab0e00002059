//! The board: a fixed row-major grid of slots that targets occupy.
//!
//! Slots are created once when the board is built and never destroyed. Only occupancy
//! changes, through [`SlotGrid::try_claim`] and [`SlotGrid::release`]. Both peers build the
//! same grid from the same [`BoardDimensions`], so a slot index alone identifies a position.

use serde::{Deserialize, Serialize};

use crate::error::WhackError;
use crate::{SlotIndex, TargetId};

/// Position relative to the board anchor, in meters. `y` is up.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Left/right.
    pub x: f32,
    /// Height above the board plane.
    pub y: f32,
    /// Forward/back.
    pub z: f32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Anchor transform sent with a placement: position plus a unit rotation quaternion
/// `[x, y, z, w]`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Translation.
    pub position: Position,
    /// Rotation quaternion.
    pub rotation: [f32; 4],
}

impl Pose {
    /// A pose at `position` with no rotation.
    #[must_use]
    pub const fn at(position: Position) -> Self {
        Self {
            position,
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// `true` if every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        let p = self.position;
        [p.x, p.y, p.z].iter().chain(self.rotation.iter()).all(|v| v.is_finite())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::at(Position::default())
    }
}

/// Physical layout of the board.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDimensions {
    /// Board extent along x, in meters.
    pub width: f32,
    /// Board extent along z, in meters.
    pub depth: f32,
    /// Distance between neighbouring slot centers.
    pub spacing: f32,
    /// Height of slot centers above the board plane.
    pub slot_height: f32,
}

impl Default for BoardDimensions {
    fn default() -> Self {
        Self {
            width: 0.55,
            depth: 0.55,
            spacing: 0.1,
            slot_height: 0.01,
        }
    }
}

impl BoardDimensions {
    /// Rejects non-finite or non-positive sizes and negative heights.
    pub fn validate(&self) -> Result<(), WhackError> {
        for (field, value) in [
            ("board.width", self.width),
            ("board.depth", self.depth),
            ("board.spacing", self.spacing),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(WhackError::invalid_config(
                    field,
                    format!("must be finite and positive, got {}", value),
                ));
            }
        }
        if !self.slot_height.is_finite() || self.slot_height < 0.0 {
            return Err(WhackError::invalid_config(
                "board.slot_height",
                format!("must be finite and non-negative, got {}", self.slot_height),
            ));
        }
        Ok(())
    }
}

/// Whether a slot currently holds a target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Occupancy {
    /// Free to claim.
    #[default]
    Empty,
    /// Held by the given target.
    Occupied(TargetId),
}

impl Occupancy {
    /// `true` for [`Occupancy::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Occupancy::Empty)
    }

    /// The holder, if any.
    #[must_use]
    pub const fn target(&self) -> Option<TargetId> {
        match self {
            Occupancy::Empty => None,
            Occupancy::Occupied(id) => Some(*id),
        }
    }
}

/// One placement position on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    index: SlotIndex,
    position: Position,
    occupancy: Occupancy,
}

impl Slot {
    /// Stable index of this slot.
    #[must_use]
    pub const fn index(&self) -> SlotIndex {
        self.index
    }

    /// Where the slot sits relative to the board anchor.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Current occupancy.
    #[must_use]
    pub const fn occupancy(&self) -> Occupancy {
        self.occupancy
    }
}

/// A fixed set of slots with occupancy tracking.
///
/// Local callers address slots by index and an out-of-range index is a bug, so
/// [`occupancy`](Self::occupancy), [`try_claim`](Self::try_claim) and
/// [`release`](Self::release) panic on it. Indices from the network must go through
/// [`get`](Self::get) first.
///
/// ```
/// use whack_sync::{BoardDimensions, Occupancy, SlotGrid, SlotIndex, TargetId};
///
/// let mut grid = SlotGrid::build(16, BoardDimensions::default());
/// let slot = SlotIndex::new(5);
/// assert!(grid.try_claim(slot, TargetId::new(1)));
/// assert!(!grid.try_claim(slot, TargetId::new(2)));
/// assert_eq!(grid.occupancy(slot), Occupancy::Occupied(TargetId::new(1)));
/// grid.release(slot);
/// assert!(grid.occupancy(slot).is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotGrid {
    slots: Vec<Slot>,
    dimensions: BoardDimensions,
}

impl SlotGrid {
    /// Lays out `count` empty slots in a centered row-major grid.
    ///
    /// Columns are `ceil(sqrt(count))` and rows `ceil(count / columns)`. The same inputs
    /// always give the same positions.
    #[must_use]
    pub fn build(count: usize, dimensions: BoardDimensions) -> Self {
        let cols = grid_columns(count);
        let rows = if cols == 0 { 0 } else { count.div_ceil(cols) };
        let col_center = (cols.max(1) - 1) as f32 / 2.0;
        let row_center = (rows.max(1) - 1) as f32 / 2.0;

        let slots = (0..count)
            .map(|i| {
                let (row, col) = (i / cols, i % cols);
                Slot {
                    index: SlotIndex::new(i),
                    position: Position::new(
                        (col as f32 - col_center) * dimensions.spacing,
                        dimensions.slot_height,
                        (row as f32 - row_center) * dimensions.spacing,
                    ),
                    occupancy: Occupancy::Empty,
                }
            })
            .collect();

        Self { slots, dimensions }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` for a board without slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The dimensions the grid was built from.
    #[must_use]
    pub const fn dimensions(&self) -> BoardDimensions {
        self.dimensions
    }

    /// All slots in index order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// The slot at `index`, or `None` if it is off the board.
    #[must_use]
    pub fn get(&self, index: SlotIndex) -> Option<&Slot> {
        self.slots.get(index.as_usize())
    }

    /// Occupancy of `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    #[must_use]
    pub fn occupancy(&self, index: SlotIndex) -> Occupancy {
        self.slot(index).occupancy
    }

    /// Claims `index` for `target` if and only if it is empty. Returns whether it did.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn try_claim(&mut self, index: SlotIndex, target: TargetId) -> bool {
        let slot = self.slot_mut(index);
        if slot.occupancy.is_empty() {
            slot.occupancy = Occupancy::Occupied(target);
            true
        } else {
            false
        }
    }

    /// Empties `index`, returning the previous holder. Releasing an empty slot is a no-op.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn release(&mut self, index: SlotIndex) -> Option<TargetId> {
        let slot = self.slot_mut(index);
        std::mem::take(&mut slot.occupancy).target()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !s.occupancy.is_empty())
            .count()
    }

    /// Anchor pose for a target at `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    #[must_use]
    pub fn pose(&self, index: SlotIndex) -> Pose {
        Pose::at(self.slot(index).position)
    }

    fn slot(&self, index: SlotIndex) -> &Slot {
        match self.slots.get(index.as_usize()) {
            Some(slot) => slot,
            None => out_of_range(index, self.slots.len()),
        }
    }

    fn slot_mut(&mut self, index: SlotIndex) -> &mut Slot {
        let len = self.slots.len();
        match self.slots.get_mut(index.as_usize()) {
            Some(slot) => slot,
            None => out_of_range(index, len),
        }
    }
}

fn grid_columns(count: usize) -> usize {
    let mut cols = 0;
    while cols * cols < count {
        cols += 1;
    }
    cols
}

#[cold]
#[track_caller]
#[allow(clippy::panic)]
fn out_of_range(index: SlotIndex, len: usize) -> ! {
    panic!("slot index {} out of range for a board of {} slots", index, len)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn sixteen_slots_make_a_centered_four_by_four() {
        let grid = SlotGrid::build(16, BoardDimensions::default());
        assert_eq!(grid.len(), 16);

        let first = grid.slots()[0].position();
        assert!(close(first.x, -0.15));
        assert!(close(first.z, -0.15));
        assert!(close(first.y, 0.01));

        let last = grid.slots()[15].position();
        assert!(close(last.x, 0.15));
        assert!(close(last.z, 0.15));

        // Row-major: index 4 starts the second row.
        let second_row = grid.slots()[4].position();
        assert!(close(second_row.x, -0.15));
        assert!(close(second_row.z, -0.05));
    }

    #[test]
    fn non_square_counts_fill_rows_first() {
        let grid = SlotGrid::build(5, BoardDimensions::default());
        // 3 columns, 2 rows.
        assert!(close(grid.slots()[0].position().x, -0.1));
        assert!(close(grid.slots()[2].position().x, 0.1));
        assert!(close(grid.slots()[3].position().z, 0.05));
    }

    #[test]
    fn build_is_deterministic() {
        let a = SlotGrid::build(10, BoardDimensions::default());
        let b = SlotGrid::build(10, BoardDimensions::default());
        assert_eq!(a, b);
    }

    #[test]
    fn every_slot_starts_empty() {
        let grid = SlotGrid::build(9, BoardDimensions::default());
        assert!(grid.slots().iter().all(|s| s.occupancy().is_empty()));
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn claim_on_occupied_slot_fails_without_mutation() {
        let mut grid = SlotGrid::build(4, BoardDimensions::default());
        let slot = SlotIndex::new(2);
        assert!(grid.try_claim(slot, TargetId::new(10)));
        let before = grid.clone();
        assert!(!grid.try_claim(slot, TargetId::new(11)));
        assert_eq!(grid, before);
    }

    #[test]
    fn release_is_idempotent() {
        let mut grid = SlotGrid::build(4, BoardDimensions::default());
        let slot = SlotIndex::new(1);
        grid.try_claim(slot, TargetId::new(3));
        assert_eq!(grid.release(slot), Some(TargetId::new(3)));
        assert_eq!(grid.release(slot), None);
        assert!(grid.occupancy(slot).is_empty());
    }

    #[test]
    fn get_is_non_panicking() {
        let grid = SlotGrid::build(4, BoardDimensions::default());
        assert!(grid.get(SlotIndex::new(3)).is_some());
        assert!(grid.get(SlotIndex::new(4)).is_none());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn occupancy_out_of_range_panics() {
        let grid = SlotGrid::build(4, BoardDimensions::default());
        let _ = grid.occupancy(SlotIndex::new(4));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn claim_out_of_range_panics() {
        let mut grid = SlotGrid::build(4, BoardDimensions::default());
        grid.try_claim(SlotIndex::new(99), TargetId::new(1));
    }

    #[test]
    fn pose_matches_slot_position() {
        let grid = SlotGrid::build(16, BoardDimensions::default());
        let pose = grid.pose(SlotIndex::new(5));
        assert_eq!(pose.position, grid.slots()[5].position());
        assert_eq!(pose.rotation, [0.0, 0.0, 0.0, 1.0]);
        assert!(pose.is_finite());
    }

    #[test]
    fn dimensions_validation() {
        assert!(BoardDimensions::default().validate().is_ok());
        let bad = BoardDimensions {
            spacing: f32::NAN,
            ..BoardDimensions::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(WhackError::InvalidConfig {
                field: "board.spacing",
                ..
            })
        ));
        let sunk = BoardDimensions {
            slot_height: -1.0,
            ..BoardDimensions::default()
        };
        assert!(sunk.validate().is_err());
    }

    #[test]
    fn empty_board_builds() {
        let grid = SlotGrid::build(0, BoardDimensions::default());
        assert!(grid.is_empty());
    }
}
