use serde::{Deserialize, Serialize};

use crate::slot_grid::Pose;
use crate::{SlotIndex, TargetId};

/// A target placed by the host: which anchor, which slot, and the anchor transform.
///
/// The anchor id is the placed target's [`TargetId`] in big-endian bytes.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorPlacement {
    /// 16-byte anchor identifier.
    pub anchor_id: [u8; 16],
    /// Slot the target occupies.
    pub slot: SlotIndex,
    /// Anchor transform relative to the board.
    pub pose: Pose,
}

impl AnchorPlacement {
    /// Builds a placement for `target` at `slot`.
    #[must_use]
    pub const fn new(target: TargetId, slot: SlotIndex, pose: Pose) -> Self {
        Self {
            anchor_id: target.to_bytes(),
            slot,
            pose,
        }
    }

    /// The target this anchor stands for.
    #[must_use]
    pub const fn target(&self) -> TargetId {
        TargetId::from_bytes(self.anchor_id)
    }
}

/// Everything peers say to each other. Each variant has a one-byte wire tag.
///
/// Messages are immutable once built and are consumed exactly once by the receiving
/// protocol.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// The host's opaque AR world map. Tag 0.
    WorldReference {
        /// Platform-serialized world map.
        snapshot: Vec<u8>,
    },
    /// A target appeared. Tag 1.
    AnchorPlacement(AnchorPlacement),
    /// A target left the board on the sender. Tag 2.
    AnchorRetired {
        /// Anchor of the retired target.
        anchor_id: [u8; 16],
        /// Slot it vacated.
        slot: SlotIndex,
    },
    /// The host gave up on a target that never found a free slot. Tag 3.
    TargetDropped {
        /// Anchor of the dropped target.
        anchor_id: [u8; 16],
    },
    /// How many targets the host's session holds, sent to every peer it discovers. Tag 4.
    SessionHeader {
        /// The host's target total.
        total_targets: u32,
    },
}

impl SyncMessage {
    pub(crate) const TAG_WORLD_REFERENCE: u8 = 0;
    pub(crate) const TAG_ANCHOR_PLACEMENT: u8 = 1;
    pub(crate) const TAG_ANCHOR_RETIRED: u8 = 2;
    pub(crate) const TAG_TARGET_DROPPED: u8 = 3;
    pub(crate) const TAG_SESSION_HEADER: u8 = 4;

    /// The wire tag of this variant.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::WorldReference { .. } => Self::TAG_WORLD_REFERENCE,
            Self::AnchorPlacement(_) => Self::TAG_ANCHOR_PLACEMENT,
            Self::AnchorRetired { .. } => Self::TAG_ANCHOR_RETIRED,
            Self::TargetDropped { .. } => Self::TAG_TARGET_DROPPED,
            Self::SessionHeader { .. } => Self::TAG_SESSION_HEADER,
        }
    }

    /// Short variant name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WorldReference { .. } => "world_reference",
            Self::AnchorPlacement(_) => "anchor_placement",
            Self::AnchorRetired { .. } => "anchor_retired",
            Self::TargetDropped { .. } => "target_dropped",
            Self::SessionHeader { .. } => "session_header",
        }
    }
}

impl std::fmt::Debug for SyncMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // World maps run to megabytes; print the size only.
            Self::WorldReference { snapshot } => f
                .debug_struct("WorldReference")
                .field("snapshot_len", &snapshot.len())
                .finish(),
            Self::AnchorPlacement(placement) => f
                .debug_tuple("AnchorPlacement")
                .field(placement)
                .finish(),
            Self::AnchorRetired { anchor_id, slot } => f
                .debug_struct("AnchorRetired")
                .field("anchor_id", &TargetId::from_bytes(*anchor_id))
                .field("slot", slot)
                .finish(),
            Self::TargetDropped { anchor_id } => f
                .debug_struct("TargetDropped")
                .field("anchor_id", &TargetId::from_bytes(*anchor_id))
                .finish(),
            Self::SessionHeader { total_targets } => f
                .debug_struct("SessionHeader")
                .field("total_targets", total_targets)
                .finish(),
        }
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
    use crate::slot_grid::Position;

    #[test]
    fn tags_are_stable() {
        let placement = AnchorPlacement::new(TargetId::new(1), SlotIndex::new(2), Pose::default());
        assert_eq!(SyncMessage::WorldReference { snapshot: vec![] }.tag(), 0);
        assert_eq!(SyncMessage::AnchorPlacement(placement).tag(), 1);
        assert_eq!(
            SyncMessage::AnchorRetired {
                anchor_id: [0; 16],
                slot: SlotIndex::new(0)
            }
            .tag(),
            2
        );
        assert_eq!(SyncMessage::TargetDropped { anchor_id: [0; 16] }.tag(), 3);
        assert_eq!(SyncMessage::SessionHeader { total_targets: 15 }.tag(), 4);
    }

    #[test]
    fn placement_target_round_trips_through_anchor_id() {
        let id = TargetId::from_parts(77, 4);
        let placement = AnchorPlacement::new(
            id,
            SlotIndex::new(5),
            Pose::at(Position::new(0.1, 0.01, -0.1)),
        );
        assert_eq!(placement.target(), id);
    }

    #[test]
    fn world_reference_debug_hides_blob() {
        let msg = SyncMessage::WorldReference {
            snapshot: vec![0xAB; 4096],
        };
        let text = format!("{:?}", msg);
        assert!(text.contains("snapshot_len: 4096"));
        assert!(!text.contains("171"));
    }
}
