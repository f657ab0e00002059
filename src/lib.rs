//! # Whack Sync
//!
//! Whack Sync is the session core of a collaborative augmented-reality "whack-a-mole"
//! reflex game. Co-located peers share one AR world reference and one board of slots;
//! a single host schedules targets ("moles") onto free slots and every guest mirrors the
//! placements.
//!
//! The crate owns only the parts that are easy to get wrong:
//! - the [`SlotGrid`] occupancy model that prevents two targets sharing a slot,
//! - the [`SpawnScheduler`] that draws randomized fire times and defers colliding targets,
//! - the [`SessionState`] counters (score, remaining targets, completion),
//! - the host/guest sync protocol and its tagged binary wire format.
//!
//! Rendering, plane detection, gestures and audio stay with the platform. The platform
//! feeds the core tap results and transport payloads, and receives [`WhackEvent`]s that a
//! [`RenderSink`] turns into visual changes. Like the request-driven control flow it is
//! modelled on, nothing here registers callbacks: the application calls
//! [`WhackSession::poll`] and drains events.
//!
//! ```
//! use whack_sync::prelude::*;
//!
//! # fn main() -> Result<(), WhackError> {
//! let network = MemoryNetwork::<u8>::new();
//! let clock = ManualClock::new();
//! let mut host = SessionBuilder::<u8>::new()
//!     .with_role(Role::Host)
//!     .with_schedule_config(ScheduleConfig::deterministic(7))
//!     .with_clock(clock.clone())
//!     .start_session(network.endpoint(0))?;
//!
//! clock.advance_millis(31_000);
//! host.poll();
//! let spawned = host
//!     .events()
//!     .filter(|event| matches!(event, WhackEvent::Spawned { .. }))
//!     .count();
//! assert!(spawned > 0);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
use std::{fmt::Debug, hash::Hash};

pub use dispatch::{EventDispatcher, RenderSink};
pub use error::{WhackError, WhackResult};
pub use network::chaos_transport::{ChaosConfig, ChaosConfigBuilder, ChaosStats, ChaosTransport};
pub use network::memory_transport::{MemoryNetwork, MemoryTransport};
pub use network::messages::{AnchorPlacement, SyncMessage};
pub use network::protocol::{elect_host, SyncWarningKind};
pub use network::udp_transport::UdpTransport;
pub use session_state::{SessionSnapshot, SessionState, TapOutcome, TargetRecord};
pub use sessions::builder::SessionBuilder;
pub use sessions::config::{
    BackoffPolicy, BoardConfig, ExpiryPolicy, ProtocolConfig, ScheduleConfig,
};
pub use sessions::event_drain::EventDrain;
pub use sessions::whack_session::WhackSession;
pub use slot_grid::{BoardDimensions, Occupancy, Pose, Position, Slot, SlotGrid};
pub use spawn_scheduler::{ScheduleOutcome, SpawnScheduler, Target, TargetState};
pub use time::{Clock, ManualClock, SimTime, SystemClock};

#[doc(hidden)]
pub mod error;
pub mod dispatch;
pub mod hash;
/// Random number generator based on PCG32.
///
/// Seeded instances make schedules reproducible across replays and tests.
pub mod rng;
pub mod session_state;
pub mod slot_grid;
pub mod spawn_scheduler;
pub mod telemetry;
pub mod time;
#[doc(hidden)]
pub mod sessions {
    #[doc(hidden)]
    pub mod builder;
    pub mod config;
    #[doc(hidden)]
    pub mod event_drain;
    #[doc(hidden)]
    pub mod peer_registry;
    #[doc(hidden)]
    pub mod whack_session;
}
/// Wire messages, the host/guest protocol and the bundled transports.
pub mod network {
    pub mod chaos_transport;
    /// Binary codec for sync message serialization.
    ///
    /// Wraps bincode behind a single configuration and adds the one-byte message tag.
    pub mod codec;
    pub mod memory_transport;
    #[doc(hidden)]
    pub mod messages;
    #[doc(hidden)]
    pub mod protocol;
    /// Non-blocking UDP transport for peers on the same network.
    pub mod udp_transport;
}
pub mod prelude;

/// Internal module exposing implementation details for testing, fuzzing and benchmarks.
///
/// Nothing here is covered by semver guarantees.
#[doc(hidden)]
pub mod __internal {
    pub use crate::network::codec::{decode_message, encode_message, Envelope};
    pub use crate::network::protocol::{Inbound, SyncProtocol};
    pub use crate::sessions::peer_registry::{PeerRegistry, PeerSession};
}

// #############
// #   TYPES   #
// #############

/// Index of a slot on the board.
///
/// Slot indices are stable for the lifetime of a session: slot `i` always refers to the
/// same board position on every peer.
///
/// # Examples
///
/// ```
/// use whack_sync::SlotIndex;
///
/// let slot = SlotIndex::new(5);
/// assert_eq!(slot.as_usize(), 5);
/// assert!(slot.is_valid_for(16));
/// assert!(!slot.is_valid_for(5));
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Creates a new `SlotIndex`. Not validated against any board.
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        SlotIndex(index)
    }

    /// Returns the underlying `usize` value.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns `true` if this index addresses a slot on a board of `slot_count` slots.
    #[inline]
    #[must_use]
    pub const fn is_valid_for(self, slot_count: usize) -> bool {
        self.0 < slot_count
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for SlotIndex {
    #[inline]
    fn from(value: usize) -> Self {
        SlotIndex(value)
    }
}

impl From<SlotIndex> for usize {
    #[inline]
    fn from(slot: SlotIndex) -> Self {
        slot.0
    }
}

/// Unique identifier of a target, doubling as the 16-byte AR anchor id on the wire.
///
/// The host builds ids from a per-session nonce (high 64 bits) and the target's schedule
/// index (low 64 bits), so ids are unique across sessions yet reproducible under a seed.
///
/// # Examples
///
/// ```
/// use whack_sync::TargetId;
///
/// let id = TargetId::from_parts(0xABCD, 3);
/// assert_eq!(id.sequence(), 3);
/// assert_eq!(TargetId::from_bytes(id.to_bytes()), id);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct TargetId(u128);

impl TargetId {
    /// Creates a `TargetId` from its raw 128-bit value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u128) -> Self {
        TargetId(raw)
    }

    /// Combines a session nonce and a schedule sequence number.
    #[inline]
    #[must_use]
    pub const fn from_parts(nonce: u64, sequence: u64) -> Self {
        TargetId(((nonce as u128) << 64) | sequence as u128)
    }

    /// Returns the raw 128-bit value.
    #[inline]
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// The schedule sequence number (low 64 bits).
    #[inline]
    #[must_use]
    pub const fn sequence(self) -> u64 {
        self.0 as u64
    }

    /// Big-endian anchor id bytes.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Inverse of [`TargetId::to_bytes`].
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TargetId(u128::from_be_bytes(bytes))
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

// #############
// #   ENUMS   #
// #############

/// The part a peer plays in a collaborative session. Fixed for the session lifetime.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Role {
    /// Owns the authoritative world reference, schedule and session state.
    #[default]
    Host,
    /// Mirrors the host's placements on a local replica.
    Guest,
}

impl Role {
    /// Returns `true` for [`Role::Host`].
    #[inline]
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }
}

/// A session is always in one of these states. Query it via [`WhackSession::status`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SessionStatus {
    /// Targets are still pending or visible.
    Running,
    /// Every target resolved, or the session was ended.
    Complete,
}

/// Why a target left the board.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RetireReason {
    /// A local tap hit the target.
    Hit,
    /// The visibility window elapsed.
    Expired,
    /// Another peer retired it.
    Remote,
    /// No empty slot was found within the retry budget. The target was never visible.
    Starved,
    /// The session ended while the target was pending or visible.
    SessionEnded,
}

/// Notifications produced by a [`WhackSession`]. Forward them to a [`RenderSink`] with
/// [`EventDispatcher::dispatch`] or match on them directly.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]`; always include a wildcard arm when matching.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WhackEvent<A>
where
    A: PeerAddress,
{
    /// A target became visible at `slot`.
    Spawned {
        /// The slot the target occupies.
        slot: SlotIndex,
        /// The target that appeared.
        target: TargetId,
    },
    /// A visible target was removed from the board.
    Retired {
        /// The target that left.
        target: TargetId,
        /// The slot it vacated.
        slot: SlotIndex,
        /// Why it left.
        reason: RetireReason,
    },
    /// The local score changed.
    ScoreChanged {
        /// The new score.
        score: u32,
    },
    /// The number of targets still to spawn changed.
    RemainingChanged {
        /// Targets that have neither spawned nor been dropped.
        remaining: u32,
    },
    /// A tap resolved to a target that is no longer (or never was) active.
    StaleTap {
        /// The tapped target.
        target: TargetId,
        /// `AlreadyRetired` or `Unknown`.
        outcome: TapOutcome,
    },
    /// A target could not find an empty slot within the retry budget and was dropped.
    SpawnStarved {
        /// The dropped target.
        target: TargetId,
        /// How many claims were attempted.
        attempts: u32,
    },
    /// An inbound payload was dropped. The session continues unchanged.
    SyncWarning {
        /// The peer that sent the payload.
        peer: A,
        /// What was wrong with it.
        kind: SyncWarningKind,
    },
    /// A peer was discovered by the transport.
    PeerJoined {
        /// The new peer.
        peer: A,
    },
    /// A peer disconnected.
    PeerLeft {
        /// The departed peer.
        peer: A,
    },
    /// A guest received the host's world reference and should relocalize with it.
    WorldReferenceReceived {
        /// The peer that sent it.
        peer: A,
        /// The opaque platform world-map blob.
        snapshot: Vec<u8>,
    },
    /// The session reached [`SessionStatus::Complete`].
    SessionComplete {
        /// The final local score.
        score: u32,
    },
}

// #############
// #  TRAITS   #
// #############

/// Bounds every peer address type must satisfy.
///
/// Implemented automatically for any suitable type: `SocketAddr` for UDP links, a
/// platform peer id for multipeer frameworks, or a small integer in tests.
pub trait PeerAddress: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Debug + 'static {}

impl<A> PeerAddress for A where A: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Debug + 'static {}

/// Where an outbound payload should go.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination<A> {
    /// A single peer.
    Peer(A),
    /// Every peer the transport currently knows.
    Broadcast,
}

/// Something the transport observed since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent<A> {
    /// A payload arrived from `from`.
    Received {
        /// Sender.
        from: A,
        /// Raw bytes as sent.
        payload: Vec<u8>,
    },
    /// A new peer became reachable.
    PeerDiscovered(A),
    /// A peer is no longer reachable.
    PeerDisconnected(A),
}

/// This [`Transport`] trait is used to plug the session into whatever peer-to-peer link the
/// platform provides. Payloads are opaque bytes delivered UDP-style: at most once,
/// unordered, unacknowledged. The sync protocol is built so that idempotent application
/// masks loss, duplication and reordering.
///
/// Inbound traffic is pulled, not pushed: [`Transport::receive_all`] returns everything
/// buffered since the last call and the session applies it on its own timeline.
pub trait Transport<A>
where
    A: Clone + PartialEq + Eq + Hash,
{
    /// Sends `payload` to `destination`.
    fn send(&mut self, payload: &[u8], destination: &Destination<A>);

    /// Returns all payloads and discovery events observed since the last call.
    fn receive_all(&mut self) -> Vec<TransportEvent<A>>;
}

impl<A, T> Transport<A> for Box<T>
where
    A: Clone + PartialEq + Eq + Hash,
    T: Transport<A> + ?Sized,
{
    fn send(&mut self, payload: &[u8], destination: &Destination<A>) {
        (**self).send(payload, destination);
    }

    fn receive_all(&mut self) -> Vec<TransportEvent<A>> {
        (**self).receive_all()
    }
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    // ==========================================
    // SlotIndex Tests
    // ==========================================

    #[test]
    fn slot_index_validity() {
        assert!(SlotIndex::new(0).is_valid_for(1));
        assert!(SlotIndex::new(15).is_valid_for(16));
        assert!(!SlotIndex::new(16).is_valid_for(16));
        assert!(!SlotIndex::new(0).is_valid_for(0));
    }

    #[test]
    fn slot_index_conversions() {
        let slot: SlotIndex = 7usize.into();
        let raw: usize = slot.into();
        assert_eq!(raw, 7);
        assert_eq!(slot.to_string(), "7");
    }

    #[test]
    fn slot_index_ordering() {
        assert!(SlotIndex::new(1) < SlotIndex::new(2));
    }

    // ==========================================
    // TargetId Tests
    // ==========================================

    #[test]
    fn target_id_parts() {
        let id = TargetId::from_parts(0xDEAD_BEEF, 42);
        assert_eq!(id.sequence(), 42);
        assert_eq!(id.as_u128() >> 64, 0xDEAD_BEEF);
    }

    #[test]
    fn target_id_bytes_are_big_endian() {
        let id = TargetId::new(1);
        let bytes = id.to_bytes();
        assert_eq!(bytes[15], 1);
        assert!(bytes[..15].iter().all(|b| *b == 0));
        assert_eq!(TargetId::from_bytes(bytes), id);
    }

    #[test]
    fn target_id_display_is_fixed_width_hex() {
        assert_eq!(TargetId::new(0xff).to_string().len(), 32);
        assert!(TargetId::new(0xff).to_string().ends_with("ff"));
    }

    // ==========================================
    // Role / Status Tests
    // ==========================================

    #[test]
    fn role_default_is_host() {
        assert_eq!(Role::default(), Role::Host);
        assert!(Role::Host.is_host());
        assert!(!Role::Guest.is_host());
    }

    #[test]
    fn session_status_debug_format() {
        assert_eq!(format!("{:?}", SessionStatus::Running), "Running");
        assert_eq!(format!("{:?}", SessionStatus::Complete), "Complete");
    }

    // ==========================================
    // WhackEvent Tests
    // ==========================================

    #[test]
    fn whack_event_equality() {
        let a: WhackEvent<u8> = WhackEvent::ScoreChanged { score: 2 };
        let b: WhackEvent<u8> = WhackEvent::ScoreChanged { score: 2 };
        let c: WhackEvent<u8> = WhackEvent::ScoreChanged { score: 3 };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn whack_event_carries_peer_address() {
        let event: WhackEvent<u16> = WhackEvent::PeerJoined { peer: 9000 };
        if let WhackEvent::PeerJoined { peer } = event {
            assert_eq!(peer, 9000);
        } else {
            panic!("Expected PeerJoined event");
        }
    }

    // ==========================================
    // Transport Tests
    // ==========================================

    struct CountingTransport {
        sent: usize,
    }

    impl Transport<u8> for CountingTransport {
        fn send(&mut self, _payload: &[u8], _destination: &Destination<u8>) {
            self.sent += 1;
        }

        fn receive_all(&mut self) -> Vec<TransportEvent<u8>> {
            Vec::new()
        }
    }

    #[test]
    fn boxed_transport_forwards() {
        let mut boxed: Box<dyn Transport<u8>> = Box::new(CountingTransport { sent: 0 });
        boxed.send(&[1, 2, 3], &Destination::Broadcast);
        boxed.send(&[4], &Destination::Peer(2));
        assert!(boxed.receive_all().is_empty());
    }
}
