//! Host/guest sync protocol.
//!
//! [`SyncProtocol`] sits between the session and the transport. Outbound messages are
//! wrapped in a sequenced envelope, encoded and queued until [`SyncProtocol::flush`];
//! inbound payloads are decoded, checked against the sender's authority and the local
//! board, and handed back as [`Inbound`] values or as a [`SyncWarningKind`] explaining why
//! they were dropped.
//!
//! Authority: the host alone sends world references, placements, drops and the session
//! header. A guest built with a host address accepts them from that peer only. Without
//! one, it adopts the first peer whose message passes validation and rejects the same
//! messages from anyone else. Retirements may come from any peer.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace};

use crate::error::{WhackError, WhackResult};
use crate::network::codec::{decode_message, encode_message, CodecError, CodecResult, Envelope};
use crate::network::messages::SyncMessage;
use crate::sessions::config::ProtocolConfig;
use crate::sessions::peer_registry::PeerRegistry;
use crate::slot_grid::Pose;
use crate::{Destination, PeerAddress, Role, SimTime, SlotIndex, TargetId, Transport};

/// Why an inbound payload was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncWarningKind {
    /// The payload could not be decoded.
    Malformed(CodecError),
    /// A slot index outside the local board.
    SlotOutOfRange {
        /// The slot named in the message.
        slot: SlotIndex,
        /// Slots on the local board.
        slot_count: usize,
    },
    /// A placement whose pose contains NaN or infinity.
    InvalidPose {
        /// The placed target.
        target: TargetId,
    },
    /// A host-only message from a peer that is not the host.
    NotAuthoritative {
        /// Which message it was.
        message: &'static str,
    },
    /// A world reference larger than the configured limit.
    OversizedWorldReference {
        /// Bytes received.
        len: usize,
        /// Bytes allowed.
        max: usize,
    },
    /// A placement or drop for a target beyond the session's total.
    TargetCountExceeded {
        /// The extra target.
        target: TargetId,
    },
    /// A session header whose total is zero or below the targets already seen.
    InvalidTargetTotal {
        /// The announced total.
        total: u32,
        /// Targets this replica has already spawned or dropped.
        accounted: u32,
    },
}

impl fmt::Display for SyncWarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed payload: {err}"),
            Self::SlotOutOfRange { slot, slot_count } => {
                write!(f, "slot {slot} is outside a board of {slot_count} slots")
            },
            Self::InvalidPose { target } => write!(f, "non-finite pose for target {target}"),
            Self::NotAuthoritative { message } => {
                write!(f, "{message} from a peer that is not the host")
            },
            Self::OversizedWorldReference { len, max } => {
                write!(f, "world reference of {len} bytes exceeds the {max}-byte limit")
            },
            Self::TargetCountExceeded { target } => {
                write!(f, "target {target} exceeds the session's target count")
            },
            Self::InvalidTargetTotal { total, accounted } => write!(
                f,
                "announced total of {total} targets with {accounted} already accounted for"
            ),
        }
    }
}

impl From<CodecError> for SyncWarningKind {
    fn from(err: CodecError) -> Self {
        Self::Malformed(err)
    }
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The host's world map.
    WorldReference {
        /// Opaque platform blob.
        snapshot: Vec<u8>,
    },
    /// The host placed a target.
    Placement {
        /// The placed target.
        target: TargetId,
        /// Its slot, checked against the local board.
        slot: SlotIndex,
        /// The anchor transform.
        pose: Pose,
    },
    /// A peer retired a target.
    Retired {
        /// The retired target.
        target: TargetId,
        /// The slot it vacated.
        slot: SlotIndex,
    },
    /// The host dropped a target that never spawned.
    Dropped {
        /// The dropped target.
        target: TargetId,
    },
    /// The host's target total.
    SessionHeader {
        /// Targets in the host's session.
        total_targets: u32,
    },
}

/// Per-replica protocol state: role, outbound sequence, peers and the send queue.
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and fuzzing.
/// It is not part of the stable public API.
#[derive(Debug)]
pub struct SyncProtocol<A: PeerAddress> {
    role: Role,
    config: ProtocolConfig,
    slot_count: usize,
    next_seq: u64,
    peers: PeerRegistry<A>,
    world_reference: Option<Vec<u8>>,
    total_targets: Option<u32>,
    send_queue: VecDeque<(Destination<A>, Vec<u8>)>,
}

impl<A: PeerAddress> SyncProtocol<A> {
    /// Creates a protocol for a board of `slot_count` slots.
    #[must_use]
    pub fn new(role: Role, config: ProtocolConfig, slot_count: usize) -> Self {
        Self {
            role,
            config,
            slot_count,
            next_seq: 0,
            peers: PeerRegistry::new(),
            world_reference: None,
            total_targets: None,
            send_queue: VecDeque::new(),
        }
    }

    /// Fixes the host a guest listens to. Host-only messages from any other peer are
    /// rejected from the start.
    pub fn set_host(&mut self, host: A) {
        debug!(?host, "Host set");
        self.peers.set_host(host);
    }

    /// The target total announced to each peer discovered from now on. Only hosts set it.
    pub fn set_total_targets(&mut self, total: u32) {
        self.total_targets = Some(total);
    }

    /// This replica's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Connected peers.
    pub fn peers(&self) -> &PeerRegistry<A> {
        &self.peers
    }

    /// The host's world reference: set locally on the host, last received on a guest.
    #[must_use]
    pub fn world_reference(&self) -> Option<&[u8]> {
        self.world_reference.as_deref()
    }

    /// Sequence number the next outbound message will carry.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Payloads waiting for [`SyncProtocol::flush`].
    #[must_use]
    pub fn queued(&self) -> usize {
        self.send_queue.len()
    }

    /// Encodes `message` under the next sequence number and queues it.
    pub fn send(&mut self, message: SyncMessage, destination: Destination<A>) -> CodecResult<()> {
        let envelope = Envelope {
            seq: self.next_seq,
            message,
        };
        let payload = encode_message(&envelope)?;
        trace!(
            seq = envelope.seq,
            kind = envelope.message.kind(),
            bytes = payload.len(),
            ?destination,
            "Queued sync message"
        );
        self.next_seq += 1;
        self.send_queue.push_back((destination, payload));
        Ok(())
    }

    /// Hands every queued payload to `transport`. Returns how many were sent.
    pub fn flush<T: Transport<A> + ?Sized>(&mut self, transport: &mut T) -> usize {
        let count = self.send_queue.len();
        for (destination, payload) in self.send_queue.drain(..) {
            transport.send(&payload, &destination);
        }
        count
    }

    /// Stores the host's world reference and broadcasts it.
    ///
    /// # Errors
    ///
    /// [`WhackError::InvalidRequest`] on a guest or when the snapshot exceeds
    /// `max_world_reference_bytes`; [`WhackError::Codec`] if it cannot be encoded.
    pub fn set_world_reference(&mut self, snapshot: Vec<u8>) -> WhackResult<()> {
        if !self.role.is_host() {
            return Err(WhackError::InvalidRequest {
                info: "only the host publishes a world reference".to_owned(),
            });
        }
        if snapshot.len() > self.config.max_world_reference_bytes {
            return Err(WhackError::InvalidRequest {
                info: format!(
                    "world reference of {} bytes exceeds the {}-byte limit",
                    snapshot.len(),
                    self.config.max_world_reference_bytes
                ),
            });
        }
        self.send(
            SyncMessage::WorldReference {
                snapshot: snapshot.clone(),
            },
            Destination::Broadcast,
        )?;
        debug!(bytes = snapshot.len(), "World reference published");
        self.world_reference = Some(snapshot);
        Ok(())
    }

    /// Registers a newly reachable peer. Returns `false` if it was already known.
    ///
    /// A host sends the newcomer its session header and, once published, its world
    /// reference, both point-to-point.
    pub fn peer_discovered(&mut self, peer: A, now: SimTime) -> CodecResult<bool> {
        if !self.peers.register(peer.clone(), now) {
            return Ok(false);
        }
        if let Some(total_targets) = self.total_targets {
            self.send(
                SyncMessage::SessionHeader { total_targets },
                Destination::Peer(peer.clone()),
            )?;
        }
        if self.role.is_host() && self.config.resend_world_reference_on_join {
            if let Some(snapshot) = self.world_reference.clone() {
                self.send(
                    SyncMessage::WorldReference { snapshot },
                    Destination::Peer(peer),
                )?;
            }
        }
        Ok(true)
    }

    /// Forgets a peer. Returns `false` if it was unknown.
    pub fn peer_disconnected(&mut self, peer: &A) -> bool {
        self.peers.remove(peer).is_some()
    }

    /// Decodes and validates a payload from `from`.
    ///
    /// The message is checked against the local board before its sender's authority, so
    /// an invalid message never makes its sender the host.
    ///
    /// # Errors
    ///
    /// The reason the payload was dropped. Nothing local changes except the sender's
    /// recorded sequence number when the envelope itself decoded.
    pub fn receive(&mut self, from: &A, payload: &[u8], now: SimTime) -> Result<Inbound, SyncWarningKind> {
        let envelope = decode_message(payload)?;
        self.peers.observe(from, envelope.seq, now);
        let kind = envelope.message.kind();
        let inbound = self.validate(envelope.message)?;
        if !matches!(inbound, Inbound::Retired { .. }) {
            self.check_authority(from, kind)?;
        }
        if let Inbound::WorldReference { snapshot } = &inbound {
            self.world_reference = Some(snapshot.clone());
        }
        Ok(inbound)
    }

    fn validate(&self, message: SyncMessage) -> Result<Inbound, SyncWarningKind> {
        match message {
            SyncMessage::WorldReference { snapshot } => {
                let max = self.config.max_world_reference_bytes;
                if snapshot.len() > max {
                    return Err(SyncWarningKind::OversizedWorldReference {
                        len: snapshot.len(),
                        max,
                    });
                }
                Ok(Inbound::WorldReference { snapshot })
            },
            SyncMessage::AnchorPlacement(placement) => {
                let target = placement.target();
                self.check_slot(placement.slot)?;
                if !placement.pose.is_finite() {
                    return Err(SyncWarningKind::InvalidPose { target });
                }
                Ok(Inbound::Placement {
                    target,
                    slot: placement.slot,
                    pose: placement.pose,
                })
            },
            SyncMessage::AnchorRetired { anchor_id, slot } => {
                self.check_slot(slot)?;
                Ok(Inbound::Retired {
                    target: TargetId::from_bytes(anchor_id),
                    slot,
                })
            },
            SyncMessage::TargetDropped { anchor_id } => Ok(Inbound::Dropped {
                target: TargetId::from_bytes(anchor_id),
            }),
            SyncMessage::SessionHeader { total_targets } => {
                Ok(Inbound::SessionHeader { total_targets })
            },
        }
    }

    fn check_authority(&mut self, from: &A, message: &'static str) -> Result<(), SyncWarningKind> {
        if self.role.is_host() {
            return Err(SyncWarningKind::NotAuthoritative { message });
        }
        match self.peers.host() {
            Some(host) if host != from => Err(SyncWarningKind::NotAuthoritative { message }),
            Some(_) => Ok(()),
            None => {
                debug!(host = ?from, "Adopted host");
                self.peers.set_host(from.clone());
                Ok(())
            },
        }
    }

    fn check_slot(&self, slot: SlotIndex) -> Result<(), SyncWarningKind> {
        if slot.is_valid_for(self.slot_count) {
            Ok(())
        } else {
            Err(SyncWarningKind::SlotOutOfRange {
                slot,
                slot_count: self.slot_count,
            })
        }
    }
}

/// Picks the host among peers that reported a ready tracking session: the earliest
/// ready time wins, ties go to the lowest address.
///
/// ```
/// use whack_sync::{elect_host, SimTime};
///
/// let host = elect_host([
///     (3u8, SimTime::from_millis(40)),
///     (1u8, SimTime::from_millis(55)),
///     (2u8, SimTime::from_millis(40)),
/// ]);
/// assert_eq!(host, Some(2));
/// ```
pub fn elect_host<A: PeerAddress>(candidates: impl IntoIterator<Item = (A, SimTime)>) -> Option<A> {
    candidates
        .into_iter()
        .min_by(|(a, ready_a), (b, ready_b)| ready_a.cmp(ready_b).then_with(|| a.cmp(b)))
        .map(|(address, _)| address)
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
    use crate::network::messages::AnchorPlacement;
    use crate::slot_grid::Position;
    use crate::TransportEvent;

    #[derive(Default)]
    struct Outbox {
        sent: Vec<(Vec<u8>, Destination<u8>)>,
    }

    impl Transport<u8> for Outbox {
        fn send(&mut self, payload: &[u8], destination: &Destination<u8>) {
            self.sent.push((payload.to_vec(), destination.clone()));
        }

        fn receive_all(&mut self) -> Vec<TransportEvent<u8>> {
            Vec::new()
        }
    }

    fn host() -> SyncProtocol<u8> {
        SyncProtocol::new(Role::Host, ProtocolConfig::default(), 16)
    }

    fn guest() -> SyncProtocol<u8> {
        SyncProtocol::new(Role::Guest, ProtocolConfig::default(), 16)
    }

    fn placement(seq: u64, id: u128, slot: usize) -> Vec<u8> {
        encode_message(&Envelope {
            seq,
            message: SyncMessage::AnchorPlacement(AnchorPlacement::new(
                TargetId::new(id),
                SlotIndex::new(slot),
                Pose::default(),
            )),
        })
        .unwrap()
    }

    #[test]
    fn sequence_numbers_increase_per_send() {
        let mut protocol = host();
        let mut outbox = Outbox::default();
        for id in 0..3 {
            protocol
                .send(
                    SyncMessage::TargetDropped {
                        anchor_id: TargetId::new(id).to_bytes(),
                    },
                    Destination::Broadcast,
                )
                .unwrap();
        }
        assert_eq!(protocol.flush(&mut outbox), 3);
        assert_eq!(protocol.queued(), 0);
        let seqs: Vec<u64> = outbox
            .sent
            .iter()
            .map(|(bytes, _)| decode_message(bytes).unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn guest_accepts_placement_and_adopts_host() {
        let mut protocol = guest();
        let inbound = protocol
            .receive(&1, &placement(0, 7, 5), SimTime::ZERO)
            .unwrap();
        assert_eq!(
            inbound,
            Inbound::Placement {
                target: TargetId::new(7),
                slot: SlotIndex::new(5),
                pose: Pose::default(),
            }
        );
        assert_eq!(protocol.peers().host(), Some(&1));
        assert_eq!(protocol.peers().get(&1).unwrap().last_seq(), Some(0));
    }

    #[test]
    fn guest_rejects_placement_from_second_host() {
        let mut protocol = guest();
        protocol.receive(&1, &placement(0, 7, 5), SimTime::ZERO).unwrap();
        assert_eq!(
            protocol.receive(&2, &placement(0, 8, 6), SimTime::ZERO),
            Err(SyncWarningKind::NotAuthoritative {
                message: "anchor_placement"
            })
        );
    }

    #[test]
    fn invalid_placement_does_not_claim_host() {
        let mut protocol = guest();
        assert_eq!(
            protocol.receive(&9, &placement(0, 7, 99), SimTime::ZERO),
            Err(SyncWarningKind::SlotOutOfRange {
                slot: SlotIndex::new(99),
                slot_count: 16,
            })
        );
        assert_eq!(protocol.peers().host(), None);
        assert!(protocol.receive(&1, &placement(0, 8, 4), SimTime::ZERO).is_ok());
        assert_eq!(protocol.peers().host(), Some(&1));
    }

    #[test]
    fn preset_host_is_the_only_authority() {
        let mut protocol = guest();
        protocol.set_host(1);
        assert_eq!(
            protocol.receive(&9, &placement(0, 7, 5), SimTime::ZERO),
            Err(SyncWarningKind::NotAuthoritative {
                message: "anchor_placement"
            })
        );
        assert!(protocol.receive(&1, &placement(0, 7, 5), SimTime::ZERO).is_ok());
        assert_eq!(protocol.peers().host(), Some(&1));
    }

    #[test]
    fn host_sends_header_before_world_reference_to_newcomers() {
        let mut protocol = host();
        let mut outbox = Outbox::default();
        protocol.set_total_targets(6);
        protocol.set_world_reference(vec![3; 8]).unwrap();
        protocol.peer_discovered(2, SimTime::ZERO).unwrap();
        protocol.flush(&mut outbox);

        let sent: Vec<(SyncMessage, Destination<u8>)> = outbox
            .sent
            .iter()
            .map(|(bytes, destination)| {
                (decode_message(bytes).unwrap().message, destination.clone())
            })
            .collect();
        assert_eq!(
            sent,
            vec![
                (
                    SyncMessage::WorldReference { snapshot: vec![3; 8] },
                    Destination::Broadcast
                ),
                (
                    SyncMessage::SessionHeader { total_targets: 6 },
                    Destination::Peer(2)
                ),
                (
                    SyncMessage::WorldReference { snapshot: vec![3; 8] },
                    Destination::Peer(2)
                ),
            ]
        );
    }

    #[test]
    fn guest_accepts_header_from_host_only() {
        let mut protocol = guest();
        let header = encode_message(&Envelope {
            seq: 0,
            message: SyncMessage::SessionHeader { total_targets: 3 },
        })
        .unwrap();
        assert_eq!(
            protocol.receive(&1, &header, SimTime::ZERO),
            Ok(Inbound::SessionHeader { total_targets: 3 })
        );
        assert!(matches!(
            protocol.receive(&2, &header, SimTime::ZERO),
            Err(SyncWarningKind::NotAuthoritative {
                message: "session_header"
            })
        ));
        assert!(matches!(
            host().receive(&1, &header, SimTime::ZERO),
            Err(SyncWarningKind::NotAuthoritative { .. })
        ));
    }

    #[test]
    fn host_rejects_placements_but_accepts_retirements() {
        let mut protocol = host();
        assert!(matches!(
            protocol.receive(&4, &placement(0, 7, 5), SimTime::ZERO),
            Err(SyncWarningKind::NotAuthoritative { .. })
        ));
        let retired = encode_message(&Envelope {
            seq: 1,
            message: SyncMessage::AnchorRetired {
                anchor_id: TargetId::new(7).to_bytes(),
                slot: SlotIndex::new(5),
            },
        })
        .unwrap();
        assert_eq!(
            protocol.receive(&4, &retired, SimTime::ZERO),
            Ok(Inbound::Retired {
                target: TargetId::new(7),
                slot: SlotIndex::new(5),
            })
        );
    }

    #[test]
    fn out_of_range_slot_is_a_warning() {
        let mut protocol = guest();
        assert_eq!(
            protocol.receive(&1, &placement(0, 7, 16), SimTime::ZERO),
            Err(SyncWarningKind::SlotOutOfRange {
                slot: SlotIndex::new(16),
                slot_count: 16,
            })
        );
    }

    #[test]
    fn non_finite_pose_is_a_warning() {
        let mut protocol = guest();
        let bytes = encode_message(&Envelope {
            seq: 0,
            message: SyncMessage::AnchorPlacement(AnchorPlacement::new(
                TargetId::new(3),
                SlotIndex::new(2),
                Pose::at(Position::new(f32::NAN, 0.0, 0.0)),
            )),
        })
        .unwrap();
        assert_eq!(
            protocol.receive(&1, &bytes, SimTime::ZERO),
            Err(SyncWarningKind::InvalidPose {
                target: TargetId::new(3)
            })
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let mut protocol = guest();
        assert!(matches!(
            protocol.receive(&1, &[0xEE, 1, 2], SimTime::ZERO),
            Err(SyncWarningKind::Malformed(CodecError::UnknownTag { tag: 0xEE }))
        ));
        assert!(protocol.peers().is_empty());
    }

    #[test]
    fn world_reference_is_sent_to_late_joiner_only() {
        let mut protocol = host();
        let mut outbox = Outbox::default();
        protocol.peer_discovered(1, SimTime::ZERO).unwrap();
        protocol.set_world_reference(vec![9; 32]).unwrap();
        assert!(protocol.peer_discovered(2, SimTime::ZERO).unwrap());
        assert!(!protocol.peer_discovered(2, SimTime::ZERO).unwrap());
        protocol.flush(&mut outbox);

        assert_eq!(outbox.sent.len(), 2);
        assert_eq!(outbox.sent[0].1, Destination::Broadcast);
        assert_eq!(outbox.sent[1].1, Destination::Peer(2));
    }

    #[test]
    fn guest_cannot_publish_world_reference() {
        let mut protocol = guest();
        assert!(matches!(
            protocol.set_world_reference(vec![1]),
            Err(WhackError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn oversized_world_reference_is_refused_both_ways() {
        let config = ProtocolConfig {
            max_world_reference_bytes: 4,
            ..ProtocolConfig::default()
        };
        let mut sender = SyncProtocol::<u8>::new(Role::Host, config, 16);
        assert!(sender.set_world_reference(vec![0; 5]).is_err());

        let mut receiver = SyncProtocol::<u8>::new(Role::Guest, config, 16);
        let bytes = encode_message(&Envelope {
            seq: 0,
            message: SyncMessage::WorldReference {
                snapshot: vec![0; 5],
            },
        })
        .unwrap();
        assert_eq!(
            receiver.receive(&1, &bytes, SimTime::ZERO),
            Err(SyncWarningKind::OversizedWorldReference { len: 5, max: 4 })
        );
        assert_eq!(receiver.world_reference(), None);
    }

    #[test]
    fn guest_keeps_latest_world_reference() {
        let mut protocol = guest();
        for (seq, blob) in [vec![1u8], vec![2u8, 2]].into_iter().enumerate() {
            let bytes = encode_message(&Envelope {
                seq: seq as u64,
                message: SyncMessage::WorldReference { snapshot: blob },
            })
            .unwrap();
            protocol.receive(&1, &bytes, SimTime::ZERO).unwrap();
        }
        assert_eq!(protocol.world_reference(), Some(&[2u8, 2][..]));
    }

    #[test]
    fn disconnect_forgets_peer() {
        let mut protocol = host();
        protocol.peer_discovered(5, SimTime::ZERO).unwrap();
        assert!(protocol.peer_disconnected(&5));
        assert!(!protocol.peer_disconnected(&5));
    }

    #[test]
    fn election_prefers_earliest_then_lowest() {
        assert_eq!(elect_host::<u8>([]), None);
        assert_eq!(
            elect_host([(9u8, SimTime::from_millis(1)), (2, SimTime::from_millis(2))]),
            Some(9)
        );
        assert_eq!(
            elect_host([(9u8, SimTime::from_millis(1)), (2, SimTime::from_millis(1))]),
            Some(2)
        );
    }

    #[test]
    fn warning_display() {
        let text = SyncWarningKind::SlotOutOfRange {
            slot: SlotIndex::new(20),
            slot_count: 16,
        }
        .to_string();
        assert_eq!(text, "slot 20 is outside a board of 16 slots");
    }
}
