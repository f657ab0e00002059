use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::dispatch::{EventDispatcher, RenderSink};
use crate::error::{WhackError, WhackResult};
use crate::network::messages::{AnchorPlacement, SyncMessage};
use crate::network::protocol::{Inbound, SyncProtocol, SyncWarningKind};
use crate::report_violation_to;
use crate::session_state::{PlacementOutcome, SessionSnapshot, SessionState, TapOutcome};
use crate::sessions::event_drain::EventDrain;
use crate::spawn_scheduler::{ScheduleOutcome, SpawnScheduler, Target, TargetState};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::time::Clock;
use crate::{
    debug_check_invariants, Destination, PeerAddress, RetireReason, Role, SessionStatus, SimTime,
    TargetId, Transport, TransportEvent, WhackEvent,
};

/// One peer's replica of a collaborative whack-a-mole session.
///
/// Built by [`SessionBuilder`](crate::SessionBuilder). The host runs the spawn scheduler
/// and broadcasts every placement; guests mirror what they receive. Every peer resolves
/// its own taps and announces retirements to the others.
///
/// Nothing happens between calls. Drive the session by calling [`WhackSession::poll`]
/// regularly (once per rendered frame is typical), feed it taps with
/// [`WhackSession::on_tap_resolved`], and drain [`WhackSession::events`].
pub struct WhackSession<A: PeerAddress> {
    role: Role,
    clock: Box<dyn Clock>,
    transport: Box<dyn Transport<A>>,
    state: SessionState,
    scheduler: Option<SpawnScheduler>,
    protocol: SyncProtocol<A>,
    event_queue: VecDeque<WhackEvent<A>>,
    max_queued_events: usize,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    started_at: SimTime,
    ended: bool,
    completion_reported: bool,
}

impl<A: PeerAddress> std::fmt::Debug for WhackSession<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhackSession")
            .field("role", &self.role)
            .field("status", &self.state.status())
            .field("score", &self.state.score())
            .field("remaining", &self.state.remaining())
            .field("active", &self.state.active_count())
            .field("peers", &self.protocol.peers().len())
            .field("queued_events", &self.event_queue.len())
            .field("has_violation_observer", &self.violation_observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<A: PeerAddress> WhackSession<A> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        role: Role,
        clock: Box<dyn Clock>,
        transport: Box<dyn Transport<A>>,
        state: SessionState,
        scheduler: Option<SpawnScheduler>,
        protocol: SyncProtocol<A>,
        max_queued_events: usize,
        violation_observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        let started_at = clock.now();
        info!(
            ?role,
            total = state.total(),
            slots = state.grid().len(),
            "Session started"
        );
        Self {
            role,
            clock,
            transport,
            state,
            scheduler,
            protocol,
            event_queue: VecDeque::new(),
            max_queued_events,
            violation_observer,
            started_at,
            ended: false,
            completion_reported: false,
        }
    }

    /// Applies everything that happened since the last call: inbound payloads, peer
    /// discovery and due spawn timers. Outbound messages are flushed before returning.
    pub fn poll(&mut self) {
        let now = self.clock.now();
        for event in self.transport.receive_all() {
            match event {
                TransportEvent::PeerDiscovered(peer) => self.on_peer_discovered(peer, now),
                TransportEvent::PeerDisconnected(peer) => {
                    if self.protocol.peer_disconnected(&peer) {
                        debug!(?peer, "Peer left");
                        self.push_event(WhackEvent::PeerLeft { peer });
                    }
                },
                TransportEvent::Received { from, payload } => {
                    self.on_payload(from, &payload, now);
                },
            }
        }

        if let Some(scheduler) = self.scheduler.as_mut() {
            let outcomes = scheduler.advance(now, &mut self.state);
            for outcome in outcomes {
                self.on_schedule_outcome(outcome);
            }
        }

        self.finish_step();
    }

    /// Resolves a tap. `None` is a miss and changes nothing.
    ///
    /// Returns the outcome for taps that named a target. A scoring tap retires the target,
    /// raises the score and tells every peer. Stale taps produce a
    /// [`WhackEvent::StaleTap`] and change nothing.
    pub fn on_tap_resolved(&mut self, target: Option<TargetId>) -> Option<TapOutcome> {
        let target = target?;
        let slot = self.state.target(target).map(|t| t.slot());
        let outcome = self.state.resolve_tap(target);
        match (outcome, slot) {
            (TapOutcome::Scored, Some(slot)) => {
                debug!(%target, %slot, score = self.state.score(), "Target hit");
                self.push_event(WhackEvent::Retired {
                    target,
                    slot,
                    reason: RetireReason::Hit,
                });
                self.push_event(WhackEvent::ScoreChanged {
                    score: self.state.score(),
                });
                self.broadcast(SyncMessage::AnchorRetired {
                    anchor_id: target.to_bytes(),
                    slot,
                });
            },
            (outcome, _) => {
                trace!(%target, ?outcome, "Stale tap");
                self.push_event(WhackEvent::StaleTap { target, outcome });
            },
        }
        self.finish_step();
        Some(outcome)
    }

    /// Publishes the host's serialized AR world map to every connected peer. Peers that
    /// connect later receive it individually.
    ///
    /// # Errors
    ///
    /// [`WhackError::InvalidRequest`] on a guest or for an oversized snapshot.
    pub fn set_world_reference(&mut self, snapshot: Vec<u8>) -> WhackResult<()> {
        self.protocol.set_world_reference(snapshot)?;
        self.protocol.flush(&mut self.transport);
        Ok(())
    }

    /// Ends the session now. Pending timers are cancelled, visible targets retire with
    /// [`RetireReason::SessionEnded`] and the status becomes complete.
    ///
    /// # Errors
    ///
    /// [`WhackError::SessionEnded`] if the session was already ended.
    pub fn end_session(&mut self) -> WhackResult<()> {
        if self.ended {
            return Err(WhackError::SessionEnded);
        }
        self.ended = true;
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.cancel_all();
        }
        let remaining_before = self.state.remaining();
        let pending: Vec<TargetId> = self
            .state
            .targets()
            .filter(|target| target.state() == TargetState::Pending)
            .map(Target::id)
            .collect();
        let vacated = self.state.end();
        info!(score = self.state.score(), vacated = vacated.len(), "Session ended");
        for (target, slot) in vacated {
            self.push_event(WhackEvent::Retired {
                target,
                slot,
                reason: RetireReason::SessionEnded,
            });
            if self.role.is_host() {
                self.broadcast(SyncMessage::AnchorRetired {
                    anchor_id: target.to_bytes(),
                    slot,
                });
            }
        }
        if self.role.is_host() {
            // Guests count these down as drops.
            for target in pending {
                self.broadcast(SyncMessage::TargetDropped {
                    anchor_id: target.to_bytes(),
                });
            }
        }
        if remaining_before != self.state.remaining() {
            self.push_event(WhackEvent::RemainingChanged {
                remaining: self.state.remaining(),
            });
        }
        self.finish_step();
        Ok(())
    }

    /// Returns all events that happened since the last call.
    pub fn events(&mut self) -> EventDrain<'_, A> {
        EventDrain::from_drain(self.event_queue.drain(..))
    }

    /// Drains every queued event into `sink`. Returns how many were dispatched.
    pub fn dispatch_events<S: RenderSink<A> + ?Sized>(&mut self, sink: &mut S) -> usize {
        EventDispatcher::dispatch_all(self.event_queue.drain(..), sink)
    }

    /// This replica's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Running or complete.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    /// Local score.
    #[must_use]
    pub fn score(&self) -> u32 {
        self.state.score()
    }

    /// Targets that have neither spawned nor been dropped.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.state.remaining()
    }

    /// `true` once nothing is left to spawn and nothing is visible.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Read access to the replica.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Copies the replica for comparison.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// The host's world reference, once published or received.
    #[must_use]
    pub fn world_reference(&self) -> Option<&[u8]> {
        self.protocol.world_reference()
    }

    /// Connected peers in address order.
    pub fn peers(&self) -> impl Iterator<Item = &A> + '_ {
        self.protocol.peers().iter().map(|peer| peer.address())
    }

    /// The host's address as seen from a guest, once known.
    #[must_use]
    pub fn host_address(&self) -> Option<&A> {
        self.protocol.peers().host()
    }

    /// When the next spawn or expiry timer is due. Always `None` on guests.
    #[must_use]
    pub fn next_timer_at(&self) -> Option<SimTime> {
        self.scheduler.as_ref().and_then(SpawnScheduler::next_timer_at)
    }

    /// Time elapsed on the session clock since the session started.
    #[must_use]
    pub fn elapsed(&self) -> web_time::Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    fn on_peer_discovered(&mut self, peer: A, now: SimTime) {
        match self.protocol.peer_discovered(peer.clone(), now) {
            Ok(true) => {
                debug!(?peer, "Peer joined");
                self.push_event(WhackEvent::PeerJoined { peer });
            },
            Ok(false) => {},
            Err(err) => {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Error,
                    ViolationKind::SyncProtocol,
                    "Failed to queue world reference for {:?}: {}",
                    peer,
                    err
                );
            },
        }
    }

    fn on_payload(&mut self, from: A, payload: &[u8], now: SimTime) {
        let known = self.protocol.peers().contains(&from);
        let result = self.protocol.receive(&from, payload, now);
        if !known && self.protocol.peers().contains(&from) {
            self.push_event(WhackEvent::PeerJoined { peer: from.clone() });
        }
        match result {
            Ok(inbound) => self.apply_inbound(from, inbound, now),
            Err(kind) => self.warn(from, kind),
        }
    }

    fn apply_inbound(&mut self, from: A, inbound: Inbound, now: SimTime) {
        let remaining_before = self.state.remaining();
        match inbound {
            Inbound::WorldReference { snapshot } => {
                info!(bytes = snapshot.len(), host = ?from, "World reference received");
                self.push_event(WhackEvent::WorldReferenceReceived {
                    peer: from,
                    snapshot,
                });
            },
            Inbound::Placement { target, slot, .. } => {
                match self.state.apply_placement(target, slot, now) {
                    PlacementOutcome::Applied => {
                        debug!(%target, %slot, "Mirrored placement");
                        self.push_event(WhackEvent::Spawned { slot, target });
                    },
                    PlacementOutcome::DuplicateAnchor | PlacementOutcome::SlotOccupied => {
                        trace!(%target, %slot, "Ignored repeated placement");
                    },
                    PlacementOutcome::SlotOutOfRange => self.warn(
                        from,
                        SyncWarningKind::SlotOutOfRange {
                            slot,
                            slot_count: self.state.grid().len(),
                        },
                    ),
                    PlacementOutcome::Exhausted => {
                        self.warn(from, SyncWarningKind::TargetCountExceeded { target });
                    },
                }
            },
            Inbound::Retired { target, slot } => {
                if let Some(slot) = self.state.apply_retire(target, slot) {
                    debug!(%target, %slot, "Mirrored retirement");
                    self.push_event(WhackEvent::Retired {
                        target,
                        slot,
                        reason: RetireReason::Remote,
                    });
                    // Guests may reach the host only, so it relays to the rest.
                    if self.role.is_host() {
                        self.broadcast(SyncMessage::AnchorRetired {
                            anchor_id: target.to_bytes(),
                            slot,
                        });
                    }
                }
            },
            Inbound::Dropped { target } => {
                if !self.state.apply_drop(target) && self.state.target(target).is_none() {
                    self.warn(from, SyncWarningKind::TargetCountExceeded { target });
                }
            },
            Inbound::SessionHeader { total_targets } => {
                if self.ended || total_targets == self.state.total() {
                    return;
                }
                if self.state.adopt_total(total_targets) {
                    debug!(total = total_targets, "Adopted host target total");
                    if !self.state.is_complete() {
                        self.completion_reported = false;
                    }
                } else {
                    let accounted = self.state.total() - self.state.remaining();
                    self.warn(
                        from,
                        SyncWarningKind::InvalidTargetTotal {
                            total: total_targets,
                            accounted,
                        },
                    );
                }
            },
        }
        if remaining_before != self.state.remaining() {
            self.push_event(WhackEvent::RemainingChanged {
                remaining: self.state.remaining(),
            });
        }
    }

    fn on_schedule_outcome(&mut self, outcome: ScheduleOutcome) {
        match outcome {
            ScheduleOutcome::Claimed { target, slot, at } => {
                debug!(%target, %slot, %at, "Target spawned");
                self.push_event(WhackEvent::Spawned { slot, target });
                self.push_event(WhackEvent::RemainingChanged {
                    remaining: self.state.remaining(),
                });
                let pose = self.state.grid().pose(slot);
                self.broadcast(SyncMessage::AnchorPlacement(AnchorPlacement::new(
                    target, slot, pose,
                )));
            },
            ScheduleOutcome::Deferred {
                target,
                slot,
                retry_at,
                attempts,
            } => {
                trace!(%target, %slot, %retry_at, attempts, "Slot occupied, spawn deferred");
            },
            ScheduleOutcome::Starved { target, attempts } => {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Scheduling,
                    "Target {} dropped after {} occupied-slot attempts",
                    target,
                    attempts
                );
                self.push_event(WhackEvent::SpawnStarved { target, attempts });
                self.push_event(WhackEvent::RemainingChanged {
                    remaining: self.state.remaining(),
                });
                self.broadcast(SyncMessage::TargetDropped {
                    anchor_id: target.to_bytes(),
                });
            },
            ScheduleOutcome::Expired { target, slot } => {
                debug!(%target, %slot, "Target expired");
                self.push_event(WhackEvent::Retired {
                    target,
                    slot,
                    reason: RetireReason::Expired,
                });
                self.broadcast(SyncMessage::AnchorRetired {
                    anchor_id: target.to_bytes(),
                    slot,
                });
            },
        }
    }

    fn warn(&mut self, peer: A, kind: SyncWarningKind) {
        report_violation_to!(
            self.violation_observer,
            ViolationSeverity::Warning,
            ViolationKind::SyncProtocol,
            "Dropped payload from {:?}: {}",
            peer,
            kind
        );
        self.push_event(WhackEvent::SyncWarning { peer, kind });
    }

    fn broadcast(&mut self, message: SyncMessage) {
        let kind = message.kind();
        if let Err(err) = self.protocol.send(message, Destination::Broadcast) {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::SyncProtocol,
                "Failed to encode {}: {}",
                kind,
                err
            );
        }
    }

    fn push_event(&mut self, event: WhackEvent<A>) {
        self.event_queue.push_back(event);
        // Oldest events go first when nobody drains the queue.
        while self.event_queue.len() > self.max_queued_events {
            self.event_queue.pop_front();
        }
    }

    fn finish_step(&mut self) {
        if self.state.is_complete() && !self.completion_reported {
            self.completion_reported = true;
            info!(score = self.state.score(), "Session complete");
            self.push_event(WhackEvent::SessionComplete {
                score: self.state.score(),
            });
        }
        self.protocol.flush(&mut self.transport);
        debug_check_invariants!(self.state, "after session step");
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
    use crate::network::codec::{decode_message, encode_message, Envelope};
    use crate::sessions::builder::SessionBuilder;
    use crate::sessions::config::ScheduleConfig;
    use crate::slot_grid::Pose;
    use crate::telemetry::CollectingObserver;
    use crate::time::ManualClock;
    use crate::{MemoryNetwork, SlotIndex};
    use web_time::Duration;

    fn forced_host(
        network: &MemoryNetwork<u8>,
        clock: &ManualClock,
        plan: &[(u64, usize)],
    ) -> WhackSession<u8> {
        let plan: Vec<(Duration, SlotIndex)> = plan
            .iter()
            .map(|(ms, slot)| (Duration::from_millis(*ms), SlotIndex::new(*slot)))
            .collect();
        SessionBuilder::new()
            .with_role(Role::Host)
            .with_schedule_config(ScheduleConfig::deterministic(1))
            .with_forced_schedule(plan)
            .with_clock(clock.clone())
            .start_session(network.endpoint(0))
            .unwrap()
    }

    #[test]
    fn host_spawn_emits_events_and_broadcasts() {
        let network = MemoryNetwork::<u8>::new();
        let clock = ManualClock::new();
        let mut host = forced_host(&network, &clock, &[(10, 5)]);
        let mut listener = network.endpoint(1);

        clock.advance_millis(10);
        host.poll();
        let events: Vec<_> = host.events().collect();
        assert!(events.contains(&WhackEvent::PeerJoined { peer: 1 }));
        assert!(events
            .iter()
            .any(|e| matches!(e, WhackEvent::Spawned { slot, .. } if *slot == SlotIndex::new(5))));
        assert!(events.contains(&WhackEvent::RemainingChanged { remaining: 0 }));

        let received: Vec<&'static str> = listener
            .receive_all()
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::Received { payload, .. } => {
                    Some(decode_message(&payload).unwrap().message.kind())
                },
                _ => None,
            })
            .collect();
        assert_eq!(received, vec!["session_header", "anchor_placement"]);
    }

    #[test]
    fn tap_scores_once_and_completes() {
        let network = MemoryNetwork::<u8>::new();
        let clock = ManualClock::new();
        let mut host = forced_host(&network, &clock, &[(0, 3)]);
        host.poll();
        let target = host.state().targets().next().unwrap().id();
        let _ = host.events().count();

        assert_eq!(host.on_tap_resolved(Some(target)), Some(TapOutcome::Scored));
        assert_eq!(
            host.on_tap_resolved(Some(target)),
            Some(TapOutcome::AlreadyRetired)
        );
        assert_eq!(host.on_tap_resolved(None), None);
        assert_eq!(host.score(), 1);
        assert_eq!(host.status(), SessionStatus::Complete);

        let events: Vec<_> = host.events().collect();
        assert_eq!(
            events,
            vec![
                WhackEvent::Retired {
                    target,
                    slot: SlotIndex::new(3),
                    reason: RetireReason::Hit,
                },
                WhackEvent::ScoreChanged { score: 1 },
                WhackEvent::SessionComplete { score: 1 },
                WhackEvent::StaleTap {
                    target,
                    outcome: TapOutcome::AlreadyRetired,
                },
            ]
        );
    }

    #[test]
    fn tap_on_pending_target_is_unknown() {
        let network = MemoryNetwork::<u8>::new();
        let clock = ManualClock::new();
        let mut host = forced_host(&network, &clock, &[(1_000, 3)]);
        let target = host.state().targets().next().unwrap().id();
        assert_eq!(host.on_tap_resolved(Some(target)), Some(TapOutcome::Unknown));
        assert_eq!(host.score(), 0);
        assert_eq!(host.remaining(), 1);
    }

    #[test]
    fn end_session_retires_and_cancels() {
        let network = MemoryNetwork::<u8>::new();
        let clock = ManualClock::new();
        let mut host = forced_host(&network, &clock, &[(0, 1), (500, 2)]);
        host.poll();
        let _ = host.events().count();

        host.end_session().unwrap();
        assert!(matches!(host.end_session(), Err(WhackError::SessionEnded)));
        assert_eq!(host.next_timer_at(), None);
        assert_eq!(host.status(), SessionStatus::Complete);

        clock.advance_millis(1_000);
        host.poll();
        let events: Vec<_> = host.events().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            WhackEvent::Retired {
                reason: RetireReason::SessionEnded,
                ..
            }
        )));
        assert!(!events.iter().any(|e| matches!(e, WhackEvent::Spawned { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, WhackEvent::SessionComplete { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn garbage_payload_warns_without_state_change() {
        let network = MemoryNetwork::<u8>::new();
        let observer = Arc::new(CollectingObserver::new());
        let mut guest = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .with_violation_observer(observer.clone())
            .start_session(network.endpoint(0))
            .unwrap();
        let mut peer = network.endpoint(1);
        guest.poll();
        let before = guest.snapshot();
        let _ = guest.events().count();

        peer.send(&[0xEE, 0x01], &Destination::Peer(0));
        guest.poll();
        assert_eq!(guest.snapshot(), before);
        let events: Vec<_> = guest.events().collect();
        assert!(matches!(
            events.as_slice(),
            [WhackEvent::SyncWarning {
                peer: 1,
                kind: SyncWarningKind::Malformed(_)
            }]
        ));
        assert!(observer.has_violation(ViolationKind::SyncProtocol));
    }

    #[test]
    fn guest_mirrors_world_reference() {
        let network = MemoryNetwork::<u8>::new();
        let mut guest = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .start_session(network.endpoint(0))
            .unwrap();
        let mut host = network.endpoint(1);
        let bytes = encode_message(&Envelope {
            seq: 0,
            message: SyncMessage::WorldReference {
                snapshot: vec![4, 5, 6],
            },
        })
        .unwrap();
        host.send(&bytes, &Destination::Broadcast);
        guest.poll();
        assert_eq!(guest.world_reference(), Some(&[4u8, 5, 6][..]));
        assert_eq!(guest.host_address(), Some(&1));
        assert!(guest.events().any(|e| e
            == WhackEvent::WorldReferenceReceived {
                peer: 1,
                snapshot: vec![4, 5, 6],
            }));
    }

    #[test]
    fn guest_placement_beyond_total_is_a_warning() {
        let network = MemoryNetwork::<u8>::new();
        let mut guest = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .with_schedule_config(ScheduleConfig {
                total_targets: 1,
                ..ScheduleConfig::default()
            })
            .start_session(network.endpoint(0))
            .unwrap();
        let mut host = network.endpoint(1);
        for (seq, (id, slot)) in [(1u128, 2usize), (2, 3)].into_iter().enumerate() {
            let bytes = encode_message(&Envelope {
                seq: seq as u64,
                message: SyncMessage::AnchorPlacement(AnchorPlacement::new(
                    TargetId::new(id),
                    SlotIndex::new(slot),
                    Pose::default(),
                )),
            })
            .unwrap();
            host.send(&bytes, &Destination::Peer(0));
        }
        guest.poll();
        assert_eq!(guest.state().active_count(), 1);
        assert!(guest.events().any(|e| matches!(
            e,
            WhackEvent::SyncWarning {
                kind: SyncWarningKind::TargetCountExceeded { .. },
                ..
            }
        )));
    }

    fn header(seq: u64, total_targets: u32) -> Vec<u8> {
        encode_message(&Envelope {
            seq,
            message: SyncMessage::SessionHeader { total_targets },
        })
        .unwrap()
    }

    #[test]
    fn guest_adopts_host_total() {
        let network = MemoryNetwork::<u8>::new();
        let mut guest = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .start_session(network.endpoint(0))
            .unwrap();
        let mut host = network.endpoint(1);
        host.send(&header(0, 2), &Destination::Peer(0));
        guest.poll();

        assert_eq!(guest.remaining(), 2);
        assert_eq!(guest.state().total(), 2);
        assert!(guest
            .events()
            .any(|e| e == WhackEvent::RemainingChanged { remaining: 2 }));
    }

    #[test]
    fn header_below_accounted_targets_is_a_warning() {
        let network = MemoryNetwork::<u8>::new();
        let mut guest = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .start_session(network.endpoint(0))
            .unwrap();
        let mut host = network.endpoint(1);
        for (seq, (id, slot)) in [(1u128, 2usize), (2, 3)].into_iter().enumerate() {
            let bytes = encode_message(&Envelope {
                seq: seq as u64,
                message: SyncMessage::AnchorPlacement(AnchorPlacement::new(
                    TargetId::new(id),
                    SlotIndex::new(slot),
                    Pose::default(),
                )),
            })
            .unwrap();
            host.send(&bytes, &Destination::Peer(0));
        }
        host.send(&header(2, 1), &Destination::Peer(0));
        guest.poll();

        assert_eq!(guest.state().total(), 15);
        assert!(guest.events().any(|e| e
            == WhackEvent::SyncWarning {
                peer: 1,
                kind: SyncWarningKind::InvalidTargetTotal {
                    total: 1,
                    accounted: 2,
                },
            }));
    }

    #[test]
    fn ended_guest_ignores_header() {
        let network = MemoryNetwork::<u8>::new();
        let mut guest = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .start_session(network.endpoint(0))
            .unwrap();
        guest.end_session().unwrap();
        let mut host = network.endpoint(1);
        host.send(&header(0, 4), &Destination::Peer(0));
        guest.poll();

        assert_eq!(guest.remaining(), 0);
        assert_eq!(guest.status(), SessionStatus::Complete);
    }

    #[test]
    fn event_queue_is_bounded() {
        let network = MemoryNetwork::<u8>::new();
        let mut guest = SessionBuilder::<u8>::new()
            .with_role(Role::Guest)
            .with_protocol_config(crate::ProtocolConfig {
                max_queued_events: 16,
                ..crate::ProtocolConfig::default()
            })
            .start_session(network.endpoint(0))
            .unwrap();
        for _ in 0..40 {
            guest.on_tap_resolved(Some(TargetId::new(99)));
        }
        assert_eq!(guest.events().len(), 16);
    }

    #[test]
    fn debug_output_is_compact() {
        let network = MemoryNetwork::<u8>::new();
        let session = SessionBuilder::<u8>::new()
            .start_session(network.endpoint(0))
            .unwrap();
        let text = format!("{session:?}");
        assert!(text.starts_with("WhackSession"));
        assert!(text.contains("role: Host"));
    }
}
