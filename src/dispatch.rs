//! Routing from [`WhackEvent`]s to the presentation layer.
//!
//! The core never calls into rendering code on its own. The application drains
//! [`WhackSession::events`](crate::WhackSession::events) and hands them to
//! [`EventDispatcher::dispatch`], which calls the matching [`RenderSink`] hook.

use crate::network::protocol::SyncWarningKind;
use crate::session_state::TapOutcome;
use crate::{PeerAddress, RetireReason, SlotIndex, TargetId, WhackEvent};

/// Receives visual state changes.
///
/// The four required hooks cover the board and the two counters. Everything else has
/// an empty default so a minimal renderer only implements what it draws.
///
/// ```
/// use whack_sync::{RenderSink, RetireReason, SlotIndex, TargetId};
///
/// #[derive(Default)]
/// struct Board {
///     visible: Vec<SlotIndex>,
///     score: u32,
/// }
///
/// impl RenderSink<u8> for Board {
///     fn on_spawn(&mut self, slot: SlotIndex, _target: TargetId) {
///         self.visible.push(slot);
///     }
///     fn on_retire(&mut self, _target: TargetId, slot: SlotIndex, _reason: RetireReason) {
///         self.visible.retain(|s| *s != slot);
///     }
///     fn on_score_changed(&mut self, score: u32) {
///         self.score = score;
///     }
///     fn on_remaining_changed(&mut self, _remaining: u32) {}
/// }
/// ```
pub trait RenderSink<A: PeerAddress> {
    /// Show a target at `slot`.
    fn on_spawn(&mut self, slot: SlotIndex, target: TargetId);

    /// Hide `target`, which occupied `slot`.
    fn on_retire(&mut self, target: TargetId, slot: SlotIndex, reason: RetireReason);

    /// Update the score label.
    fn on_score_changed(&mut self, score: u32);

    /// Update the remaining-targets label.
    fn on_remaining_changed(&mut self, remaining: u32);

    /// A tap hit nothing that is still on the board.
    fn on_stale_tap(&mut self, _target: TargetId, _outcome: TapOutcome) {}

    /// A target was dropped before it ever appeared.
    fn on_spawn_starved(&mut self, _target: TargetId, _attempts: u32) {}

    /// A payload from `peer` was ignored.
    fn on_sync_warning(&mut self, _peer: &A, _kind: &SyncWarningKind) {}

    /// A peer connected.
    fn on_peer_joined(&mut self, _peer: &A) {}

    /// A peer disconnected.
    fn on_peer_left(&mut self, _peer: &A) {}

    /// Relocalize against the host's world map.
    fn on_world_reference(&mut self, _peer: &A, _snapshot: &[u8]) {}

    /// The session is over.
    fn on_session_complete(&mut self, _score: u32) {}
}

/// Stateless router from events to a [`RenderSink`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EventDispatcher;

impl EventDispatcher {
    /// Calls the hook matching `event`.
    pub fn dispatch<A, S>(event: WhackEvent<A>, sink: &mut S)
    where
        A: PeerAddress,
        S: RenderSink<A> + ?Sized,
    {
        match event {
            WhackEvent::Spawned { slot, target } => sink.on_spawn(slot, target),
            WhackEvent::Retired {
                target,
                slot,
                reason,
            } => sink.on_retire(target, slot, reason),
            WhackEvent::ScoreChanged { score } => sink.on_score_changed(score),
            WhackEvent::RemainingChanged { remaining } => sink.on_remaining_changed(remaining),
            WhackEvent::StaleTap { target, outcome } => sink.on_stale_tap(target, outcome),
            WhackEvent::SpawnStarved { target, attempts } => {
                sink.on_spawn_starved(target, attempts);
            },
            WhackEvent::SyncWarning { peer, kind } => sink.on_sync_warning(&peer, &kind),
            WhackEvent::PeerJoined { peer } => sink.on_peer_joined(&peer),
            WhackEvent::PeerLeft { peer } => sink.on_peer_left(&peer),
            WhackEvent::WorldReferenceReceived { peer, snapshot } => {
                sink.on_world_reference(&peer, &snapshot);
            },
            WhackEvent::SessionComplete { score } => sink.on_session_complete(score),
        }
    }

    /// Dispatches every event in order. Returns how many were dispatched.
    pub fn dispatch_all<A, S, I>(events: I, sink: &mut S) -> usize
    where
        A: PeerAddress,
        S: RenderSink<A> + ?Sized,
        I: IntoIterator<Item = WhackEvent<A>>,
    {
        let mut count = 0;
        for event in events {
            Self::dispatch(event, sink);
            count += 1;
        }
        count
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

    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
    }

    impl RenderSink<u8> for Log {
        fn on_spawn(&mut self, slot: SlotIndex, _target: TargetId) {
            self.calls.push(format!("spawn {slot}"));
        }
        fn on_retire(&mut self, _target: TargetId, slot: SlotIndex, reason: RetireReason) {
            self.calls.push(format!("retire {slot} {reason:?}"));
        }
        fn on_score_changed(&mut self, score: u32) {
            self.calls.push(format!("score {score}"));
        }
        fn on_remaining_changed(&mut self, remaining: u32) {
            self.calls.push(format!("remaining {remaining}"));
        }
        fn on_peer_joined(&mut self, peer: &u8) {
            self.calls.push(format!("joined {peer}"));
        }
    }

    #[test]
    fn routes_required_hooks() {
        let mut log = Log::default();
        let count = EventDispatcher::dispatch_all(
            vec![
                WhackEvent::Spawned {
                    slot: SlotIndex::new(5),
                    target: TargetId::new(1),
                },
                WhackEvent::RemainingChanged { remaining: 14 },
                WhackEvent::Retired {
                    target: TargetId::new(1),
                    slot: SlotIndex::new(5),
                    reason: RetireReason::Hit,
                },
                WhackEvent::ScoreChanged { score: 1 },
            ],
            &mut log,
        );
        assert_eq!(count, 4);
        assert_eq!(
            log.calls,
            vec!["spawn 5", "remaining 14", "retire 5 Hit", "score 1"]
        );
    }

    #[test]
    fn optional_hooks_default_to_nothing() {
        let mut log = Log::default();
        EventDispatcher::dispatch(
            WhackEvent::StaleTap {
                target: TargetId::new(2),
                outcome: TapOutcome::Unknown,
            },
            &mut log,
        );
        EventDispatcher::dispatch(WhackEvent::SessionComplete { score: 3 }, &mut log);
        assert!(log.calls.is_empty());

        EventDispatcher::dispatch(WhackEvent::PeerJoined { peer: 4 }, &mut log);
        assert_eq!(log.calls, vec!["joined 4"]);
    }

    #[test]
    fn works_through_trait_object() {
        let mut log = Log::default();
        let sink: &mut dyn RenderSink<u8> = &mut log;
        EventDispatcher::dispatch(WhackEvent::ScoreChanged { score: 9 }, sink);
        assert_eq!(log.calls, vec!["score 9"]);
    }
}
