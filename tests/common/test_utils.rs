//! Shared test utilities for integration tests.

use std::time::Duration as StdDuration;

use web_time::Duration;
use whack_sync::{
    Destination, ManualClock, PeerAddress, RenderSink, RetireReason, Role, ScheduleConfig,
    SessionBuilder, SlotIndex, TargetId, Transport, TransportEvent, WhackEvent, WhackSession,
};

/// Upper bound on poll rounds before a convergence loop gives up.
#[allow(dead_code)]
pub const MAX_POLL_ROUNDS: usize = 200;

/// Sleep between polls when real sockets are involved.
#[allow(dead_code)]
const POLL_INTERVAL: StdDuration = StdDuration::from_millis(10);

/// Routes `tracing` output to the test harness. Safe to call from every test.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[allow(dead_code)]
pub fn slot(index: usize) -> SlotIndex {
    SlotIndex::new(index)
}

/// A host running a scripted schedule of `(offset ms, slot)` pairs.
#[allow(dead_code)]
pub fn forced_host<A: PeerAddress>(
    transport: impl Transport<A> + 'static,
    clock: &ManualClock,
    plan: &[(u64, usize)],
) -> WhackSession<A> {
    let plan = plan
        .iter()
        .map(|(offset, index)| (ms(*offset), slot(*index)))
        .collect();
    SessionBuilder::new()
        .with_role(Role::Host)
        .with_schedule_config(ScheduleConfig::deterministic(11))
        .with_forced_schedule(plan)
        .with_clock(clock.clone())
        .start_session(transport)
        .expect("host session")
}

/// A guest expecting `total` targets.
#[allow(dead_code)]
pub fn guest<A: PeerAddress>(
    transport: impl Transport<A> + 'static,
    clock: &ManualClock,
    total: u32,
) -> WhackSession<A> {
    SessionBuilder::new()
        .with_role(Role::Guest)
        .with_schedule_config(ScheduleConfig {
            total_targets: total,
            ..ScheduleConfig::default()
        })
        .with_clock(clock.clone())
        .start_session(transport)
        .expect("guest session")
}

/// Polls every session `rounds` times, in order.
#[allow(dead_code)]
pub fn poll_all<A: PeerAddress>(sessions: &mut [&mut WhackSession<A>], rounds: usize) {
    for _ in 0..rounds {
        for session in sessions.iter_mut() {
            session.poll();
        }
    }
}

/// Polls until `done` holds, sleeping between rounds. Returns whether it held.
#[allow(dead_code)]
pub fn poll_with_sleep<A: PeerAddress>(
    sessions: &mut [&mut WhackSession<A>],
    mut done: impl FnMut(&mut [&mut WhackSession<A>]) -> bool,
) -> bool {
    for _ in 0..MAX_POLL_ROUNDS {
        for session in sessions.iter_mut() {
            session.poll();
        }
        if done(sessions) {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    false
}

/// An endpoint that only reaches `reachable`, e.g. a guest that can see the host but
/// not the other guests. Broadcasts fan out to the reachable peers.
#[allow(dead_code)]
pub struct StarLink<T> {
    inner: T,
    reachable: Vec<u8>,
}

#[allow(dead_code)]
impl<T: Transport<u8>> StarLink<T> {
    pub fn new(inner: T, reachable: &[u8]) -> Self {
        Self {
            inner,
            reachable: reachable.to_vec(),
        }
    }
}

impl<T: Transport<u8>> Transport<u8> for StarLink<T> {
    fn send(&mut self, payload: &[u8], destination: &Destination<u8>) {
        match destination {
            Destination::Broadcast => {
                for peer in &self.reachable {
                    self.inner.send(payload, &Destination::Peer(*peer));
                }
            },
            Destination::Peer(peer) if self.reachable.contains(peer) => {
                self.inner.send(payload, destination);
            },
            Destination::Peer(_) => {},
        }
    }

    fn receive_all(&mut self) -> Vec<TransportEvent<u8>> {
        self.inner
            .receive_all()
            .into_iter()
            .filter(|event| match event {
                TransportEvent::Received { from, .. }
                | TransportEvent::PeerDiscovered(from)
                | TransportEvent::PeerDisconnected(from) => self.reachable.contains(from),
            })
            .collect()
    }
}

/// Slots named by `Spawned` events, in order.
#[allow(dead_code)]
pub fn spawned_slots<A: PeerAddress>(events: &[WhackEvent<A>]) -> Vec<SlotIndex> {
    events
        .iter()
        .filter_map(|event| match event {
            WhackEvent::Spawned { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect()
}

/// One render hook invocation.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Spawn(SlotIndex, TargetId),
    Retire(TargetId, SlotIndex, RetireReason),
    Score(u32),
    Remaining(u32),
    Complete(u32),
}

/// Render sink that records the hooks it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<SinkCall>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn spawns_at(&self, slot: SlotIndex) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Spawn(s, _) if *s == slot))
            .count()
    }

    pub fn last_remaining(&self) -> Option<u32> {
        self.calls.iter().rev().find_map(|call| match call {
            SinkCall::Remaining(remaining) => Some(*remaining),
            _ => None,
        })
    }
}

impl<A: PeerAddress> RenderSink<A> for RecordingSink {
    fn on_spawn(&mut self, slot: SlotIndex, target: TargetId) {
        self.calls.push(SinkCall::Spawn(slot, target));
    }

    fn on_retire(&mut self, target: TargetId, slot: SlotIndex, reason: RetireReason) {
        self.calls.push(SinkCall::Retire(target, slot, reason));
    }

    fn on_score_changed(&mut self, score: u32) {
        self.calls.push(SinkCall::Score(score));
    }

    fn on_remaining_changed(&mut self, remaining: u32) {
        self.calls.push(SinkCall::Remaining(remaining));
    }

    fn on_session_complete(&mut self, score: u32) {
        self.calls.push(SinkCall::Complete(score));
    }
}
