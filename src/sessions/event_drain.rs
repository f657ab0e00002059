use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::{PeerAddress, WhackEvent};

/// Iterator returned by [`WhackSession::events`](crate::WhackSession::events).
///
/// Wraps the session's queue drain so the concrete std type stays out of the public API.
/// Events not consumed before the drain is dropped are discarded.
///
/// ```
/// use whack_sync::prelude::*;
///
/// # fn main() -> Result<(), WhackError> {
/// let network = MemoryNetwork::<u8>::new();
/// let mut session = SessionBuilder::<u8>::new().start_session(network.endpoint(0))?;
/// for event in session.events() {
///     match event {
///         WhackEvent::Spawned { slot, .. } => println!("mole at {slot}"),
///         _ => {},
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain<'a, A: PeerAddress> {
    inner: Drain<'a, WhackEvent<A>>,
}

impl<'a, A: PeerAddress> EventDrain<'a, A> {
    pub(crate) fn from_drain(drain: Drain<'a, WhackEvent<A>>) -> Self {
        Self { inner: drain }
    }
}

impl<A: PeerAddress> Iterator for EventDrain<'_, A> {
    type Item = WhackEvent<A>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<A: PeerAddress> DoubleEndedIterator for EventDrain<'_, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<A: PeerAddress> ExactSizeIterator for EventDrain<'_, A> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<A: PeerAddress> FusedIterator for EventDrain<'_, A> {}

impl<A: PeerAddress> std::fmt::Debug for EventDrain<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDrain")
            .field("remaining", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::iter_with_drain
)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn score(score: u32) -> WhackEvent<u8> {
        WhackEvent::ScoreChanged { score }
    }

    fn queue_of(n: u32) -> VecDeque<WhackEvent<u8>> {
        (1..=n).map(score).collect()
    }

    #[test]
    fn yields_events_in_order() {
        let mut queue = queue_of(3);
        let events: Vec<_> = EventDrain::from_drain(queue.drain(..)).collect();
        assert_eq!(events, vec![score(1), score(2), score(3)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn is_fused() {
        let mut queue = queue_of(1);
        let mut drain = EventDrain::from_drain(queue.drain(..));
        assert!(drain.next().is_some());
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
    }

    #[test]
    fn double_ended() {
        let mut queue = queue_of(3);
        let mut drain = EventDrain::from_drain(queue.drain(..));
        assert_eq!(drain.next_back(), Some(score(3)));
        assert_eq!(drain.next(), Some(score(1)));
        assert_eq!(drain.len(), 1);
    }

    #[test]
    fn dropping_discards_the_rest() {
        let mut queue = queue_of(4);
        {
            let mut drain = EventDrain::from_drain(queue.drain(..));
            let _ = drain.next();
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn debug_shows_remaining() {
        let mut queue = queue_of(2);
        let drain = EventDrain::from_drain(queue.drain(..));
        assert_eq!(format!("{drain:?}"), "EventDrain { remaining: 2 }");
    }
}
