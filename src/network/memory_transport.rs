//! In-process transport for tests, simulations and single-device demos.
//!
//! A [`MemoryNetwork`] is a set of mailboxes behind one lock. Each
//! [`MemoryTransport`] endpoint owns one mailbox; sending appends to the recipient's,
//! receiving drains its own. Endpoints discover each other when created and see each
//! other leave when dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::{Destination, PeerAddress, Transport, TransportEvent};

#[derive(Debug)]
struct Mailboxes<A: PeerAddress> {
    inboxes: BTreeMap<A, Vec<TransportEvent<A>>>,
}

/// A shared in-memory network. Cloning yields another handle to the same network.
///
/// ```
/// use whack_sync::{Destination, MemoryNetwork, Transport, TransportEvent};
///
/// let network = MemoryNetwork::<u8>::new();
/// let mut a = network.endpoint(1);
/// let mut b = network.endpoint(2);
/// a.send(&[7], &Destination::Peer(2));
///
/// let events = b.receive_all();
/// assert_eq!(events[0], TransportEvent::PeerDiscovered(1));
/// assert_eq!(events[1], TransportEvent::Received { from: 1, payload: vec![7] });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryNetwork<A: PeerAddress> {
    inner: Arc<Mutex<Mailboxes<A>>>,
}

impl<A: PeerAddress> Default for MemoryNetwork<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: PeerAddress> MemoryNetwork<A> {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Mailboxes {
                inboxes: BTreeMap::new(),
            })),
        }
    }

    /// Attaches an endpoint at `address`.
    ///
    /// Every existing endpoint learns about the newcomer and the newcomer learns about
    /// every existing endpoint. Attaching an address twice replaces the old mailbox.
    #[must_use]
    pub fn endpoint(&self, address: A) -> MemoryTransport<A> {
        let mut mailboxes = self.inner.lock();
        let mut greetings = Vec::new();
        for (peer, inbox) in &mut mailboxes.inboxes {
            if *peer != address {
                inbox.push(TransportEvent::PeerDiscovered(address.clone()));
                greetings.push(TransportEvent::PeerDiscovered(peer.clone()));
            }
        }
        mailboxes.inboxes.insert(address.clone(), greetings);
        MemoryTransport {
            address,
            network: self.clone(),
        }
    }

    /// Addresses with an attached endpoint.
    #[must_use]
    pub fn addresses(&self) -> Vec<A> {
        self.inner.lock().inboxes.keys().cloned().collect()
    }

    /// Events waiting in `address`'s mailbox.
    #[must_use]
    pub fn pending(&self, address: &A) -> usize {
        self.inner
            .lock()
            .inboxes
            .get(address)
            .map_or(0, Vec::len)
    }

    fn deliver(&self, from: &A, payload: &[u8], destination: &Destination<A>) {
        let mut mailboxes = self.inner.lock();
        match destination {
            Destination::Peer(to) => {
                if to == from {
                    return;
                }
                match mailboxes.inboxes.get_mut(to) {
                    Some(inbox) => inbox.push(TransportEvent::Received {
                        from: from.clone(),
                        payload: payload.to_vec(),
                    }),
                    None => trace!(?to, "Dropped payload for detached endpoint"),
                }
            },
            Destination::Broadcast => {
                for (peer, inbox) in &mut mailboxes.inboxes {
                    if peer != from {
                        inbox.push(TransportEvent::Received {
                            from: from.clone(),
                            payload: payload.to_vec(),
                        });
                    }
                }
            },
        }
    }

    fn drain(&self, address: &A) -> Vec<TransportEvent<A>> {
        self.inner
            .lock()
            .inboxes
            .get_mut(address)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn detach(&self, address: &A) {
        let mut mailboxes = self.inner.lock();
        if mailboxes.inboxes.remove(address).is_none() {
            return;
        }
        for inbox in mailboxes.inboxes.values_mut() {
            inbox.push(TransportEvent::PeerDisconnected(address.clone()));
        }
    }
}

/// One endpoint of a [`MemoryNetwork`]. Dropping it detaches it from the network.
#[derive(Debug)]
pub struct MemoryTransport<A: PeerAddress> {
    address: A,
    network: MemoryNetwork<A>,
}

impl<A: PeerAddress> MemoryTransport<A> {
    /// This endpoint's address.
    pub fn address(&self) -> &A {
        &self.address
    }
}

impl<A: PeerAddress> Transport<A> for MemoryTransport<A> {
    fn send(&mut self, payload: &[u8], destination: &Destination<A>) {
        self.network.deliver(&self.address, payload, destination);
    }

    fn receive_all(&mut self) -> Vec<TransportEvent<A>> {
        self.network.drain(&self.address)
    }
}

impl<A: PeerAddress> Drop for MemoryTransport<A> {
    fn drop(&mut self) {
        self.network.detach(&self.address);
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

    fn payloads(events: &[TransportEvent<u8>]) -> Vec<(u8, Vec<u8>)> {
        events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Received { from, payload } => Some((*from, payload.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn endpoints_discover_each_other() {
        let network = MemoryNetwork::<u8>::new();
        let mut a = network.endpoint(1);
        let mut b = network.endpoint(2);
        assert_eq!(a.receive_all(), vec![TransportEvent::PeerDiscovered(2)]);
        assert_eq!(b.receive_all(), vec![TransportEvent::PeerDiscovered(1)]);
    }

    #[test]
    fn broadcast_skips_sender() {
        let network = MemoryNetwork::<u8>::new();
        let mut a = network.endpoint(1);
        let mut b = network.endpoint(2);
        let mut c = network.endpoint(3);
        a.send(&[9], &Destination::Broadcast);
        assert!(payloads(&a.receive_all()).is_empty());
        assert_eq!(payloads(&b.receive_all()), vec![(1, vec![9])]);
        assert_eq!(payloads(&c.receive_all()), vec![(1, vec![9])]);
    }

    #[test]
    fn point_to_point_reaches_only_target() {
        let network = MemoryNetwork::<u8>::new();
        let mut a = network.endpoint(1);
        let mut b = network.endpoint(2);
        let mut c = network.endpoint(3);
        a.send(&[4], &Destination::Peer(3));
        a.send(&[5], &Destination::Peer(99));
        assert!(payloads(&b.receive_all()).is_empty());
        assert_eq!(payloads(&c.receive_all()), vec![(1, vec![4])]);
    }

    #[test]
    fn receive_drains_mailbox() {
        let network = MemoryNetwork::<u8>::new();
        let a = network.endpoint(1);
        let mut b = network.endpoint(2);
        drop(a);
        assert_eq!(network.pending(&2), 2);
        let _ = b.receive_all();
        assert_eq!(network.pending(&2), 0);
    }

    #[test]
    fn dropping_endpoint_reports_disconnect() {
        let network = MemoryNetwork::<u8>::new();
        let a = network.endpoint(1);
        let mut b = network.endpoint(2);
        drop(a);
        assert_eq!(
            b.receive_all(),
            vec![
                TransportEvent::PeerDiscovered(1),
                TransportEvent::PeerDisconnected(1)
            ]
        );
        assert_eq!(network.addresses(), vec![2]);
    }

    #[test]
    fn shared_across_threads() {
        let network = MemoryNetwork::<u8>::new();
        let mut receiver = network.endpoint(0);
        let handles: Vec<_> = (1..=4u8)
            .map(|addr| {
                let network = network.clone();
                std::thread::spawn(move || {
                    let mut endpoint = network.endpoint(addr);
                    endpoint.send(&[addr], &Destination::Peer(0));
                    endpoint
                })
            })
            .collect();
        // Held so the senders stay attached until the mailbox is read.
        let senders: Vec<MemoryTransport<u8>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(payloads(&receiver.receive_all()).len(), 4);
        assert_eq!(senders.len(), 4);
    }
}
