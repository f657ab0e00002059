//! Peer registry for tracking connected peers and their sync progress.
//!
//! This module provides the [`PeerRegistry`] struct that records every peer the transport
//! has reported, the role each one plays, and the highest sync sequence number received
//! from it. Peers own no game state.

use std::collections::BTreeMap;

use crate::{PeerAddress, Role, SimTime};

/// One connected peer.
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and fuzzing.
/// It is not part of the stable public API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSession<A: PeerAddress> {
    address: A,
    role: Role,
    joined_at: SimTime,
    last_seq: Option<u64>,
    messages_received: u64,
}

impl<A: PeerAddress> PeerSession<A> {
    fn new(address: A, joined_at: SimTime) -> Self {
        Self {
            address,
            role: Role::Guest,
            joined_at,
            last_seq: None,
            messages_received: 0,
        }
    }

    /// The peer's transport address.
    pub fn address(&self) -> &A {
        &self.address
    }

    /// Host or guest, as far as this replica knows.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// When the peer was first seen.
    #[must_use]
    pub fn joined_at(&self) -> SimTime {
        self.joined_at
    }

    /// Highest sequence number received from this peer.
    #[must_use]
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Payloads that decoded successfully.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }
}

/// Registry of all peers the transport has reported.
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and fuzzing.
/// It is not part of the stable public API.
///
/// ```
/// use whack_sync::__internal::PeerRegistry;
/// use whack_sync::{Role, SimTime};
///
/// let mut registry = PeerRegistry::<u8>::new();
/// assert!(registry.register(1, SimTime::ZERO));
/// assert!(!registry.register(1, SimTime::ZERO));
/// registry.set_host(1);
/// assert_eq!(registry.host(), Some(&1));
/// assert_eq!(registry.get(&1).map(|p| p.role()), Some(Role::Host));
/// ```
#[derive(Debug, Clone)]
pub struct PeerRegistry<A: PeerAddress> {
    peers: BTreeMap<A, PeerSession<A>>,
    host: Option<A>,
}

impl<A: PeerAddress> Default for PeerRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: PeerAddress> PeerRegistry<A> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: BTreeMap::new(),
            host: None,
        }
    }

    /// Adds a peer. Returns `false` if it was already known.
    pub fn register(&mut self, address: A, now: SimTime) -> bool {
        if self.peers.contains_key(&address) {
            return false;
        }
        let mut peer = PeerSession::new(address.clone(), now);
        if self.host.as_ref() == Some(&address) {
            peer.role = Role::Host;
        }
        self.peers.insert(address, peer);
        true
    }

    /// Removes a peer. The host address is remembered so a reconnecting host keeps its role.
    pub fn remove(&mut self, address: &A) -> Option<PeerSession<A>> {
        self.peers.remove(address)
    }

    /// Marks `address` as the session host. Any previous host becomes a guest.
    pub fn set_host(&mut self, address: A) {
        if let Some(previous) = self.host.take() {
            if let Some(peer) = self.peers.get_mut(&previous) {
                peer.role = Role::Guest;
            }
        }
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.role = Role::Host;
        }
        self.host = Some(address);
    }

    /// The host's address, if known.
    #[must_use]
    pub fn host(&self) -> Option<&A> {
        self.host.as_ref()
    }

    /// Records a decoded payload from `address`. Returns `true` if `seq` is the highest
    /// seen from that peer so far.
    ///
    /// Unknown peers are registered on the fly.
    pub fn observe(&mut self, address: &A, seq: u64, now: SimTime) -> bool {
        self.register(address.clone(), now);
        let Some(peer) = self.peers.get_mut(address) else {
            return false;
        };
        peer.messages_received += 1;
        match peer.last_seq {
            Some(last) if last >= seq => false,
            _ => {
                peer.last_seq = Some(seq);
                true
            },
        }
    }

    /// Looks up a peer.
    #[must_use]
    pub fn get(&self, address: &A) -> Option<&PeerSession<A>> {
        self.peers.get(address)
    }

    /// Returns `true` if `address` is connected.
    #[must_use]
    pub fn contains(&self, address: &A) -> bool {
        self.peers.contains_key(address)
    }

    /// All connected peers in address order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerSession<A>> + '_ {
        self.peers.values()
    }

    /// Number of connected peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if no peer is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
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

    #[test]
    fn register_is_idempotent() {
        let mut registry = PeerRegistry::<u8>::new();
        assert!(registry.register(3, SimTime::from_millis(5)));
        assert!(!registry.register(3, SimTime::from_millis(9)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&3).unwrap().joined_at(), SimTime::from_millis(5));
        assert_eq!(registry.get(&3).unwrap().role(), Role::Guest);
    }

    #[test]
    fn remove_forgets_peer() {
        let mut registry = PeerRegistry::<u8>::new();
        registry.register(1, SimTime::ZERO);
        assert!(registry.remove(&1).is_some());
        assert!(registry.remove(&1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn observe_tracks_highest_sequence() {
        let mut registry = PeerRegistry::<u8>::new();
        assert!(registry.observe(&7, 4, SimTime::ZERO));
        assert!(!registry.observe(&7, 2, SimTime::ZERO));
        assert!(!registry.observe(&7, 4, SimTime::ZERO));
        assert!(registry.observe(&7, 5, SimTime::ZERO));
        let peer = registry.get(&7).unwrap();
        assert_eq!(peer.last_seq(), Some(5));
        assert_eq!(peer.messages_received(), 4);
    }

    #[test]
    fn observe_registers_unknown_peer() {
        let mut registry = PeerRegistry::<u8>::new();
        registry.observe(&2, 0, SimTime::from_millis(10));
        assert!(registry.contains(&2));
    }

    #[test]
    fn host_role_moves_and_survives_reconnect() {
        let mut registry = PeerRegistry::<u8>::new();
        registry.register(1, SimTime::ZERO);
        registry.register(2, SimTime::ZERO);
        registry.set_host(1);
        registry.set_host(2);
        assert_eq!(registry.get(&1).unwrap().role(), Role::Guest);
        assert_eq!(registry.get(&2).unwrap().role(), Role::Host);

        registry.remove(&2);
        registry.register(2, SimTime::from_secs(1));
        assert_eq!(registry.get(&2).unwrap().role(), Role::Host);
    }

    #[test]
    fn iter_is_address_ordered() {
        let mut registry = PeerRegistry::<u8>::new();
        for addr in [9, 3, 5] {
            registry.register(addr, SimTime::ZERO);
        }
        let order: Vec<u8> = registry.iter().map(|p| *p.address()).collect();
        assert_eq!(order, vec![3, 5, 9]);
    }
}
