//! A configurable transport wrapper for network fault injection testing.
//!
//! [`ChaosTransport`] wraps any [`Transport`] implementation to simulate the delivery
//! guarantees the sync protocol is built for: payloads may be lost, duplicated, delayed
//! or reordered. Discovery and disconnect events always pass through untouched.
//!
//! # Example
//!
//! ```
//! use whack_sync::{ChaosConfig, ChaosTransport, MemoryNetwork};
//!
//! let config = ChaosConfig::builder()
//!     .packet_loss_rate(0.05)
//!     .duplication_rate(0.1)
//!     .delay_polls(2)
//!     .seed(42)
//!     .build();
//!
//! let network = MemoryNetwork::<u8>::new();
//! let transport = ChaosTransport::new(network.endpoint(1), config);
//! assert_eq!(transport.packets_in_flight(), 0);
//! ```
//!
//! # Features
//!
//! - **Loss**: independent drop rates for outgoing and incoming payloads
//! - **Burst loss**: runs of consecutive dropped sends
//! - **Duplication**: extra copies of sent payloads
//! - **Delay**: payloads held for a number of receive calls
//! - **Reordering**: shuffles released payloads
//! - **Deterministic**: seeded RNG for reproducible test scenarios

use std::collections::VecDeque;

use crate::rng::{Pcg32, Rng, SeedableRng};
use crate::{Destination, PeerAddress, Transport, TransportEvent};

/// Configuration for network chaos simulation.
///
/// Use [`ChaosConfig::builder()`] for a fluent configuration API.
/// All rates default to 0.0 and all counts to zero (no effect).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChaosConfig {
    /// Probability of dropping a payload on send (0.0 - 1.0, default: 0.0)
    pub send_loss_rate: f64,

    /// Probability of dropping a payload on receive (0.0 - 1.0, default: 0.0)
    pub receive_loss_rate: f64,

    /// Probability of duplicating a sent payload (0.0 - 1.0, default: 0.0)
    pub duplication_rate: f64,

    /// Receive calls a payload is held before delivery (default: 0)
    pub delay_polls: usize,

    /// Probability of swapping each released payload with a random other one (0.0 - 1.0, default: 0.0)
    pub reorder_rate: f64,

    /// Probability of starting a burst loss event on send (0.0 - 1.0, default: 0.0)
    pub burst_loss_probability: f64,

    /// Consecutive sends dropped during a burst (default: 0)
    pub burst_loss_length: usize,

    /// Random seed for deterministic behavior (default: random)
    pub seed: Option<u64>,
}

impl ChaosConfig {
    /// Creates a new builder for fluent configuration.
    pub fn builder() -> ChaosConfigBuilder {
        ChaosConfigBuilder::new()
    }

    /// No chaos.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Loss at `loss_rate` in both directions.
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            send_loss_rate: loss_rate,
            receive_loss_rate: loss_rate,
            ..Default::default()
        }
    }

    /// Loss, duplication, delay and reordering together.
    pub fn terrible_network() -> Self {
        Self {
            send_loss_rate: 0.15,
            receive_loss_rate: 0.15,
            duplication_rate: 0.05,
            delay_polls: 3,
            reorder_rate: 0.3,
            ..Default::default()
        }
    }
}

/// Builder for [`ChaosConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChaosConfigBuilder {
    config: ChaosConfig,
}

impl ChaosConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets packet loss rate for both send and receive.
    pub fn packet_loss_rate(mut self, rate: f64) -> Self {
        self.config.send_loss_rate = rate.clamp(0.0, 1.0);
        self.config.receive_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets packet loss rate for sending only.
    pub fn send_loss_rate(mut self, rate: f64) -> Self {
        self.config.send_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets packet loss rate for receiving only.
    pub fn receive_loss_rate(mut self, rate: f64) -> Self {
        self.config.receive_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the duplication rate.
    pub fn duplication_rate(mut self, rate: f64) -> Self {
        self.config.duplication_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Holds received payloads for `polls` receive calls.
    pub fn delay_polls(mut self, polls: usize) -> Self {
        self.config.delay_polls = polls;
        self
    }

    /// Sets the reorder rate.
    pub fn reorder_rate(mut self, rate: f64) -> Self {
        self.config.reorder_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets burst loss parameters.
    ///
    /// When a burst is triggered (with `probability`), `length` consecutive
    /// sends are dropped.
    pub fn burst_loss(mut self, probability: f64, length: usize) -> Self {
        self.config.burst_loss_probability = probability.clamp(0.0, 1.0);
        self.config.burst_loss_length = length;
        self
    }

    /// Sets the random seed for deterministic behavior.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ChaosConfig {
        self.config
    }
}

/// Statistics about chaos transport behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChaosStats {
    /// Payloads handed to `send`, counted once per destination call
    pub packets_sent: u64,
    /// Payloads dropped on send
    pub packets_dropped_send: u64,
    /// Payloads duplicated on send
    pub packets_duplicated: u64,
    /// Payloads delivered to the caller
    pub packets_received: u64,
    /// Payloads dropped on receive
    pub packets_dropped_receive: u64,
    /// Swaps performed while reordering
    pub packets_reordered: u64,
    /// Burst loss events triggered
    pub burst_loss_events: u64,
    /// Payloads dropped due to burst loss
    pub packets_dropped_burst: u64,
}

#[derive(Debug)]
struct InFlight<A> {
    from: A,
    payload: Vec<u8>,
    polls_left: usize,
}

/// A transport wrapper that injects configurable network chaos.
#[derive(Debug)]
pub struct ChaosTransport<A: PeerAddress, T: Transport<A>> {
    inner: T,
    config: ChaosConfig,
    rng: Pcg32,
    in_flight: VecDeque<InFlight<A>>,
    burst_loss_remaining: usize,
    stats: ChaosStats,
}

impl<A: PeerAddress, T: Transport<A>> ChaosTransport<A, T> {
    /// Creates a new chaos transport wrapping `inner`.
    pub fn new(inner: T, config: ChaosConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_entropy(),
        };
        Self {
            inner,
            config,
            rng,
            in_flight: VecDeque::new(),
            burst_loss_remaining: 0,
            stats: ChaosStats::default(),
        }
    }

    /// Returns a reference to the inner transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Returns a mutable reference to the inner transport.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consumes the wrapper and returns the inner transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Returns the current chaos configuration.
    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// Updates the chaos configuration. Payloads already in flight keep their delay.
    pub fn set_config(&mut self, config: ChaosConfig) {
        self.config = config;
    }

    /// Returns statistics about chaos behavior.
    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }

    /// Resets statistics counters.
    pub fn reset_stats(&mut self) {
        self.stats = ChaosStats::default();
    }

    /// Payloads received but not yet delivered.
    pub fn packets_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn should_drop_burst(&mut self) -> bool {
        if self.burst_loss_remaining > 0 {
            self.burst_loss_remaining -= 1;
            self.stats.packets_dropped_burst += 1;
            return true;
        }
        if self.config.burst_loss_length > 0 && self.rng.gen_bool(self.config.burst_loss_probability)
        {
            self.stats.burst_loss_events += 1;
            self.burst_loss_remaining = self.config.burst_loss_length.saturating_sub(1);
            self.stats.packets_dropped_burst += 1;
            return true;
        }
        false
    }

    fn reorder(&mut self, payloads: &mut [TransportEvent<A>]) {
        if self.config.reorder_rate <= 0.0 || payloads.len() < 2 {
            return;
        }
        for i in 0..payloads.len() {
            if self.rng.gen_bool(self.config.reorder_rate) {
                let j = self.rng.gen_range_usize(0..payloads.len());
                if i != j {
                    payloads.swap(i, j);
                    self.stats.packets_reordered += 1;
                }
            }
        }
    }
}

impl<A: PeerAddress, T: Transport<A>> Transport<A> for ChaosTransport<A, T> {
    fn send(&mut self, payload: &[u8], destination: &Destination<A>) {
        self.stats.packets_sent += 1;

        // Burst loss takes priority.
        if self.should_drop_burst() {
            return;
        }
        if self.rng.gen_bool(self.config.send_loss_rate) {
            self.stats.packets_dropped_send += 1;
            return;
        }
        self.inner.send(payload, destination);
        if self.rng.gen_bool(self.config.duplication_rate) {
            self.stats.packets_duplicated += 1;
            self.inner.send(payload, destination);
        }
    }

    fn receive_all(&mut self) -> Vec<TransportEvent<A>> {
        let mut passthrough = Vec::new();
        for event in self.inner.receive_all() {
            match event {
                TransportEvent::Received { from, payload } => {
                    if self.rng.gen_bool(self.config.receive_loss_rate) {
                        self.stats.packets_dropped_receive += 1;
                        continue;
                    }
                    self.in_flight.push_back(InFlight {
                        from,
                        payload,
                        polls_left: self.config.delay_polls,
                    });
                },
                other => passthrough.push(other),
            }
        }

        let mut ready = Vec::new();
        let mut still_flying = VecDeque::with_capacity(self.in_flight.len());
        for mut packet in self.in_flight.drain(..) {
            if packet.polls_left == 0 {
                ready.push(TransportEvent::Received {
                    from: packet.from,
                    payload: packet.payload,
                });
            } else {
                packet.polls_left -= 1;
                still_flying.push_back(packet);
            }
        }
        self.in_flight = still_flying;

        self.reorder(&mut ready);
        self.stats.packets_received += ready.len() as u64;
        passthrough.extend(ready);
        passthrough
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

    /// A simple in-memory transport for testing.
    #[derive(Default)]
    struct TestTransport {
        sent: Vec<(Vec<u8>, Destination<u8>)>,
        to_receive: Vec<TransportEvent<u8>>,
    }

    impl Transport<u8> for TestTransport {
        fn send(&mut self, payload: &[u8], destination: &Destination<u8>) {
            self.sent.push((payload.to_vec(), destination.clone()));
        }

        fn receive_all(&mut self) -> Vec<TransportEvent<u8>> {
            std::mem::take(&mut self.to_receive)
        }
    }

    fn received(n: u8) -> TransportEvent<u8> {
        TransportEvent::Received {
            from: 1,
            payload: vec![n],
        }
    }

    #[test]
    fn passthrough_changes_nothing() {
        let mut transport = ChaosTransport::new(TestTransport::default(), ChaosConfig::passthrough());
        transport.send(&[1], &Destination::Broadcast);
        transport.inner_mut().to_receive = vec![received(1), TransportEvent::PeerDiscovered(2)];
        let events = transport.receive_all();
        assert_eq!(transport.inner().sent.len(), 1);
        assert_eq!(events, vec![TransportEvent::PeerDiscovered(2), received(1)]);
        assert_eq!(transport.stats().packets_received, 1);
    }

    #[test]
    fn total_send_loss_drops_everything() {
        let config = ChaosConfig::builder().send_loss_rate(1.0).seed(42).build();
        let mut transport = ChaosTransport::new(TestTransport::default(), config);
        for _ in 0..10 {
            transport.send(&[0], &Destination::Peer(3));
        }
        assert_eq!(transport.stats().packets_sent, 10);
        assert_eq!(transport.stats().packets_dropped_send, 10);
        assert!(transport.inner().sent.is_empty());
    }

    #[test]
    fn receive_loss_spares_discovery() {
        let config = ChaosConfig::builder().receive_loss_rate(1.0).seed(1).build();
        let mut transport = ChaosTransport::new(TestTransport::default(), config);
        transport.inner_mut().to_receive =
            vec![received(1), TransportEvent::PeerDisconnected(1), received(2)];
        let events = transport.receive_all();
        assert_eq!(events, vec![TransportEvent::PeerDisconnected(1)]);
        assert_eq!(transport.stats().packets_dropped_receive, 2);
    }

    #[test]
    fn full_duplication_sends_twice() {
        let config = ChaosConfig::builder().duplication_rate(1.0).seed(7).build();
        let mut transport = ChaosTransport::new(TestTransport::default(), config);
        transport.send(&[5], &Destination::Broadcast);
        assert_eq!(transport.inner().sent.len(), 2);
        assert_eq!(transport.stats().packets_duplicated, 1);
    }

    #[test]
    fn delay_holds_payloads_for_polls() {
        let config = ChaosConfig::builder().delay_polls(2).build();
        let mut transport = ChaosTransport::new(TestTransport::default(), config);
        transport.inner_mut().to_receive = vec![received(1)];
        assert!(transport.receive_all().is_empty());
        assert_eq!(transport.packets_in_flight(), 1);
        assert!(transport.receive_all().is_empty());
        assert_eq!(transport.receive_all(), vec![received(1)]);
        assert_eq!(transport.packets_in_flight(), 0);
    }

    #[test]
    fn reordering_keeps_every_payload() {
        let config = ChaosConfig::builder().reorder_rate(1.0).seed(3).build();
        let mut transport = ChaosTransport::new(TestTransport::default(), config);
        transport.inner_mut().to_receive = (0..8).map(received).collect();
        let mut payloads: Vec<u8> = transport
            .receive_all()
            .into_iter()
            .map(|e| match e {
                TransportEvent::Received { payload, .. } => payload[0],
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        payloads.sort_unstable();
        assert_eq!(payloads, (0..8).collect::<Vec<u8>>());
    }

    #[test]
    fn burst_loss_drops_consecutive_sends() {
        let config = ChaosConfig::builder().burst_loss(1.0, 3).seed(9).build();
        let mut transport = ChaosTransport::new(TestTransport::default(), config);
        for _ in 0..3 {
            transport.send(&[0], &Destination::Broadcast);
        }
        assert!(transport.inner().sent.is_empty());
        assert_eq!(transport.stats().burst_loss_events, 1);
        assert_eq!(transport.stats().packets_dropped_burst, 3);
    }

    #[test]
    fn same_seed_same_chaos() {
        let run = || {
            let config = ChaosConfig::builder().send_loss_rate(0.5).seed(11).build();
            let mut transport = ChaosTransport::new(TestTransport::default(), config);
            for n in 0..32u8 {
                transport.send(&[n], &Destination::Broadcast);
            }
            transport.into_inner().sent
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn builder_clamps_rates() {
        let config = ChaosConfig::builder()
            .packet_loss_rate(1.5)
            .duplication_rate(-0.5)
            .build();
        assert_eq!(config.send_loss_rate, 1.0);
        assert_eq!(config.receive_loss_rate, 1.0);
        assert_eq!(config.duplication_rate, 0.0);
    }
}
