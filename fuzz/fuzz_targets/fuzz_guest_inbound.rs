//! Fuzz target for a guest session fed arbitrary payloads from several peers.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary traffic
//! - Replica counters and board stay consistent

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use whack_sync::telemetry::InvariantChecker;
use whack_sync::{Destination, ManualClock, MemoryNetwork, Role, SessionBuilder, Transport};

#[derive(Debug, Arbitrary)]
struct Packet {
    from: u8,
    payload: Vec<u8>,
    advance_ms: u8,
    tap: Option<u128>,
}

fuzz_target!(|packets: Vec<Packet>| {
    let network = MemoryNetwork::<u8>::new();
    let clock = ManualClock::new();
    let Ok(mut guest) = SessionBuilder::<u8>::new()
        .with_role(Role::Guest)
        .with_clock(clock.clone())
        .start_session(network.endpoint(0))
    else {
        return;
    };
    let mut peers: Vec<_> = (1..=3u8).map(|addr| network.endpoint(addr)).collect();
    for packet in packets.into_iter().take(256) {
        let sender = &mut peers[usize::from(packet.from % 3)];
        sender.send(&packet.payload, &Destination::Peer(0));
        clock.advance_millis(u64::from(packet.advance_ms));
        guest.poll();
        if let Some(id) = packet.tap {
            guest.on_tap_resolved(Some(whack_sync::TargetId::new(id)));
        }
        guest.state().check_invariants().expect("replica invariants hold");
        let _ = guest.events().count();
    }
});
