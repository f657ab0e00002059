//! Host and guest over real UDP sockets on loopback.
//!
//! Serialized so parallel test binaries do not compete for loopback buffers.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serial_test::serial;
use whack_sync::{ManualClock, UdpTransport, WhackEvent};

use crate::common::{forced_host, guest, init_tracing, poll_with_sleep, slot, RecordingSink};

fn loopback(transport: &UdpTransport) -> SocketAddr {
    let port = transport.local_addr().unwrap().port();
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

#[test]
#[serial]
#[cfg(not(miri))]
fn placement_crosses_real_sockets() {
    init_tracing();
    let clock = ManualClock::new();
    let mut host_socket = UdpTransport::bind_to_port(0).unwrap();
    let mut guest_socket = UdpTransport::bind_to_port(0).unwrap();
    let host_addr = loopback(&host_socket);
    let guest_addr = loopback(&guest_socket);
    host_socket.connect(guest_addr);
    guest_socket.connect(host_addr);

    let mut host = forced_host(host_socket, &clock, &[(50, 9)]);
    let mut guest = guest(guest_socket, &clock, 1);
    host.set_world_reference(vec![0xAB; 256]).unwrap();
    clock.advance_millis(50);

    let mut sink = RecordingSink::default();
    let converged = poll_with_sleep(&mut [&mut host, &mut guest], |sessions| {
        sessions[1].state().grid().occupancy(slot(9)).target().is_some()
            && sessions[1].world_reference().is_some()
    });
    assert!(converged, "guest never mirrored the placement");

    let events: Vec<_> = guest.events().collect();
    assert!(events.iter().any(|event| matches!(
        event,
        WhackEvent::WorldReferenceReceived { peer, .. } if *peer == host_addr
    )));
    whack_sync::EventDispatcher::dispatch_all(events, &mut sink);
    assert_eq!(sink.spawns_at(slot(9)), 1);
    assert_eq!(guest.host_address(), Some(&host_addr));
}

#[test]
#[serial]
#[cfg(not(miri))]
fn guest_hit_reaches_host() {
    let clock = ManualClock::new();
    let mut host_socket = UdpTransport::bind_to_port(0).unwrap();
    let mut guest_socket = UdpTransport::bind_to_port(0).unwrap();
    let (host_addr, guest_addr) = (loopback(&host_socket), loopback(&guest_socket));
    host_socket.connect(guest_addr);
    guest_socket.connect(host_addr);

    let mut host = forced_host(host_socket, &clock, &[(0, 4)]);
    let mut guest = guest(guest_socket, &clock, 1);
    assert!(poll_with_sleep(&mut [&mut host, &mut guest], |sessions| {
        sessions[1].state().active_count() == 1
    }));

    let target = guest.state().grid().occupancy(slot(4)).target().unwrap();
    guest.on_tap_resolved(Some(target));
    assert!(poll_with_sleep(&mut [&mut host, &mut guest], |sessions| {
        sessions[0].is_complete()
    }));
    assert_eq!(guest.score(), 1);
    assert_eq!(host.score(), 0);
}
