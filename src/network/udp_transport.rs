use std::{
    collections::BTreeSet,
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
};

use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{Destination, Transport, TransportEvent};

/// Largest UDP payload over IPv4.
const RECV_BUFFER_SIZE: usize = 65_507;
/// A packet larger than this may be fragmented, so ideally we wouldn't send packets larger than
/// this.
/// Source: <https://stackoverflow.com/a/35697810/775982>
const IDEAL_MAX_UDP_PACKET_SIZE: usize = 508;

/// A simple non-blocking UDP transport for whack sessions. Listens to 0.0.0.0 on a given port.
///
/// UDP has no discovery, so peers are introduced explicitly with [`UdpTransport::connect`],
/// which also sends an empty "hello" datagram so the other side learns about us. Any
/// datagram from an unknown address registers its sender. Empty datagrams are never
/// reported as payloads.
///
/// World references larger than one datagram cannot travel over this transport; keep them
/// under [`RECV_BUFFER_SIZE`] or use a platform transport.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peers: BTreeSet<SocketAddr>,
    pending: Vec<TransportEvent<SocketAddr>>,
    /// Receive buffer - reused across recv_from calls
    recv_buffer: Box<[u8]>,
}

impl UdpTransport {
    /// Binds an UDP Socket to 0.0.0.0:port and set it to non-blocking mode.
    pub fn bind_to_port(port: u16) -> Result<Self, std::io::Error> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            peers: BTreeSet::new(),
            pending: Vec::new(),
            recv_buffer: vec![0; RECV_BUFFER_SIZE].into_boxed_slice(),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    /// Adds `peer` and greets it. The peer is reported as discovered on the next
    /// [`Transport::receive_all`].
    pub fn connect(&mut self, peer: SocketAddr) {
        if self.peers.insert(peer) {
            self.pending.push(TransportEvent::PeerDiscovered(peer));
        }
        self.send_datagram(&[], &peer);
    }

    /// Forgets `peer`. It is reported as disconnected on the next receive.
    pub fn disconnect(&mut self, peer: &SocketAddr) {
        if self.peers.remove(peer) {
            self.pending.push(TransportEvent::PeerDisconnected(*peer));
        }
    }

    /// Known peers.
    pub fn peers(&self) -> impl Iterator<Item = &SocketAddr> + '_ {
        self.peers.iter()
    }

    fn send_datagram(&self, buf: &[u8], addr: &SocketAddr) {
        // Fragmented datagrams are lost whole if any fragment is lost.
        if buf.len() > IDEAL_MAX_UDP_PACKET_SIZE {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::SyncProtocol,
                "Sending UDP packet of size {} bytes, which is larger than ideal ({})",
                buf.len(),
                IDEAL_MAX_UDP_PACKET_SIZE
            );
        }

        // UDP is best-effort; a failed send is a lost packet.
        if let Err(e) = self.socket.send_to(buf, addr) {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::SyncProtocol,
                "Failed to send UDP packet to {}: {}",
                addr,
                e
            );
        }
    }
}

impl Transport<SocketAddr> for UdpTransport {
    fn send(&mut self, payload: &[u8], destination: &Destination<SocketAddr>) {
        match destination {
            Destination::Peer(addr) => self.send_datagram(payload, addr),
            Destination::Broadcast => {
                for addr in &self.peers {
                    self.send_datagram(payload, addr);
                }
            },
        }
    }

    fn receive_all(&mut self) -> Vec<TransportEvent<SocketAddr>> {
        let mut events = std::mem::take(&mut self.pending);
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((number_of_bytes, src_addr)) => {
                    if self.peers.insert(src_addr) {
                        events.push(TransportEvent::PeerDiscovered(src_addr));
                    }
                    if number_of_bytes == 0 {
                        continue;
                    }
                    match self.recv_buffer.get(..number_of_bytes) {
                        Some(payload) => events.push(TransportEvent::Received {
                            from: src_addr,
                            payload: payload.to_vec(),
                        }),
                        None => report_violation!(
                            ViolationSeverity::Error,
                            ViolationKind::SyncProtocol,
                            "recv_buffer slice [0..{}] out of bounds (buffer size: {})",
                            number_of_bytes,
                            RECV_BUFFER_SIZE
                        ),
                    }
                },
                // there are no more messages
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => return events,
                // datagram socket sometimes get this error as a result of calling the send_to method
                Err(ref err) if err.kind() == ErrorKind::ConnectionReset => continue,
                Err(err) => {
                    report_violation!(
                        ViolationSeverity::Error,
                        ViolationKind::SyncProtocol,
                        "Unexpected socket error: {:?}: {}",
                        err.kind(),
                        err
                    );
                    return events;
                },
            }
        }
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

    // UDP delivery timing varies across platforms.
    #[cfg(not(miri))]
    #[track_caller]
    fn wait_for_events(
        transport: &mut UdpTransport,
        expected: impl Fn(&[TransportEvent<SocketAddr>]) -> bool,
    ) -> Vec<TransportEvent<SocketAddr>> {
        let mut all = Vec::new();
        for _ in 0..40 {
            all.extend(transport.receive_all());
            if expected(&all) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(25));
        }
        all
    }

    // Sockets bind to 0.0.0.0, but on Windows you cannot send to 0.0.0.0.
    #[cfg(not(miri))]
    fn loopback(transport: &UdpTransport) -> SocketAddr {
        let local = transport.local_addr().unwrap();
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())
    }

    #[test]
    #[cfg(not(miri))] // Miri cannot execute foreign functions like socket()
    fn receive_is_non_blocking() {
        let mut transport = UdpTransport::bind_to_port(0).unwrap();
        assert!(transport.receive_all().is_empty());
    }

    #[test]
    #[cfg(not(miri))]
    fn connect_reports_discovery_locally() {
        let mut a = UdpTransport::bind_to_port(0).unwrap();
        let b = UdpTransport::bind_to_port(0).unwrap();
        let addr_b = loopback(&b);
        a.connect(addr_b);
        a.connect(addr_b);
        let events = a.receive_all();
        assert_eq!(events, vec![TransportEvent::PeerDiscovered(addr_b)]);
    }

    #[test]
    #[cfg(not(miri))]
    fn hello_introduces_sender_without_payload() {
        let mut a = UdpTransport::bind_to_port(0).unwrap();
        let mut b = UdpTransport::bind_to_port(0).unwrap();
        a.connect(loopback(&b));
        let events = wait_for_events(&mut b, |events| !events.is_empty());
        assert_eq!(events.len(), 1);
        let TransportEvent::PeerDiscovered(from) = events[0] else {
            panic!("expected discovery, got {:?}", events[0]);
        };
        assert_eq!(from.port(), loopback(&a).port());
    }

    #[test]
    #[cfg(not(miri))]
    fn payload_round_trip() {
        let mut a = UdpTransport::bind_to_port(0).unwrap();
        let mut b = UdpTransport::bind_to_port(0).unwrap();
        a.connect(loopback(&b));
        a.send(&[1, 2, 3], &Destination::Broadcast);
        let events = wait_for_events(&mut b, |events| {
            events
                .iter()
                .any(|e| matches!(e, TransportEvent::Received { .. }))
        });
        let payloads: Vec<&Vec<u8>> = events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Received { payload, .. } => Some(payload),
                _ => None,
            })
            .collect();
        assert_eq!(payloads, vec![&vec![1u8, 2, 3]]);
    }

    #[test]
    #[cfg(not(miri))]
    fn disconnect_is_reported_once() {
        let mut a = UdpTransport::bind_to_port(0).unwrap();
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9);
        a.connect(peer);
        let _ = a.receive_all();
        a.disconnect(&peer);
        a.disconnect(&peer);
        let events: Vec<_> = a
            .receive_all()
            .into_iter()
            .filter(|e| matches!(e, TransportEvent::PeerDisconnected(_)))
            .collect();
        assert_eq!(events, vec![TransportEvent::PeerDisconnected(peer)]);
        assert_eq!(a.peers().count(), 0);
    }
}
