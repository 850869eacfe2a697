//! UDP switcher client
//!
//! Non-blocking session over a std UDP socket, driven from the control loop:
//! - `connect` sends the hello and starts the handshake
//! - `poll` drains the socket, acknowledges reliable packets and tracks the
//!   stream status command
//! - the hello is resent every second until accepted, and the whole
//!   handshake restarts when the switcher goes quiet for five seconds

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use onair::hal::SwitcherClient;
use onair::StreamState;
use tracing::{debug, info, warn};

use crate::protocol::{self, Header, PacketFlags, HEADER_LEN, STREAM_STATUS};

const HANDSHAKE_RETRY: Duration = Duration::from_secs(1);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DATAGRAM: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Handshake { sent: Instant },
    Established,
}

pub struct UdpSwitcher {
    port: u16,
    socket: Option<UdpSocket>,
    remote: Option<SocketAddr>,
    phase: Phase,
    last_rx: Instant,
    stream: StreamState,
    buf: Vec<u8>,
}

impl UdpSwitcher {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            socket: None,
            remote: None,
            phase: Phase::Idle,
            last_rx: Instant::now(),
            stream: StreamState::Idle,
            buf: vec![0u8; MAX_DATAGRAM],
        }
    }

    fn open(address: IpAddr) -> io::Result<UdpSocket> {
        let local = match address {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    fn send(&self, packet: &[u8]) {
        let (Some(socket), Some(remote)) = (&self.socket, self.remote) else {
            return;
        };
        if let Err(e) = socket.send_to(packet, remote) {
            debug!("Failed to send to switcher {}: {}", remote, e);
        }
    }

    fn send_hello(&mut self, now: Instant) {
        self.send(&protocol::hello());
        self.phase = Phase::Handshake { sent: now };
    }

    fn handle_datagram(&mut self, len: usize, now: Instant) {
        let datagram = self.buf[..len].to_vec();
        let Some(header) = Header::decode(&datagram) else {
            debug!("Ignoring short datagram ({} bytes)", len);
            return;
        };
        self.last_rx = now;

        if header.flags.contains(PacketFlags::HELLO) {
            if protocol::hello_accepted(&header, &datagram) {
                // Acknowledge the reply, the switcher then sends its state
                self.send(&protocol::ack(header.session_id, 0));
                if self.phase != Phase::Established {
                    info!("Switcher accepted session");
                }
                self.phase = Phase::Established;
            } else {
                warn!("Switcher refused session, retrying");
            }
            return;
        }

        if header.flags.contains(PacketFlags::RELIABLE) {
            self.send(&protocol::ack(header.session_id, header.packet_id));
        }

        let end = (header.length as usize).clamp(HEADER_LEN, datagram.len());
        for command in protocol::commands(&datagram[HEADER_LEN..end]) {
            if command.name != STREAM_STATUS {
                continue;
            }
            if let Some(stream) = protocol::stream_state(command.data) {
                if stream != self.stream {
                    info!("Switcher stream status: {:?}", stream);
                }
                self.stream = stream;
            }
        }
    }

    fn drain(&mut self, now: Instant) {
        loop {
            let Some(socket) = &self.socket else {
                return;
            };
            match socket.recv_from(&mut self.buf) {
                Ok((len, from)) => {
                    if Some(from) != self.remote {
                        debug!("Ignoring datagram from {}", from);
                        continue;
                    }
                    self.handle_datagram(len, now);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!("Switcher socket receive error: {}", e);
                    return;
                }
            }
        }
    }
}

impl SwitcherClient for UdpSwitcher {
    fn bind(&mut self, address: IpAddr) {
        self.remote = Some(SocketAddr::new(address, self.port));
        self.phase = Phase::Idle;
        self.stream = StreamState::Idle;
        match Self::open(address) {
            Ok(socket) => self.socket = Some(socket),
            Err(e) => {
                warn!("Failed to open switcher socket: {}", e);
                self.socket = None;
            }
        }
    }

    fn connect(&mut self) {
        if let Some(remote) = self.remote {
            info!("Connecting to switcher at {}", remote);
        }
        let now = Instant::now();
        self.last_rx = now;
        self.send_hello(now);
    }

    fn poll(&mut self) {
        let now = Instant::now();
        self.drain(now);

        match self.phase {
            Phase::Idle => {}
            Phase::Handshake { sent } => {
                if now.duration_since(sent) >= HANDSHAKE_RETRY {
                    debug!("Resending hello");
                    self.send_hello(now);
                }
            }
            Phase::Established => {
                if now.duration_since(self.last_rx) >= KEEPALIVE_TIMEOUT {
                    warn!("Switcher silent for {:?}, reconnecting", KEEPALIVE_TIMEOUT);
                    self.stream = StreamState::Idle;
                    self.last_rx = now;
                    self.send_hello(now);
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.phase == Phase::Established
    }

    fn stream_state(&self) -> StreamState {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command_frame;

    fn fake_switcher() -> (UdpSocket, UdpSwitcher) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, UdpSwitcher::new(port))
    }

    fn poll_until(client: &mut UdpSwitcher, done: impl Fn(&UdpSwitcher) -> bool) {
        for _ in 0..200 {
            client.poll();
            if done(client) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    fn handshake(server: &UdpSocket, client: &mut UdpSwitcher) -> SocketAddr {
        client.bind(IpAddr::V4(Ipv4Addr::LOCALHOST));
        client.connect();

        let mut buf = [0u8; 64];
        let (len, peer) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &protocol::hello()[..]);

        let mut reply = vec![0x10, 0x14, 0x53, 0xab, 0, 0, 0, 0, 0, 0, 0, 0];
        reply.extend_from_slice(&[0x02, 0, 0, 0, 0, 0, 0, 0]);
        server.send_to(&reply, peer).unwrap();

        poll_until(client, |c| c.is_connected());
        let (len, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &protocol::ack(0x53ab, 0)[..]);
        peer
    }

    #[test]
    fn test_handshake_connects() {
        let (server, mut client) = fake_switcher();
        assert!(!client.is_connected());
        handshake(&server, &mut client);
        assert!(client.is_connected());
        assert_eq!(client.stream_state(), StreamState::Idle);
    }

    #[test]
    fn test_stream_status_acked_and_tracked() {
        let (server, mut client) = fake_switcher();
        let peer = handshake(&server, &mut client);

        let payload = command_frame(&STREAM_STATUS, &[0, 4, 0, 0]);
        let mut packet = bytes::BytesMut::new();
        Header {
            flags: PacketFlags(PacketFlags::RELIABLE),
            length: (HEADER_LEN + payload.len()) as u16,
            session_id: 0x8001,
            ack_id: 0,
            packet_id: 3,
        }
        .encode(&mut packet);
        packet.extend_from_slice(&payload);
        server.send_to(&packet, peer).unwrap();

        poll_until(&mut client, |c| c.stream_state() == StreamState::Streaming);

        let mut buf = [0u8; 64];
        let (len, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &protocol::ack(0x8001, 3)[..]);
    }

    #[test]
    fn test_unbound_poll_is_harmless() {
        let mut client = UdpSwitcher::new(9910);
        client.poll();
        client.connect();
        assert!(!client.is_connected());
    }
}
