//! Switcher control protocol codec
//!
//! Every UDP datagram starts with a 12-byte header:
//! ```text
//! ┌────────────────┬────────────┬────────────┬──────────┬────────────┐
//! │ flags | length │ session id │  ack id    │ reserved │ packet id  │
//! │ 5 bits 11 bits │  (2 bytes) │  (2 bytes) │ (4 bytes)│ (2 bytes)  │
//! └────────────────┴────────────┴────────────┴──────────┴────────────┘
//! ```
//! Reliable packets carry a sequence of commands, each framed as
//! `[u16 length][2 bytes][4-byte name][data]` with the length covering the
//! whole command.

use bytes::{BufMut, Bytes, BytesMut};
use onair::StreamState;

pub const HEADER_LEN: usize = 12;

/// Command frame overhead before the data.
const COMMAND_HEADER_LEN: usize = 8;

/// Session id the client uses until the switcher assigns one.
pub const HELLO_SESSION_ID: u16 = 0x53ab;

/// Hello reply code for an accepted connection.
const HELLO_ACCEPTED: u8 = 0x02;

/// Stream status command name.
pub const STREAM_STATUS: [u8; 4] = *b"StRS";

/// Packet flags, the top five bits of the first header byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags(pub u8);

impl PacketFlags {
    /// Sender wants this packet acknowledged
    pub const RELIABLE: u8 = 0x08;
    /// Session handshake
    pub const HELLO: u8 = 0x10;
    /// Retransmission of an earlier packet
    pub const RESEND: u8 = 0x20;
    /// Sender asks for a retransmission
    pub const REQUEST_RESEND: u8 = 0x40;
    /// Acknowledgement of `ack_id`
    pub const ACK: u8 = 0x80;

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub flags: PacketFlags,
    /// Datagram length including the header
    pub length: u16,
    pub session_id: u16,
    pub ack_id: u16,
    pub packet_id: u16,
}

impl Header {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let word = u16::from_be_bytes([buf[0], buf[1]]);
        Some(Self {
            flags: PacketFlags(buf[0] & 0xf8),
            length: word & 0x07ff,
            session_id: u16::from_be_bytes([buf[2], buf[3]]),
            ack_id: u16::from_be_bytes([buf[4], buf[5]]),
            packet_id: u16::from_be_bytes([buf[10], buf[11]]),
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(((self.flags.0 as u16) << 8) | (self.length & 0x07ff));
        buf.put_u16(self.session_id);
        buf.put_u16(self.ack_id);
        buf.put_u32(0);
        buf.put_u16(self.packet_id);
    }
}

/// Opening handshake packet.
pub fn hello() -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 8);
    Header {
        flags: PacketFlags(PacketFlags::HELLO),
        length: (HEADER_LEN + 8) as u16,
        session_id: HELLO_SESSION_ID,
        ..Default::default()
    }
    .encode(&mut buf);
    // Byte 9 of the hello header is fixed by the switcher
    buf[9] = 0x3a;
    buf.put_u8(0x01);
    buf.put_bytes(0, 7);
    buf.freeze()
}

/// Acknowledge `packet_id` on `session_id`.
pub fn ack(session_id: u16, packet_id: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    Header {
        flags: PacketFlags(PacketFlags::ACK),
        length: HEADER_LEN as u16,
        session_id,
        ack_id: packet_id,
        packet_id: 0,
    }
    .encode(&mut buf);
    buf.freeze()
}

/// True when `datagram` is a hello reply accepting the connection.
pub fn hello_accepted(header: &Header, datagram: &[u8]) -> bool {
    header.flags.contains(PacketFlags::HELLO)
        && datagram.get(HEADER_LEN).copied() == Some(HELLO_ACCEPTED)
}

/// One command inside a packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: [u8; 4],
    pub data: &'a [u8],
}

/// Iterate the commands of a packet payload. Stops at the first malformed
/// frame.
pub fn commands(payload: &[u8]) -> Commands<'_> {
    Commands { rest: payload }
}

pub struct Commands<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Commands<'a> {
    type Item = Command<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < COMMAND_HEADER_LEN {
            return None;
        }
        let len = u16::from_be_bytes([self.rest[0], self.rest[1]]) as usize;
        if len < COMMAND_HEADER_LEN || len > self.rest.len() {
            self.rest = &[];
            return None;
        }

        let mut name = [0u8; 4];
        name.copy_from_slice(&self.rest[4..8]);
        let data = &self.rest[COMMAND_HEADER_LEN..len];
        self.rest = &self.rest[len..];
        Some(Command { name, data })
    }
}

/// Decode the stream status word of a `StRS` command.
pub fn stream_state(data: &[u8]) -> Option<StreamState> {
    let word = u16::from_be_bytes([*data.first()?, *data.get(1)?]);
    Some(if word & 32 != 0 {
        StreamState::Stopping
    } else if word & 4 != 0 {
        StreamState::Streaming
    } else if word & 2 != 0 {
        StreamState::Connecting
    } else {
        StreamState::Idle
    })
}

#[cfg(test)]
pub(crate) fn command_frame(name: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let len = (COMMAND_HEADER_LEN + data.len()) as u16;
    let mut frame = Vec::with_capacity(len as usize);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(name);
    frame.extend_from_slice(data);
    frame
}
