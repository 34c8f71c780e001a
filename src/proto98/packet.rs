//! proto98 packet codec
//!
//! The packet mimics an IPv4 header: version/IHL marker at byte 0, the
//! proto98 protocol number at byte 9, source and destination addresses at
//! the usual header offsets, and a command byte at the tail. Everything
//! else is zero-filled.

use std::fmt;
use std::net::Ipv4Addr;

/// Fixed packet length in bytes.
pub const PACKET_LEN: usize = 22;

/// Byte 0: IPv4 version (4) + header length (5 words).
const VERSION_IHL: u8 = 0x45;

/// Byte 9: protocol number identifying proto98 within the carrier.
const PROTOCOL_NUMBER: u8 = 0x98;

const PROTOCOL_OFFSET: usize = 9;
const SRC_OFFSET: usize = 12;
const DST_OFFSET: usize = 16;
const COMMAND_OFFSET: usize = 21;

/// proto98 command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Ping = 0x01,
    Pong = 0x02,
}

impl Command {
    /// Decode a command byte. Unknown bytes are not an error at this
    /// layer; the handler ignores them for forward compatibility.
    pub fn from_byte(byte: u8) -> Option<Command> {
        match byte {
            0x01 => Some(Command::Ping),
            0x02 => Some(Command::Pong),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Packet codec errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PacketError {
    /// Input is too short to contain a proto98 header.
    #[error("malformed packet: {len} bytes, need {PACKET_LEN}")]
    Malformed { len: usize },
}

/// A proto98 packet, always exactly [`PACKET_LEN`] bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Proto98Packet([u8; PACKET_LEN]);

impl Proto98Packet {
    /// Build a packet for `command` between the two overlay addresses.
    pub fn new(command: Command, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        let mut bytes = [0u8; PACKET_LEN];
        bytes[0] = VERSION_IHL;
        bytes[PROTOCOL_OFFSET] = PROTOCOL_NUMBER;
        bytes[SRC_OFFSET..SRC_OFFSET + 4].copy_from_slice(&src.octets());
        bytes[DST_OFFSET..DST_OFFSET + 4].copy_from_slice(&dst.octets());
        bytes[COMMAND_OFFSET] = command.as_byte();
        Self(bytes)
    }

    pub fn ping(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self::new(Command::Ping, src, dst)
    }

    pub fn pong(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self::new(Command::Pong, src, dst)
    }

    /// Parse a packet from raw bytes. The format carries no internal
    /// length field, so the length check here is the only validation;
    /// trailing bytes beyond the header are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < PACKET_LEN {
            return Err(PacketError::Malformed { len: bytes.len() });
        }
        let mut packet = [0u8; PACKET_LEN];
        packet.copy_from_slice(&bytes[..PACKET_LEN]);
        Ok(Self(packet))
    }

    /// Raw command byte (may be an unknown code on inbound packets).
    pub fn command(&self) -> u8 {
        self.0[COMMAND_OFFSET]
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.field4(SRC_OFFSET))
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.field4(DST_OFFSET))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn field4(&self, at: usize) -> [u8; 4] {
        [self.0[at], self.0[at + 1], self.0[at + 2], self.0[at + 3]]
    }
}

impl fmt::Debug for Proto98Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proto98Packet")
            .field("command", &self.command())
            .field("src", &self.src())
            .field("dst", &self.dst())
            .finish()
    }
}
