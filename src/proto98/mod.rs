//! proto98 - minimal network-layer reachability protocol
//!
//! A hand-rolled, IP-header-like 22-byte packet format carried over
//! length-framed point-to-point streams. Used to run a ping/pong probe
//! between overlay members.

pub mod framing;
pub mod handler;
pub mod packet;

/// Stream protocol identifier for proto98 frames.
pub const PROTO98_PROTOCOL: &str = "/meshnode/proto98/0.0.1";

pub use framing::{read_framed, send_framed, FrameError};
pub use handler::{handle_inbound, ping, serve, PingError};
pub use packet::{Command, PacketError, Proto98Packet, PACKET_LEN};
