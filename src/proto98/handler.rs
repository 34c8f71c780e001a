//! proto98 ping/pong dispatch
//!
//! Inbound frames are parsed and dispatched by command byte: a PING is
//! answered with a PONG over a fresh outbound stream to the sender, a PONG
//! completes a round-trip probe and is only logged, unknown commands are
//! ignored for forward compatibility.
//!
//! The probe is fire-and-forget: the protocol carries no correlation id,
//! so a PONG can only be matched to its PING by the address fields.

use std::net::Ipv4Addr;

use futures::StreamExt;
use libp2p::PeerId;
use libp2p_stream::IncomingStreams;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::p2p::{MeshHost, PeerTable};

use super::framing::{read_framed, send_framed, FrameError};
use super::packet::{Command, PacketError, Proto98Packet};

/// Errors surfaced to callers of [`ping`] and [`handle_inbound`].
#[derive(Debug, thiserror::Error)]
pub enum PingError {
    /// The target overlay address has no peer table entry.
    #[error("{0} is not a known peer")]
    UnknownPeer(String),

    /// The interface address or probe target could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Host(#[from] crate::p2p::HostError),
}

/// Send a proto98 PING from the interface address to `target`.
///
/// The call succeeds once the packet is written; whether a PONG ever comes
/// back is observed separately by the inbound handler.
pub async fn ping<H: MeshHost>(
    host: &H,
    interface_cidr: &str,
    target: &str,
    peers: &PeerTable,
) -> Result<(), PingError> {
    let src = parse_interface_addr(interface_cidr)?;
    let dst: Ipv4Addr = target
        .parse()
        .map_err(|_| PingError::InvalidAddress(target.to_string()))?;

    let peer = peers
        .read()
        .await
        .get(target)
        .copied()
        .ok_or_else(|| PingError::UnknownPeer(target.to_string()))?;

    let packet = Proto98Packet::ping(src, dst);
    let mut stream = host.open_stream(peer).await?;
    send_framed(&mut stream, packet.as_bytes()).await?;

    info!(%peer, src = %src, dst = %dst, "proto98 ping sent");
    Ok(())
}

/// Dispatch one inbound proto98 frame from `sender`.
pub async fn handle_inbound<H: MeshHost>(
    host: &H,
    sender: PeerId,
    frame: &[u8],
) -> Result<(), PingError> {
    let packet = Proto98Packet::parse(frame)?;

    match Command::from_byte(packet.command()) {
        Some(Command::Ping) => {
            info!(peer = %sender, src = %packet.src(), dst = %packet.dst(), "ping received");
            // The pong echoes the ping's endpoints unchanged.
            let pong = Proto98Packet::pong(packet.src(), packet.dst());
            let mut stream = host.open_stream(sender).await?;
            send_framed(&mut stream, pong.as_bytes()).await?;
        }
        Some(Command::Pong) => {
            info!(peer = %sender, src = %packet.src(), dst = %packet.dst(), "pong received");
        }
        None => {
            debug!(peer = %sender, command = packet.command(), "unknown proto98 command, ignoring");
        }
    }
    Ok(())
}

/// Accept inbound proto98 streams until cancelled, spawning one short-lived
/// task per stream. Each stream carries framed packets until it closes.
pub async fn serve<H>(host: H, mut incoming: IncomingStreams, shutdown: CancellationToken)
where
    H: MeshHost + Clone + Send + Sync + 'static,
{
    loop {
        let (peer, mut stream) = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = incoming.next() => match next {
                Some(accepted) => accepted,
                None => break,
            },
        };

        let host = host.clone();
        tokio::spawn(async move {
            loop {
                match read_framed(&mut stream).await {
                    Ok(frame) => {
                        if let Err(e) = handle_inbound(&host, peer, &frame).await {
                            warn!(%peer, error = %e, "proto98 handler failed");
                            break;
                        }
                    }
                    Err(FrameError::Closed) => break,
                    Err(e) => {
                        // Framing violation: log and tear the stream down.
                        debug!(%peer, error = %e, "dropping proto98 stream");
                        break;
                    }
                }
            }
        });
    }
    debug!("proto98 accept loop stopped");
}

/// Parse an interface address in CIDR form (`10.0.1.1/24`) down to its
/// host address.
fn parse_interface_addr(cidr: &str) -> Result<Ipv4Addr, PingError> {
    let invalid = || PingError::InvalidAddress(cidr.to_string());

    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }
    addr.parse().map_err(|_| invalid())
}
