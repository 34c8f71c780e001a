//! Host and directory seams over the swarm task
//!
//! The swarm is owned by a single task; everything else holds a
//! [`HostClient`], which forwards requests over an mpsc channel and waits
//! for the reply on a oneshot. Stream opening bypasses the channel and
//! goes straight through the libp2p-stream [`Control`], which is already
//! a cheap cloneable handle.
//!
//! [`Control`]: libp2p_stream::Control

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use libp2p_stream::OpenStreamError;
use tokio::sync::{mpsc, oneshot};

use crate::proto98::PROTO98_PROTOCOL;

use super::transport::HostCommand;

/// Failures crossing the host/directory seams.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// The peer resolved but no endpoint for it is known.
    #[error("no known addresses for peer")]
    NoAddresses,

    /// The dial attempt itself failed.
    #[error("dial failed: {0}")]
    DialFailed(String),

    /// A DHT query failed or returned nonsense.
    #[error("lookup failed: {0}")]
    LookupFailed(String),

    /// The remote does not speak proto98.
    #[error("peer does not support the protocol")]
    UnsupportedProtocol,

    /// The stream broke after establishment.
    #[error("stream error: {0}")]
    Stream(String),

    /// The swarm task is gone.
    #[error("host channel closed")]
    ChannelClosed,
}

impl HostError {
    /// Whether retrying the same dial later could plausibly succeed.
    pub fn is_retryable_dial(&self) -> bool {
        matches!(self, HostError::DialFailed(_) | HostError::NoAddresses)
    }
}

/// Connectivity surface of the swarm: liveness checks, dialing, and
/// opening proto98 streams.
#[async_trait]
pub trait MeshHost: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Is there a live connection to this peer right now?
    async fn connectedness(&self, peer: PeerId) -> bool;

    /// Dial the peer at the given endpoints, resolving once the connection
    /// is established or the attempt fails.
    async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), HostError>;

    /// Open a fresh proto98 stream to the peer, dialing it if necessary.
    async fn open_stream(&self, peer: PeerId) -> Result<Self::Stream, HostError>;
}

/// Peer resolution surface of the DHT.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a peer identity to dialable endpoints.
    async fn find_peer(&self, peer: PeerId) -> Result<Vec<Multiaddr>, HostError>;

    /// Walk the DHT to repopulate the routing table.
    async fn refresh_routing_table(&self) -> Result<(), HostError>;
}

/// Channel-backed handle to the swarm task.
#[derive(Clone)]
pub struct HostClient {
    commands: mpsc::Sender<HostCommand>,
    control: libp2p_stream::Control,
}

impl HostClient {
    pub fn new(commands: mpsc::Sender<HostCommand>, control: libp2p_stream::Control) -> Self {
        Self { commands, control }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> HostCommand + Send,
    ) -> Result<T, HostError>
    where
        T: Send,
    {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| HostError::ChannelClosed)?;
        rx.await.map_err(|_| HostError::ChannelClosed)
    }
}

#[async_trait]
impl MeshHost for HostClient {
    type Stream = libp2p::Stream;

    async fn connectedness(&self, peer: PeerId) -> bool {
        self.request(|reply| HostCommand::Connectedness { peer, reply })
            .await
            .unwrap_or(false)
    }

    async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), HostError> {
        self.request(|reply| HostCommand::Dial { peer, addrs, reply })
            .await?
    }

    async fn open_stream(&self, peer: PeerId) -> Result<libp2p::Stream, HostError> {
        let mut control = self.control.clone();
        control
            .open_stream(peer, StreamProtocol::new(PROTO98_PROTOCOL))
            .await
            .map_err(|e| match e {
                OpenStreamError::UnsupportedProtocol(_) => HostError::UnsupportedProtocol,
                OpenStreamError::Io(io) => HostError::DialFailed(io.to_string()),
                e => HostError::Stream(e.to_string()),
            })
    }
}

#[async_trait]
impl Directory for HostClient {
    async fn find_peer(&self, peer: PeerId) -> Result<Vec<Multiaddr>, HostError> {
        self.request(|reply| HostCommand::FindPeer { peer, reply })
            .await?
    }

    async fn refresh_routing_table(&self) -> Result<(), HostError> {
        self.request(|reply| HostCommand::RefreshRoutingTable { reply })
            .await?
    }
}
