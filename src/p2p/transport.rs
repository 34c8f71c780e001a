//! libp2p transport configuration and swarm task
//!
//! Builds the MeshSwarm with multi-transport support (QUIC + TCP/Noise/Yamux),
//! a Kademlia DHT acting as the peer directory, Identify for address
//! exchange, and raw point-to-point streams for proto98.
//!
//! The swarm runs as a single task; the rest of the process talks to it
//! through [`HostCommand`]s carried on an mpsc channel (see
//! [`super::host::HostClient`]).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{DialError, NetworkBehaviour, SwarmEvent};
use libp2p::{
    identity, kad, noise, tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm, SwarmBuilder,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::P2PConfig;
use crate::proto98::PROTO98_PROTOCOL;

use super::host::{HostClient, HostError};

/// Combined libp2p behaviour for mesh nodes.
#[derive(NetworkBehaviour)]
pub struct MeshBehaviour {
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: libp2p::identify::Behaviour,
    pub stream: libp2p_stream::Behaviour,
}

/// Requests from the mesh loops to the swarm task.
pub enum HostCommand {
    /// Is there a live connection to this peer right now?
    Connectedness {
        peer: PeerId,
        reply: oneshot::Sender<bool>,
    },
    /// Dial a peer at the given endpoints; resolves once the connection is
    /// established or the attempt fails.
    Dial {
        peer: PeerId,
        addrs: Vec<Multiaddr>,
        reply: oneshot::Sender<Result<(), HostError>>,
    },
    /// Resolve a peer to dialable endpoints via the DHT.
    FindPeer {
        peer: PeerId,
        reply: oneshot::Sender<Result<Vec<Multiaddr>, HostError>>,
    },
    /// Kick off a DHT routing table refresh.
    RefreshRoutingTable {
        reply: oneshot::Sender<Result<(), HostError>>,
    },
}

enum PendingQuery {
    FindPeer {
        peer: PeerId,
        reply: oneshot::Sender<Result<Vec<Multiaddr>, HostError>>,
    },
    Bootstrap {
        reply: oneshot::Sender<Result<(), HostError>>,
    },
}

/// Wrapper around the libp2p Swarm with mesh-specific helpers.
pub struct MeshSwarm {
    swarm: Swarm<MeshBehaviour>,
    local_peer_id: PeerId,
    control: libp2p_stream::Control,
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<Result<(), HostError>>>>,
    pending_queries: HashMap<kad::QueryId, PendingQuery>,
}

impl MeshSwarm {
    /// Get our local peer ID.
    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    /// Create a cloneable host handle sending commands into this swarm.
    pub fn client(&self, commands: mpsc::Sender<HostCommand>) -> HostClient {
        HostClient::new(commands, self.control.clone())
    }

    /// Register the proto98 protocol and return its inbound stream source.
    pub fn incoming_proto98(&mut self) -> Result<libp2p_stream::IncomingStreams> {
        self.control
            .accept(StreamProtocol::new(PROTO98_PROTOCOL))
            .map_err(|e| anyhow::anyhow!("proto98 protocol already registered: {e}"))
    }

    /// Run the swarm event loop until the shutdown token fires.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<HostCommand>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("swarm task stopped");
                    return;
                }
                Some(command) = commands.recv() => self.handle_command(command),
                event = self.swarm.select_next_some() => self.handle_event(event),
            }
        }
    }

    fn handle_command(&mut self, command: HostCommand) {
        match command {
            HostCommand::Connectedness { peer, reply } => {
                let _ = reply.send(self.swarm.is_connected(&peer));
            }

            HostCommand::Dial { peer, addrs, reply } => {
                if self.swarm.is_connected(&peer) {
                    let _ = reply.send(Ok(()));
                    return;
                }
                let opts = DialOpts::peer_id(peer).addresses(addrs).build();
                match self.swarm.dial(opts) {
                    // Resolved later by ConnectionEstablished/OutgoingConnectionError.
                    Ok(()) => self.pending_dials.entry(peer).or_default().push(reply),
                    Err(DialError::DialPeerConditionFalse(_)) => {
                        // A dial to this peer is already in flight; piggyback on it.
                        self.pending_dials.entry(peer).or_default().push(reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(HostError::DialFailed(e.to_string())));
                    }
                }
            }

            HostCommand::FindPeer { peer, reply } => {
                let id = self.swarm.behaviour_mut().kademlia.get_closest_peers(peer);
                self.pending_queries
                    .insert(id, PendingQuery::FindPeer { peer, reply });
            }

            HostCommand::RefreshRoutingTable { reply } => {
                match self.swarm.behaviour_mut().kademlia.bootstrap() {
                    Ok(id) => {
                        self.pending_queries
                            .insert(id, PendingQuery::Bootstrap { reply });
                    }
                    Err(e) => {
                        let _ = reply.send(Err(HostError::LookupFailed(e.to_string())));
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<MeshBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(MeshBehaviourEvent::Kademlia(
                kad::Event::OutboundQueryProgressed { id, result, step, .. },
            )) => {
                if step.last {
                    self.finish_query(id, result);
                }
            }

            // Feed identified listen addresses into the routing table so
            // lookups for directly-configured peers can resolve.
            SwarmEvent::Behaviour(MeshBehaviourEvent::Identify(
                libp2p::identify::Event::Received { peer_id, info },
            )) => {
                debug!(%peer_id, agent = %info.agent_version, "identified peer");
                for addr in info.listen_addrs {
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, addr);
                }
            }

            SwarmEvent::Behaviour(MeshBehaviourEvent::Kademlia(event)) => {
                debug!(?event, "kademlia event");
            }

            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening on");
            }

            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!(%peer_id, "connection established");
                for reply in self.pending_dials.remove(&peer_id).unwrap_or_default() {
                    let _ = reply.send(Ok(()));
                }
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                if let Some(peer_id) = peer_id {
                    debug!(%peer_id, %error, "outgoing connection failed");
                    for reply in self.pending_dials.remove(&peer_id).unwrap_or_default() {
                        let _ = reply.send(Err(HostError::DialFailed(error.to_string())));
                    }
                }
            }

            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                debug!(%peer_id, "connection closed");
            }

            _ => {}
        }
    }

    fn finish_query(&mut self, id: kad::QueryId, result: kad::QueryResult) {
        let Some(pending) = self.pending_queries.remove(&id) else {
            return;
        };

        match (pending, result) {
            (PendingQuery::FindPeer { peer, reply }, kad::QueryResult::GetClosestPeers(res)) => {
                if let Err(e) = res {
                    let _ = reply.send(Err(HostError::LookupFailed(e.to_string())));
                    return;
                }
                // The query walked the DHT; whatever it learned about the
                // peer is now in the routing table.
                let addrs = self.known_addresses(&peer);
                if addrs.is_empty() {
                    let _ = reply.send(Err(HostError::NoAddresses));
                } else {
                    let _ = reply.send(Ok(addrs));
                }
            }

            (PendingQuery::Bootstrap { reply }, kad::QueryResult::Bootstrap(res)) => {
                let _ = reply.send(
                    res.map(|_| ())
                        .map_err(|e| HostError::LookupFailed(e.to_string())),
                );
            }

            (PendingQuery::FindPeer { reply, .. }, _) => {
                let _ = reply.send(Err(HostError::LookupFailed(
                    "unexpected query result".to_string(),
                )));
            }
            (PendingQuery::Bootstrap { reply }, _) => {
                let _ = reply.send(Err(HostError::LookupFailed(
                    "unexpected query result".to_string(),
                )));
            }
        }
    }

    fn known_addresses(&mut self, peer: &PeerId) -> Vec<Multiaddr> {
        for bucket in self.swarm.behaviour_mut().kademlia.kbuckets() {
            for entry in bucket.iter() {
                if entry.node.key.preimage() == peer {
                    return entry.node.value.iter().cloned().collect();
                }
            }
        }
        Vec::new()
    }
}

/// Build the libp2p swarm from config.
///
/// Creates or loads an Ed25519 identity keypair, configures transports,
/// and constructs the composite behaviour.
pub fn build_swarm(config: &P2PConfig, data_dir: &Path) -> Result<MeshSwarm> {
    let keypair = load_or_generate_keypair(data_dir)?;
    let local_peer_id = PeerId::from(keypair.public());
    info!(%local_peer_id, "node identity");

    let mut swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )
        .context("TCP transport")?
        .with_quic()
        .with_behaviour(|key| {
            let store = kad::store::MemoryStore::new(key.public().to_peer_id());
            let mut kademlia = kad::Behaviour::new(key.public().to_peer_id(), store);
            kademlia.set_mode(Some(kad::Mode::Server));

            let identify = libp2p::identify::Behaviour::new(
                libp2p::identify::Config::new("/meshnode/id/0.0.1".to_string(), key.public())
                    .with_agent_version(format!("meshnode/{}", env!("CARGO_PKG_VERSION"))),
            );

            MeshBehaviour {
                kademlia,
                identify,
                stream: libp2p_stream::Behaviour::new(),
            }
        })
        .context("swarm behaviour")?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();

    for addr_str in &config.listen_addrs {
        let addr: Multiaddr = addr_str
            .parse()
            .with_context(|| format!("invalid listen address: {}", addr_str))?;
        swarm
            .listen_on(addr)
            .with_context(|| format!("failed to listen on {}", addr_str))?;
    }

    for node_str in &config.bootstrap_nodes {
        if let Some((peer_id, addr)) = parse_peer_addr(node_str) {
            swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
            info!(%peer_id, "added bootstrap node");
        } else {
            warn!(addr = %node_str, "invalid bootstrap node address, skipping");
        }
    }

    let control = swarm.behaviour_mut().stream.new_control();

    Ok(MeshSwarm {
        swarm,
        local_peer_id,
        control,
        pending_dials: HashMap::new(),
        pending_queries: HashMap::new(),
    })
}

/// Load an Ed25519 keypair from disk, or generate and persist a new one.
///
/// The keypair is stored as protobuf-encoded bytes at `{data_dir}/node_key`.
fn load_or_generate_keypair(data_dir: &Path) -> Result<identity::Keypair> {
    let key_path = data_dir.join("node_key");

    if key_path.exists() {
        let bytes = std::fs::read(&key_path).context("reading node key")?;
        let keypair =
            identity::Keypair::from_protobuf_encoding(&bytes).context("decoding node key")?;
        info!("loaded existing node identity");
        Ok(keypair)
    } else {
        let keypair = identity::Keypair::generate_ed25519();
        std::fs::create_dir_all(data_dir).context("creating data directory")?;
        let bytes = keypair
            .to_protobuf_encoding()
            .context("encoding node key")?;
        std::fs::write(&key_path, &bytes).context("writing node key")?;
        info!("generated new node identity");
        Ok(keypair)
    }
}

/// Parse a multiaddr string like `/ip4/1.2.3.4/tcp/4001/p2p/12D3Koo...`
/// into a (PeerId, Multiaddr) pair.
fn parse_peer_addr(addr_str: &str) -> Option<(PeerId, Multiaddr)> {
    let addr: Multiaddr = addr_str.parse().ok()?;
    let peer_id = addr.iter().find_map(|p| {
        if let libp2p::multiaddr::Protocol::P2p(peer_id) = p {
            Some(peer_id)
        } else {
            None
        }
    })?;
    // Kademlia wants the address without the /p2p/ suffix.
    let addr_without_p2p: Multiaddr = addr
        .iter()
        .filter(|p| !matches!(p, libp2p::multiaddr::Protocol::P2p(_)))
        .collect();
    Some((peer_id, addr_without_p2p))
}
