//! P2P networking layer
//!
//! Handles:
//! - Multi-transport libp2p swarm (QUIC + TCP with Noise/Yamux)
//! - Kademlia DHT as the peer directory
//! - Raw proto98 streams via libp2p-stream
//! - Peer reconciliation and bootstrap probing

pub mod discovery;
pub mod host;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use libp2p::PeerId;
use tokio::sync::RwLock;

pub use discovery::{bootstrap_probe, reconcile_tick, run_reconciler, MeshDriver};
pub use host::{Directory, HostClient, HostError, MeshHost};
pub use transport::{build_swarm, HostCommand, MeshSwarm};

/// Desired peers: overlay address (IPv4 literal) to peer identity.
///
/// Read by the reconciler and prober, mutated by the admin API. One lock
/// guards the whole table; peer changes are rare administrative events.
pub type PeerTable = Arc<RwLock<HashMap<String, PeerId>>>;
