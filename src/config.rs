//! Node configuration

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use libp2p::PeerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    pub interface: InterfaceConfig,
    /// Overlay address → peer, e.g. `[peers."10.0.1.2"] id = "12D3Koo..."`.
    #[serde(default)]
    pub peers: HashMap<String, PeerConfig>,
    #[serde(default)]
    pub p2p: P2PConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory (node key, connection state snapshots)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Overlay interface identifier, keys the persisted connection state
    pub name: String,

    /// Interface address in CIDR form, e.g. "10.0.1.1/24"
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer identity (base58 peer id)
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2PConfig {
    /// Listen addresses
    #[serde(default = "default_listen_addrs")]
    pub listen_addrs: Vec<String>,

    /// Bootstrap nodes for the DHT, `/ip4/.../tcp/.../p2p/...` form
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Admin HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

// Defaults
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/meshnode")
}
fn default_listen_addrs() -> Vec<String> {
    vec![
        "/ip4/0.0.0.0/tcp/4001".to_string(),
        "/ip4/0.0.0.0/udp/4001/quic-v1".to_string(),
    ]
}
fn default_http_port() -> u16 {
    8080
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for P2PConfig {
    fn default() -> Self {
        Self {
            listen_addrs: default_listen_addrs(),
            bootstrap_nodes: vec![],
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            interface: InterfaceConfig {
                name: "mesh0".to_string(),
                address: "10.0.1.1/24".to_string(),
            },
            peers: HashMap::new(),
            p2p: P2PConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("encoding config")?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Validate and decode the configured peers into a peer table.
    pub fn peer_table(&self) -> Result<HashMap<String, PeerId>> {
        let mut table = HashMap::with_capacity(self.peers.len());
        for (ip, peer) in &self.peers {
            ip.parse::<Ipv4Addr>()
                .with_context(|| format!("peer key {} is not an IPv4 address", ip))?;
            let id: PeerId = peer
                .id
                .parse()
                .with_context(|| format!("peer {} has an invalid id: {}", ip, peer.id))?;
            table.insert(ip.clone(), id);
        }
        Ok(table)
    }
}
