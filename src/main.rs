//! meshnode: overlay mesh connectivity daemon
//!
//! Keeps the configured overlay peers connected over libp2p and answers
//! proto98 reachability probes. See lib.rs for the module layout.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use meshnode::api::{self, ApiState};
use meshnode::config::Config;
use meshnode::p2p::{self, MeshDriver, PeerTable};
use meshnode::proto98;
use meshnode::state::FileStateStore;

#[derive(Parser)]
#[command(name = "meshnode")]
#[command(about = "Overlay mesh connectivity daemon with a proto98 reachability probe")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "meshnode.toml")]
    config: String,

    /// Data directory (overrides config file)
    #[arg(short, long, env = "MESHNODE_DATA_DIR")]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meshnode=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("starting meshnode");
    info!("config file: {}", cli.config);

    let config_path = PathBuf::from(&cli.config);
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        warn!("config file not found, using defaults");
        Config::default()
    };

    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = PathBuf::from(data_dir);
    }

    info!("interface: {} ({})", config.interface.name, config.interface.address);
    info!("data dir: {}", config.node.data_dir.display());
    info!("configured peers: {}", config.peers.len());

    let data_dir = config.node.data_dir.clone();
    let mut swarm = p2p::build_swarm(&config.p2p, &data_dir).context("building swarm")?;
    let incoming = swarm.incoming_proto98()?;

    let shutdown = tokio_util::sync::CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let host = swarm.client(cmd_tx);
    tokio::spawn(swarm.run(cmd_rx, shutdown.clone()));
    tokio::spawn(proto98::serve(host.clone(), incoming, shutdown.clone()));

    let peers: PeerTable = Arc::new(RwLock::new(config.peer_table()?));
    let store = FileStateStore::new(data_dir.join("state"));
    let mesh = MeshDriver::new(
        host.clone(),
        store,
        peers.clone(),
        config.interface.name.clone(),
        shutdown.clone(),
    );

    let http_port = config.api.http_port;
    let state = Arc::new(ApiState {
        config: RwLock::new(config),
        config_path,
        peers,
        host,
        mesh,
    });

    // First generation of reconciler + bootstrap prober.
    state.mesh.restart().await;

    let app = api::create_router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], http_port));
    info!("admin api listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
