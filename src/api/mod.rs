//! Admin HTTP API
//!
//! Exposes the config document, peer add/remove, and a "probe this
//! address" action that sends a proto98 ping. Peer changes restart the
//! reconciliation and bootstrap loops for the updated table.

pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::p2p::{HostClient, MeshDriver, PeerTable};

/// State shared across admin handlers.
pub struct ApiState {
    pub config: RwLock<Config>,
    pub config_path: PathBuf,
    pub peers: PeerTable,
    pub host: HostClient,
    pub mesh: MeshDriver,
}

pub type SharedState = Arc<ApiState>;

/// Create the admin router.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/config", get(routes::get_config))
        .route("/api/peers", get(routes::list_peers))
        .route(
            "/api/peers/:ip",
            post(routes::add_peer).delete(routes::remove_peer),
        )
        .route("/api/ping/:ip", post(routes::ping_peer))
        .with_state(state)
}
