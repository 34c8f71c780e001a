//! Admin API route handlers

use std::collections::HashMap;
use std::net::Ipv4Addr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PeerConfig;
use crate::proto98::{self, PingError};

use super::SharedState;

/// Generic status payload, the same shape for success and failure.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    fn ok() -> Json<StatusResponse> {
        Json(StatusResponse {
            status: "ok",
            message: None,
        })
    }

    fn error(message: impl Into<String>) -> Json<StatusResponse> {
        Json(StatusResponse {
            status: "error",
            message: Some(message.into()),
        })
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// GET /api/config
pub async fn get_config(State(state): State<SharedState>) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(config.clone())
}

/// GET /api/peers
pub async fn list_peers(State(state): State<SharedState>) -> Json<HashMap<String, String>> {
    let peers = state.peers.read().await;
    Json(
        peers
            .iter()
            .map(|(ip, id)| (ip.clone(), id.to_string()))
            .collect(),
    )
}

#[derive(Deserialize)]
pub struct AddPeerRequest {
    pub id: String,
}

/// POST /api/peers/:ip
///
/// Adds (or replaces) a peer and restarts the mesh loops over the updated
/// table.
pub async fn add_peer(
    State(state): State<SharedState>,
    Path(ip): Path<String>,
    Json(request): Json<AddPeerRequest>,
) -> impl IntoResponse {
    if ip.parse::<Ipv4Addr>().is_err() {
        return (
            StatusCode::BAD_REQUEST,
            StatusResponse::error(format!("{} is not an IPv4 address", ip)),
        );
    }
    let id: PeerId = match request.id.parse() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                StatusResponse::error(format!("invalid peer id: {}", request.id)),
            );
        }
    };

    state.peers.write().await.insert(ip.clone(), id);
    {
        let mut config = state.config.write().await;
        config.peers.insert(ip.clone(), PeerConfig { id: request.id });
        if let Err(e) = config.save(&state.config_path) {
            warn!(error = %e, "failed to persist config");
        }
    }

    info!(ip = %ip, %id, "peer added");
    state.mesh.restart().await;
    (StatusCode::OK, StatusResponse::ok())
}

/// DELETE /api/peers/:ip
pub async fn remove_peer(
    State(state): State<SharedState>,
    Path(ip): Path<String>,
) -> impl IntoResponse {
    let removed = state.peers.write().await.remove(&ip).is_some();
    {
        let mut config = state.config.write().await;
        config.peers.remove(&ip);
        if let Err(e) = config.save(&state.config_path) {
            warn!(error = %e, "failed to persist config");
        }
    }

    if removed {
        info!(ip = %ip, "peer removed");
        state.mesh.restart().await;
    }
    StatusResponse::ok()
}

/// POST /api/ping/:ip — send a proto98 ping to an overlay address.
pub async fn ping_peer(
    State(state): State<SharedState>,
    Path(ip): Path<String>,
) -> impl IntoResponse {
    let interface_addr = state.config.read().await.interface.address.clone();

    match proto98::ping(&state.host, &interface_addr, &ip, &state.peers).await {
        Ok(()) => {
            info!(ip = %ip, "ping sent");
            (StatusCode::OK, StatusResponse::ok())
        }
        Err(e) => {
            let status = match &e {
                PingError::UnknownPeer(_) => StatusCode::NOT_FOUND,
                PingError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, StatusResponse::error(e.to_string()))
        }
    }
}
