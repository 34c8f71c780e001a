//! meshnode: overlay mesh connectivity daemon
//!
//! Keeps a table of overlay peers connected over libp2p and exchanges the
//! proto98 reachability probe between them:
//! - Periodic reconciliation of desired vs. actual peer connectivity
//! - Aggressive bootstrap probing when the peer table changes
//! - proto98 ping/pong over length-framed point-to-point streams
//! - HTTP admin API for peer management and probe triggering
//!
//! The binary in `src/main.rs` wires these together; everything here is
//! usable as a library (and is exercised that way by the integration tests).

pub mod api;
pub mod config;
pub mod p2p;
pub mod proto98;
pub mod state;
