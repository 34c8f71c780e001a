//! Peer reconciliation and bootstrap probing
//!
//! Two long-lived loops share the peer table:
//! - The reconciler compares desired peers against live connections every
//!   tick, asks the directory for endpoints of unreachable peers, redials
//!   them, and persists the observed connection health.
//! - The bootstrap prober runs once per peer-table generation and
//!   aggressively retries stream establishment to every configured peer
//!   until each succeeds or is dropped from the retry set.
//!
//! Neither loop keeps retry state across attempts: the next tick's lookup
//! is the retry.

use std::time::Duration;

use futures::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::{ConnectionState, FileStateStore, StateStore};

use super::host::{Directory, MeshHost};
use super::{HostClient, PeerTable};

/// Interval between reconciliation ticks.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before the bootstrap prober revisits an undialable peer.
pub const PROBE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Attempts before the prober gives a peer up to the reconciler, which
/// keeps retrying it every tick anyway. Keeps the probe finite even for
/// peers that never become dialable.
pub const PROBE_MAX_ATTEMPTS: u32 = 12;

/// One reconciliation pass over the peer table.
///
/// For every peer: query connectedness; if disconnected, resolve the
/// identity through the directory and redial. Lookup and dial failures are
/// logged and skipped, never escalated. The post-attempt connectedness of
/// each peer is recorded and the full snapshot persisted keyed by the
/// interface identifier.
///
/// Cancellation is observed between peers and again before persisting: a
/// cancelled tick abandons the remaining peers and writes nothing.
pub async fn reconcile_tick<H, D, S>(
    host: &H,
    directory: &D,
    store: &S,
    peers: &PeerTable,
    interface: &str,
    shutdown: &CancellationToken,
) where
    H: MeshHost,
    D: Directory,
    S: StateStore,
{
    let table = peers.read().await.clone();
    let mut state = ConnectionState::with_capacity(table.len());

    for (ip, peer) in table {
        if shutdown.is_cancelled() {
            debug!(interface, "tick abandoned mid-pass");
            return;
        }
        let mut connected = host.connectedness(peer).await;

        if !connected {
            match directory.find_peer(peer).await {
                Err(e) => {
                    debug!(%peer, ip = %ip, error = %e, "couldn't find peer");
                }
                Ok(addrs) => match host.dial(peer, addrs).await {
                    Err(e) => {
                        debug!(%peer, ip = %ip, error = %e, "couldn't dial peer");
                    }
                    Ok(()) => {
                        connected = host.connectedness(peer).await;
                    }
                },
            }
        }

        if connected {
            debug!(ip = %ip, "connection is alive");
        }
        state.insert(ip, connected);
    }

    if shutdown.is_cancelled() {
        return;
    }
    if let Err(e) = store.save(interface, &state) {
        warn!(interface, error = %e, "failed to persist connection state");
    }
}

/// Run the reconciliation loop until cancelled.
///
/// Kicks off an asynchronous routing table refresh once at startup (its
/// outcome is logged and never blocks the ticks), then reconciles every
/// [`RECONCILE_INTERVAL`].
pub async fn run_reconciler<H, D, S>(
    host: H,
    directory: D,
    store: S,
    peers: PeerTable,
    interface: String,
    shutdown: CancellationToken,
) where
    H: MeshHost,
    D: Directory + Clone + Send + 'static,
    S: StateStore,
{
    debug!(interface, "starting reconciler");

    {
        let directory = directory.clone();
        tokio::spawn(async move {
            match directory.refresh_routing_table().await {
                Ok(()) => info!("routing table refreshed"),
                Err(e) => warn!(error = %e, "error refreshing routing table"),
            }
        });
    }

    let start = tokio::time::Instant::now() + RECONCILE_INTERVAL;
    let mut ticker = tokio::time::interval_at(start, RECONCILE_INTERVAL);

    loop {
        // Biased so an expired interval never races a cancelled token
        // into one more tick.
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(interface, "reconciler stopped");
                return;
            }
            _ = ticker.tick() => {
                reconcile_tick(&host, &directory, &store, &peers, &interface, &shutdown).await;
            }
        }
    }
}

/// Probe every configured peer until it either accepts a proto98 stream or
/// is dropped from the retry set.
///
/// Undialable peers ("could not dial" / "no known address") are retried
/// after [`PROBE_RETRY_DELAY`], up to [`PROBE_MAX_ATTEMPTS`] times; the
/// delay throttles only that entry, other peers proceed independently.
/// Any other failure removes the peer immediately — the reconciler will
/// pick it up on its next tick.
pub async fn bootstrap_probe<H>(host: H, peers: PeerTable, shutdown: CancellationToken)
where
    H: MeshHost + Clone,
{
    let pending: Vec<(String, libp2p::PeerId)> = peers
        .read()
        .await
        .iter()
        .map(|(ip, id)| (ip.clone(), *id))
        .collect();

    let probes = pending.into_iter().map(|(ip, peer)| {
        let host = host.clone();
        let shutdown = shutdown.clone();
        async move {
            for attempt in 1..=PROBE_MAX_ATTEMPTS {
                let result = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    result = host.open_stream(peer) => result,
                };

                match result {
                    Ok(mut stream) => {
                        info!(ip = %ip, "connection successful, network ready");
                        let _ = stream.close().await;
                        return;
                    }
                    Err(e) if e.is_retryable_dial() => {
                        if attempt == PROBE_MAX_ATTEMPTS {
                            debug!(ip = %ip, "giving up bootstrap probe, leaving peer to the reconciler");
                            return;
                        }
                        debug!(ip = %ip, attempt, error = %e, "peer not reachable yet");
                        tokio::select! {
                            _ = shutdown.cancelled() => return,
                            _ = tokio::time::sleep(PROBE_RETRY_DELAY) => {}
                        }
                    }
                    Err(e) => {
                        debug!(ip = %ip, error = %e, "dropping peer from bootstrap probe");
                        return;
                    }
                }
            }
        }
    });

    futures::future::join_all(probes).await;
    debug!("bootstrap probe finished");
}

/// Supervises one generation of reconciler + prober per peer table state.
///
/// The admin API calls [`MeshDriver::restart`] after every peer add/remove;
/// the previous generation is cancelled and a fresh pair of loops spawned
/// over the updated table.
pub struct MeshDriver {
    host: HostClient,
    store: FileStateStore,
    peers: PeerTable,
    interface: String,
    root: CancellationToken,
    current: Mutex<CancellationToken>,
}

impl MeshDriver {
    pub fn new(
        host: HostClient,
        store: FileStateStore,
        peers: PeerTable,
        interface: String,
        root: CancellationToken,
    ) -> Self {
        let current = Mutex::new(root.child_token());
        Self {
            host,
            store,
            peers,
            interface,
            root,
            current,
        }
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Cancel the running loops (if any) and start a new generation.
    pub async fn restart(&self) {
        let mut current = self.current.lock().await;
        current.cancel();
        *current = self.root.child_token();
        let token = current.clone();
        drop(current);

        tokio::spawn(run_reconciler(
            self.host.clone(),
            self.host.clone(),
            self.store.clone(),
            self.peers.clone(),
            self.interface.clone(),
            token.clone(),
        ));
        tokio::spawn(bootstrap_probe(
            self.host.clone(),
            self.peers.clone(),
            token,
        ));
    }
}
