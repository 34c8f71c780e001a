//! Mock collaborators for driving the mesh loops and proto98 handler
//! without a real swarm.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use libp2p::{Multiaddr, PeerId};

use meshnode::p2p::{Directory, HostError, MeshHost};
use meshnode::state::{ConnectionState, StateStore};

/// In-memory stream: writes accumulate in a shared buffer, reads yield EOF.
pub struct SinkStream {
    data: Arc<Mutex<Vec<u8>>>,
}

impl SinkStream {
    pub fn new(data: Arc<Mutex<Vec<u8>>>) -> Self {
        Self { data }
    }
}

impl AsyncWrite for SinkStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for SinkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(0))
    }
}

/// Scriptable transport mock recording every dial and opened stream.
#[derive(Clone, Default)]
pub struct MockHost {
    /// Peers considered connected.
    pub connected: Arc<Mutex<HashSet<PeerId>>>,
    /// Peers whose dial succeeds (and marks them connected).
    pub dialable: Arc<Mutex<HashSet<PeerId>>>,
    /// Recorded dial attempts with the endpoints passed in.
    pub dials: Arc<Mutex<Vec<(PeerId, Vec<Multiaddr>)>>>,
    /// Per-peer error returned by open_stream.
    pub open_errors: Arc<Mutex<HashMap<PeerId, HostError>>>,
    /// open_stream attempts per peer.
    pub open_attempts: Arc<Mutex<HashMap<PeerId, u32>>>,
    /// Successfully opened streams and everything written to them.
    pub opened: Arc<Mutex<Vec<(PeerId, Arc<Mutex<Vec<u8>>>)>>>,
}

impl MockHost {
    pub fn mark_connected(&self, peer: PeerId) {
        self.connected.lock().unwrap().insert(peer);
    }

    pub fn mark_dialable(&self, peer: PeerId) {
        self.dialable.lock().unwrap().insert(peer);
    }

    pub fn fail_open_with(&self, peer: PeerId, error: HostError) {
        self.open_errors.lock().unwrap().insert(peer, error);
    }

    pub fn dial_count(&self) -> usize {
        self.dials.lock().unwrap().len()
    }

    pub fn attempts_for(&self, peer: PeerId) -> u32 {
        self.open_attempts
            .lock()
            .unwrap()
            .get(&peer)
            .copied()
            .unwrap_or(0)
    }

    /// Bytes written to the n-th opened stream.
    pub fn written_to(&self, n: usize) -> Vec<u8> {
        self.opened.lock().unwrap()[n].1.lock().unwrap().clone()
    }
}

#[async_trait]
impl MeshHost for MockHost {
    type Stream = SinkStream;

    async fn connectedness(&self, peer: PeerId) -> bool {
        self.connected.lock().unwrap().contains(&peer)
    }

    async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> Result<(), HostError> {
        self.dials.lock().unwrap().push((peer, addrs));
        if self.dialable.lock().unwrap().contains(&peer) {
            self.connected.lock().unwrap().insert(peer);
            Ok(())
        } else {
            Err(HostError::DialFailed("connection refused".to_string()))
        }
    }

    async fn open_stream(&self, peer: PeerId) -> Result<SinkStream, HostError> {
        *self.open_attempts.lock().unwrap().entry(peer).or_insert(0) += 1;
        if let Some(err) = self.open_errors.lock().unwrap().get(&peer) {
            return Err(err.clone());
        }
        let data = Arc::new(Mutex::new(Vec::new()));
        self.opened.lock().unwrap().push((peer, data.clone()));
        Ok(SinkStream::new(data))
    }
}

/// Directory mock: identity → endpoints, missing entries fail lookups.
#[derive(Clone, Default)]
pub struct MockDirectory {
    pub endpoints: Arc<Mutex<HashMap<PeerId, Vec<Multiaddr>>>>,
    pub refreshes: Arc<Mutex<u32>>,
}

impl MockDirectory {
    pub fn publish(&self, peer: PeerId, addrs: Vec<Multiaddr>) {
        self.endpoints.lock().unwrap().insert(peer, addrs);
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn find_peer(&self, peer: PeerId) -> Result<Vec<Multiaddr>, HostError> {
        self.endpoints
            .lock()
            .unwrap()
            .get(&peer)
            .cloned()
            .ok_or_else(|| HostError::LookupFailed("routing: not found".to_string()))
    }

    async fn refresh_routing_table(&self) -> Result<(), HostError> {
        *self.refreshes.lock().unwrap() += 1;
        Ok(())
    }
}

/// StateStore mock keeping every persisted snapshot in order.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    pub saved: Arc<Mutex<Vec<(String, ConnectionState)>>>,
}

impl MemoryStateStore {
    pub fn last(&self) -> Option<(String, ConnectionState)> {
        self.saved.lock().unwrap().last().cloned()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, interface: &str, state: &ConnectionState) -> anyhow::Result<()> {
        self.saved
            .lock()
            .unwrap()
            .push((interface.to_string(), state.clone()));
        Ok(())
    }
}
