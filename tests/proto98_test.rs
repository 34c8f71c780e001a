//! proto98 handler integration tests
//!
//! Drives `ping` and `handle_inbound` against a mock host and checks the
//! exact bytes that go out on the wire.

mod common;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use libp2p::PeerId;
use tokio::sync::RwLock;

use common::MockHost;
use meshnode::p2p::PeerTable;
use meshnode::proto98::{handle_inbound, ping, Command, PingError, Proto98Packet, PACKET_LEN};

fn table_with(ip: &str, peer: PeerId) -> PeerTable {
    let mut map = HashMap::new();
    map.insert(ip.to_string(), peer);
    Arc::new(RwLock::new(map))
}

/// Strip the length prefix off a captured frame and parse the packet.
fn decode_frame(wire: &[u8]) -> Proto98Packet {
    let len = u16::from_le_bytes([wire[0], wire[1]]) as usize;
    assert_eq!(len, PACKET_LEN);
    assert_eq!(wire.len(), 2 + len);
    Proto98Packet::parse(&wire[2..]).unwrap()
}

#[tokio::test]
async fn ping_sends_one_framed_packet() {
    let host = MockHost::default();
    let peer = PeerId::random();
    let table = table_with("10.0.0.5", peer);

    ping(&host, "10.0.0.1/24", "10.0.0.5", &table).await.unwrap();

    let opened = host.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, peer);

    let packet = decode_frame(&host.written_to(0));
    assert_eq!(Command::from_byte(packet.command()), Some(Command::Ping));
    assert_eq!(packet.src(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(packet.dst(), Ipv4Addr::new(10, 0, 0, 5));
}

#[tokio::test]
async fn ping_unknown_peer_sends_nothing() {
    let host = MockHost::default();
    let table = table_with("10.0.0.2", PeerId::random());

    let err = ping(&host, "10.0.0.1/24", "10.0.0.5", &table)
        .await
        .unwrap_err();
    assert!(matches!(err, PingError::UnknownPeer(_)));
    assert!(host.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ping_rejects_malformed_addresses() {
    let host = MockHost::default();
    let table = table_with("10.0.0.5", PeerId::random());

    // Source must be a CIDR prefix.
    let err = ping(&host, "10.0.0.1", "10.0.0.5", &table).await.unwrap_err();
    assert!(matches!(err, PingError::InvalidAddress(_)));

    // Target must be an IPv4 literal.
    let err = ping(&host, "10.0.0.1/24", "not-an-ip", &table)
        .await
        .unwrap_err();
    assert!(matches!(err, PingError::InvalidAddress(_)));

    assert!(host.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn inbound_ping_is_answered_with_pong() {
    let host = MockHost::default();
    let sender = PeerId::random();

    let src = Ipv4Addr::new(10, 0, 0, 7);
    let dst = Ipv4Addr::new(10, 0, 0, 1);
    let ping_packet = Proto98Packet::ping(src, dst);

    handle_inbound(&host, sender, ping_packet.as_bytes())
        .await
        .unwrap();

    let opened = host.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1, "exactly one outbound stream");
    assert_eq!(opened[0].0, sender, "pong goes back to the sender");

    let pong = decode_frame(&host.written_to(0));
    assert_eq!(Command::from_byte(pong.command()), Some(Command::Pong));
    // The pong carries the same endpoints as the ping it answers.
    assert_eq!(pong.src(), src);
    assert_eq!(pong.dst(), dst);
}

#[tokio::test]
async fn inbound_pong_is_terminal() {
    let host = MockHost::default();
    let packet = Proto98Packet::pong(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 7));

    handle_inbound(&host, PeerId::random(), packet.as_bytes())
        .await
        .unwrap();

    assert!(host.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn inbound_unknown_command_is_ignored() {
    let host = MockHost::default();

    let mut bytes = Proto98Packet::ping(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 7))
        .as_bytes()
        .to_vec();
    bytes[21] = 0x7f;

    handle_inbound(&host, PeerId::random(), &bytes).await.unwrap();
    assert!(host.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn inbound_short_frame_is_malformed() {
    let host = MockHost::default();

    let err = handle_inbound(&host, PeerId::random(), &[0x45, 0x00, 0x98])
        .await
        .unwrap_err();
    assert!(matches!(err, PingError::Packet(_)));
    assert!(host.opened.lock().unwrap().is_empty());
}
