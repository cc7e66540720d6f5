//! Transport-to-dispatcher integration: frames sent over TCP reach the
//! directory service with the sender as the peer descriptor.

use kestrel_directory::testing::{build_service, TestServiceConfig};
use kestrel_directory::wire::{DsInstruction, DS_MSG_TYPE};
use kestrel_directory::DirState;
use kestrel_node::DsNetwork;
use kestrel_types::{Hash, Microblock};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

fn microblock_payload(shard_id: u32) -> Vec<u8> {
    let mut payload = vec![DS_MSG_TYPE, DsInstruction::MicroblockSubmission as u8];
    payload.extend_from_slice(
        &Microblock {
            shard_id,
            block_num: 1,
            tx_root: Hash::compute(b"txs"),
        }
        .encode(),
    );
    payload
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inbound_frames_reach_the_dispatcher() {
    let (service, _) = build_service(TestServiceConfig::default());
    service.set_state(DirState::MicroblockSubmission);

    let network = Arc::new(DsNetwork::new(service.clone()));
    let token = CancellationToken::new();
    let addr = network
        .listen("127.0.0.1:0".parse().unwrap(), token.clone())
        .await
        .unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Two microblocks in one write, plus an unknown frame type that must
    // be ignored.
    let mut bytes = frame(&microblock_payload(0));
    bytes.extend_from_slice(&frame(&microblock_payload(1)));
    bytes.extend_from_slice(&frame(&[0xee, 0x00]));
    stream.write_all(&bytes).await.unwrap();
    stream.flush().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while service.collected_microblocks().len() < 2 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "microblocks never arrived"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(service.collected_microblocks().len(), 2);
    token.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_roundtrip_between_transports() {
    let (receiver_service, _) = build_service(TestServiceConfig::default());
    receiver_service.set_state(DirState::MicroblockSubmission);

    let receiver = Arc::new(DsNetwork::new(receiver_service.clone()));
    let token = CancellationToken::new();
    let addr = receiver
        .listen("127.0.0.1:0".parse().unwrap(), token.clone())
        .await
        .unwrap();

    let (sender_service, _) = build_service(TestServiceConfig::default());
    let sender = Arc::new(DsNetwork::new(sender_service));

    let peer = kestrel_types::Peer::new(addr.ip(), addr.port());
    sender.send(&peer, microblock_payload(3)).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while receiver_service.collected_microblocks().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "frame never arrived"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    token.cancel();
}
