//! End-to-end epoch sequencing against scripted collaborators.

use kestrel_directory::testing::{
    build_service, test_protocol, ScriptedOutcome, TestServiceConfig,
};
use kestrel_directory::wire::{encode_view_change, DsInstruction, PowSubmission};
use kestrel_directory::{DirState, DirectoryError, Mode};
use kestrel_crypto::SchnorrKeyPair;
use kestrel_storage::{BlockStorage, InMemoryStorage};
use kestrel_types::config::{rand1_genesis, rand2_genesis};
use kestrel_types::{Hash, Peer, ProtocolConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn wait_for_epoch(service: &kestrel_directory::DirectoryService, epoch: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while service.chain().snapshot().epoch < epoch {
        assert!(
            tokio::time::Instant::now() < deadline,
            "epoch {epoch} was not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_epoch_produces_blocks_and_rotates_committee() {
    let storage = Arc::new(InMemoryStorage::new());
    let (service, _consensus) = build_service(TestServiceConfig {
        storage: storage.clone(),
        ..TestServiceConfig::default()
    });

    // Bootstrap through the wire path: this node is the primary.
    let mut bootstrap = vec![DsInstruction::SetPrimary as u8];
    service.self_peer().encode_to(&mut bootstrap);
    assert!(service.execute(&bootstrap, 0, &service.self_peer()).await);
    assert_eq!(service.mode(), Mode::PrimaryDs);

    let token = CancellationToken::new();
    let driver = tokio::spawn(service.clone().run_epoch_driver(token.clone()));

    // Give the driver a beat to open the PoW window.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(service.current_state(), DirState::PowSubmission);

    // One DS-tier submission from a miner.
    let miner = SchnorrKeyPair::generate(&mut rand::thread_rng());
    let miner_pubkey = miner.public_key.to_pubkey_bytes();
    let miner_peer = Peer::new(IpAddr::V4(Ipv4Addr::new(52, 9, 9, 9)), 6000);
    let head = service.chain().snapshot();
    let submission = PowSubmission::build_signed(
        &[DsInstruction::PowSubmission as u8],
        head.last_ds_block_num + 1,
        head.ds_difficulty,
        miner_peer.port as u32,
        &miner,
        7,
        &Hash::compute(b"result"),
        &Hash::compute(b"mix"),
    );
    assert!(service.execute(&submission, 0, &miner_peer).await);
    assert!(service.pow_pool().has_ds_solution(&miner_pubkey));

    wait_for_epoch(&service, 2).await;
    token.cancel();
    driver.await.unwrap().unwrap();

    // The epoch produced both blocks and promoted the miner.
    assert!(storage.get_ds_block(1).await.unwrap().is_some());
    assert!(storage.get_tx_block(1).await.unwrap().is_some());
    assert!(service.committee().contains(&miner_pubkey));

    let head = service.chain().snapshot();
    assert_eq!(head.last_ds_block_num, 1);
    assert_eq!(head.epoch, 2);
    // Randomness was reseeded from the committed blocks.
    assert_ne!(head.ds_block_rand, rand1_genesis());
    assert_ne!(head.tx_block_rand, rand2_genesis());

    // A transaction-body database was opened for the new epoch.
    assert_eq!(storage.tx_body_db_count().await.unwrap(), 1);
    assert_eq!(service.view_change_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_consensus_timeout_triggers_view_change_then_recovers() {
    let (service, consensus) = build_service(TestServiceConfig::default());
    // DS-block round times out once; the view change commits; everything
    // afterwards commits normally.
    consensus.script([ScriptedOutcome::Timeout, ScriptedOutcome::CommitProposal]);

    let token = CancellationToken::new();
    let driver = tokio::spawn(service.clone().run_epoch_driver(token.clone()));

    wait_for_epoch(&service, 2).await;
    token.cancel();
    driver.await.unwrap().unwrap();

    // Proposal order: DS block, view change, DS block retry, final block.
    let proposals = consensus.proposals();
    assert!(proposals.len() >= 4, "got {} proposals", proposals.len());
    assert_eq!(proposals[1], encode_view_change(0));
    assert_ne!(proposals[0], proposals[1]);
    assert_eq!(proposals[0], proposals[2]);

    assert_eq!(service.view_change_count(), 0);
    assert_eq!(service.chain().snapshot().epoch, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_view_change_exhaustion_halts_driver() {
    let (service, consensus) = build_service(TestServiceConfig {
        protocol: ProtocolConfig {
            max_view_change_retries: 2,
            ..test_protocol()
        },
        ..TestServiceConfig::default()
    });
    consensus.default_outcome(ScriptedOutcome::Timeout);

    let token = CancellationToken::new();
    let driver = tokio::spawn(service.clone().run_epoch_driver(token.clone()));

    let result = tokio::time::timeout(Duration::from_secs(30), driver)
        .await
        .expect("driver halts")
        .unwrap();
    assert!(matches!(
        result,
        Err(DirectoryError::ViewChangeExceeded { retries: 2 })
    ));
    assert_eq!(service.current_state(), DirState::Error);
}
