//! Opcode dispatch for inbound DS messages.
//!
//! One opcode byte selects the handler; every stateful handler runs its
//! own action check against the permission matrix before touching shared
//! state. While the node is resynchronizing, all DS traffic is dropped
//! here, before any handler sees it.

use crate::service::DirectoryService;
use crate::state::Action;
use crate::wire::DsInstruction;
use kestrel_types::{Microblock, Peer, SyncType};
use tracing::{debug, info, warn};

impl DirectoryService {
    /// Demultiplex one inbound DS message.
    ///
    /// `offset` points at the opcode byte; the instruction body follows
    /// it. Returns whether a handler accepted the message.
    pub async fn execute(&self, message: &[u8], offset: usize, from: &Peer) -> bool {
        if self.sync.get() != SyncType::NoSync {
            warn!(sync = %self.sync.get(), "ignoring DS message during resync");
            return false;
        }

        let Some(&opcode) = message.get(offset) else {
            warn!("DS message missing instruction byte");
            return false;
        };

        let instruction = match DsInstruction::try_from(opcode) {
            Ok(instruction) => instruction,
            Err(byte) => {
                info!(opcode = byte, "unknown DS instruction");
                return false;
            }
        };

        let body = offset + 1;
        match instruction {
            DsInstruction::SetPrimary => self.process_set_primary(message, body, from).await,
            DsInstruction::PowSubmission => self.process_pow_submission(message, body, from).await,
            DsInstruction::DsBlockConsensus => {
                self.process_consensus_message(Action::ProcessDsBlockConsensus, message, body, from)
                    .await
            }
            DsInstruction::MicroblockSubmission => {
                self.process_microblock_submission(message, body, from)
            }
            DsInstruction::FinalBlockConsensus => {
                self.process_consensus_message(
                    Action::ProcessFinalBlockConsensus,
                    message,
                    body,
                    from,
                )
                .await
            }
            DsInstruction::ViewChangeConsensus => {
                if self.cfg.lookup_node_mode {
                    warn!("view-change consensus message on a lookup node");
                    return false;
                }
                self.process_consensus_message(
                    Action::ProcessViewChangeConsensus,
                    message,
                    body,
                    from,
                )
                .await
            }
        }
    }

    /// Shared prelude for the three consensus opcodes: gate on the
    /// permission matrix, then hand the body to the consensus engine.
    async fn process_consensus_message(
        &self,
        action: Action,
        message: &[u8],
        offset: usize,
        from: &Peer,
    ) -> bool {
        if !self.check_action(action) {
            return false;
        }
        self.consensus.on_message(&message[offset..], from).await
    }

    /// Handler for shard microblocks (opcode 3).
    pub fn process_microblock_submission(
        &self,
        message: &[u8],
        offset: usize,
        from: &Peer,
    ) -> bool {
        if !self.check_action(Action::ProcessMicroblockSubmission) {
            return false;
        }

        let microblock = match Microblock::decode(&message[offset.min(message.len())..]) {
            Ok(microblock) => microblock,
            Err(err) => {
                warn!(%err, %from, "malformed microblock");
                return false;
            }
        };

        let epoch = self.chain.snapshot().epoch;
        if microblock.block_num != epoch {
            warn!(
                got = microblock.block_num,
                expected = epoch,
                "microblock for wrong Tx block"
            );
            return false;
        }

        let mut buffer = self.microblocks.lock();
        if buffer
            .iter()
            .any(|existing| existing.shard_id == microblock.shard_id)
        {
            debug!(shard = microblock.shard_id, "duplicate microblock; keeping first");
            return true;
        }
        info!(
            shard = microblock.shard_id,
            collected = buffer.len() + 1,
            "microblock accepted"
        );
        buffer.push(microblock);
        true
    }

    /// Snapshot of the microblocks collected this epoch.
    pub fn collected_microblocks(&self) -> Vec<Microblock> {
        self.microblocks.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DirState;
    use crate::testing::{build_service, TestServiceConfig};
    use kestrel_types::Hash;
    use std::net::{IpAddr, Ipv4Addr};

    fn shard_peer() -> Peer {
        Peer::new(IpAddr::V4(Ipv4Addr::new(52, 44, 0, 1)), 5001)
    }

    fn microblock_message(shard_id: u32, block_num: u64) -> Vec<u8> {
        let mut msg = vec![DsInstruction::MicroblockSubmission as u8];
        msg.extend_from_slice(
            &Microblock {
                shard_id,
                block_num,
                tx_root: Hash::compute(b"txs"),
            }
            .encode(),
        );
        msg
    }

    #[tokio::test]
    async fn test_unknown_opcode_rejected() {
        let (service, _) = build_service(TestServiceConfig::default());
        assert!(!service.execute(&[0x09], 0, &shard_peer()).await);
        assert!(!service.execute(&[], 0, &shard_peer()).await);
    }

    #[tokio::test]
    async fn test_messages_dropped_during_resync() {
        let (service, _) = build_service(TestServiceConfig::default());
        service.set_state(DirState::MicroblockSubmission);
        let msg = microblock_message(0, 1);

        service.sync().set(SyncType::DsSync);
        assert!(!service.execute(&msg, 0, &shard_peer()).await);

        service.sync().set(SyncType::NoSync);
        assert!(service.execute(&msg, 0, &shard_peer()).await);
    }

    #[tokio::test]
    async fn test_microblock_collection_and_dedup() {
        let (service, _) = build_service(TestServiceConfig::default());
        service.set_state(DirState::MicroblockSubmission);

        assert!(service.execute(&microblock_message(0, 1), 0, &shard_peer()).await);
        assert!(service.execute(&microblock_message(1, 1), 0, &shard_peer()).await);
        // Duplicate shard: accepted but not re-buffered.
        assert!(service.execute(&microblock_message(0, 1), 0, &shard_peer()).await);

        assert_eq!(service.collected_microblocks().len(), 2);
    }

    #[tokio::test]
    async fn test_microblock_for_wrong_epoch_rejected() {
        let (service, _) = build_service(TestServiceConfig::default());
        service.set_state(DirState::MicroblockSubmission);
        assert!(!service.execute(&microblock_message(0, 9), 0, &shard_peer()).await);
    }

    #[tokio::test]
    async fn test_microblock_outside_window_rejected() {
        let (service, _) = build_service(TestServiceConfig::default());
        // Still in PoW submission: microblocks are not allowed.
        assert!(!service.execute(&microblock_message(0, 1), 0, &shard_peer()).await);
    }
}
