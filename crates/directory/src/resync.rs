//! The resync controller.
//!
//! When the node detects it has fallen behind (or is rejoining the
//! committee after a fault), it flips the sync register away from
//! `NoSync` — which makes the dispatcher drop all DS traffic — and pulls
//! missing DS and Tx blocks from the lookup nodes until it has caught
//! up. Catch-up is detected when a fetch cycle returns nothing new.

use crate::error::DirectoryError;
use crate::service::DirectoryService;
use crate::state::Mode;
use kestrel_types::{DsBlock, SyncType, TxBlock};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The shared sync-mode register.
pub struct SyncHandle {
    inner: RwLock<SyncType>,
}

impl Default for SyncHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncHandle {
    /// Create a register in [`SyncType::NoSync`].
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SyncType::NoSync),
        }
    }

    /// Current sync mode.
    pub fn get(&self) -> SyncType {
        *self.inner.read()
    }

    /// Change the sync mode.
    pub fn set(&self, sync: SyncType) {
        let mut current = self.inner.write();
        if *current != sync {
            info!(from = %current, to = %sync, "sync mode change");
            *current = sync;
        }
    }
}

impl DirectoryService {
    /// Drive catch-up against the lookup nodes until the register
    /// returns to `NoSync`.
    pub async fn start_synchronization(&self, token: CancellationToken) {
        if self.cfg.lookup_node_mode {
            warn!("StartSynchronization not expected on a lookup node");
            return;
        }

        self.clean_variables();

        self.lookup.fetch_offline_lookups().await;
        let discovery_bound = Duration::from_secs(self.cfg.pow_window_in_seconds);
        if !self.lookup.wait_offline_lookups(discovery_bound).await {
            warn!("offline lookup discovery timed out");
            return;
        }

        if let Err(err) = self.lookup.fetch_ds_info().await {
            warn!(%err, "failed to fetch DS info from lookups");
        }

        while self.sync.get() != SyncType::NoSync {
            if token.is_cancelled() {
                return;
            }

            let mut progressed = false;
            let head = self.chain.snapshot();
            match self.lookup.fetch_ds_blocks_from(head.last_ds_block_num + 1).await {
                Ok(blocks) => {
                    for bytes in blocks {
                        match self.ingest_ds_block(bytes).await {
                            Ok(()) => progressed = true,
                            Err(err) => {
                                warn!(%err, "failed to ingest fetched DS block");
                                break;
                            }
                        }
                    }
                }
                Err(err) => warn!(%err, "DS block fetch failed; retrying"),
            }

            let epoch = self.chain.snapshot().epoch;
            match self.lookup.fetch_tx_blocks_from(epoch).await {
                Ok(blocks) => {
                    for bytes in blocks {
                        match self.ingest_tx_block(bytes).await {
                            Ok(()) => progressed = true,
                            Err(err) => {
                                warn!(%err, "failed to ingest fetched Tx block");
                                break;
                            }
                        }
                    }
                }
                Err(err) => warn!(%err, "Tx block fetch failed; retrying"),
            }

            // Nothing new from the lookups: we are at the network head.
            if !progressed {
                info!("caught up with the network");
                self.finish_rejoin_as_ds();
                break;
            }

            if !crate::driver::sleep_or_cancel(
                &token,
                Duration::from_secs(self.cfg.new_node_sync_interval),
            )
            .await
            {
                return;
            }
        }

        info!("synchronization complete");
    }

    /// Apply a DS block fetched from a lookup.
    async fn ingest_ds_block(&self, bytes: Vec<u8>) -> Result<(), DirectoryError> {
        let block = DsBlock::decode(&bytes)?;
        self.storage
            .put_ds_block(block.header.block_num, bytes)
            .await?;
        self.chain.apply_ds_block(&block.header, block.hash());
        let epoch = self.chain.snapshot().epoch;
        self.committee.rotate(&block.winners, epoch);
        info!(block_num = block.header.block_num, "ingested DS block");
        Ok(())
    }

    /// Apply a Tx block fetched from a lookup.
    async fn ingest_tx_block(&self, bytes: Vec<u8>) -> Result<(), DirectoryError> {
        let block = TxBlock::decode(&bytes)?;
        self.storage
            .put_tx_block(block.header.block_num, bytes)
            .await?;
        let epoch = self.chain.apply_final_block(block.hash());
        info!(block_num = block.header.block_num, epoch, "ingested Tx block");
        Ok(())
    }

    /// Backup-node recovery entry point: leave the committee's hot path,
    /// resynchronize in a detached task, then rejoin.
    pub fn rejoin_as_ds(self: &Arc<Self>, token: CancellationToken) {
        if self.cfg.lookup_node_mode {
            warn!("RejoinAsDS not expected on a lookup node");
            return;
        }
        if self.sync.get() != SyncType::NoSync || self.mode() != Mode::BackupDs {
            return;
        }

        self.sync.set(SyncType::DsSync);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.start_synchronization(token).await;
        });
    }

    /// Re-enter committee duty after a successful resync.
    pub fn finish_rejoin_as_ds(&self) -> bool {
        if self.cfg.lookup_node_mode {
            warn!("FinishRejoinAsDS not expected on a lookup node");
            return true;
        }

        self.set_mode(Mode::BackupDs);
        match self.my_consensus_id() {
            Some(id) => info!(consensus_id = id, "rejoined the DS committee"),
            None => warn!("not currently in the DS committee"),
        }
        self.sync.set(SyncType::NoSync);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_service, ScriptedLookup, TestServiceConfig};
    use kestrel_types::{DsBlockHeader, Hash, PubKeyBytes, TxBlockHeader};
    use std::sync::Arc;

    fn remote_chain() -> (Vec<u8>, Vec<u8>) {
        let ds = DsBlock {
            header: DsBlockHeader {
                block_num: 1,
                difficulty: 4,
                ds_difficulty: 6,
                prev_hash: Hash::compute(b"prev"),
                leader_pubkey: PubKeyBytes::from_bytes([0x02; 33]),
            },
            winners: Vec::new(),
        };
        let tx = TxBlock {
            header: TxBlockHeader {
                block_num: 1,
                prev_hash: Hash::compute(b"tx prev"),
                microblock_root: Hash::ZERO,
            },
            microblock_hashes: Vec::new(),
        };
        (ds.encode(), tx.encode())
    }

    #[tokio::test]
    async fn test_resync_ingests_and_rejoins() {
        let (ds_bytes, tx_bytes) = remote_chain();
        let lookup = Arc::new(ScriptedLookup::new(
            vec![ds_bytes.clone()],
            vec![tx_bytes.clone()],
        ));
        let (service, _) = build_service(TestServiceConfig {
            lookup: lookup.clone(),
            ..TestServiceConfig::default()
        });
        service.set_mode(Mode::BackupDs);
        service.sync().set(SyncType::DsSync);

        service.start_synchronization(CancellationToken::new()).await;

        assert_eq!(service.sync().get(), SyncType::NoSync);
        let head = service.chain().snapshot();
        assert_eq!(head.last_ds_block_num, 1);
        assert_eq!(head.shard_difficulty, 4);
        assert_eq!(head.ds_difficulty, 6);
        assert_eq!(head.epoch, 2);
        assert_eq!(service.mode(), Mode::BackupDs);
    }

    #[tokio::test]
    async fn test_rejoin_requires_backup_mode() {
        let (service, _) = build_service(TestServiceConfig::default());
        // build_service leaves the node as primary; rejoin is a no-op.
        service.rejoin_as_ds(CancellationToken::new());
        assert_eq!(service.sync().get(), SyncType::NoSync);
    }
}
