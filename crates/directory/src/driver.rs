//! The epoch driver.
//!
//! One supervised task sequences every epoch: open the PoW window, run
//! DS-block consensus, collect microblocks, run final-block consensus,
//! then roll the chain head and the committee forward and start over.
//! Consensus timeouts escalate into view changes; the cancellation token
//! is observed at every sleep and wait boundary.

use crate::consensus::ConsensusOutcome;
use crate::difficulty::next_difficulty;
use crate::error::DirectoryError;
use crate::service::DirectoryService;
use crate::state::{DirState, Mode};
use kestrel_metrics::directory::{CONSENSUS_ROUNDS_TOTAL, DS_DIFFICULTY, DS_EPOCH};
use kestrel_storage::MetaType;
use kestrel_types::{DsBlock, DsBlockHeader, Hash, Peer, ProtocolConfig, PubKeyBytes, TxBlock, TxBlockHeader};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Consensus phases the driver runs directly.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ConsensusPhase {
    DsBlock,
    FinalBlock,
}

impl ConsensusPhase {
    pub(crate) fn state(self) -> DirState {
        match self {
            ConsensusPhase::DsBlock => DirState::DsBlockConsensus,
            ConsensusPhase::FinalBlock => DirState::FinalBlockConsensus,
        }
    }

    pub(crate) fn timeout(self, cfg: &ProtocolConfig) -> Duration {
        Duration::from_secs(cfg.consensus_object_timeout)
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            ConsensusPhase::DsBlock => "ds_block",
            ConsensusPhase::FinalBlock => "final_block",
        }
    }
}

/// Sleep for `duration` unless cancelled. Returns `false` on cancel.
pub(crate) async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

impl DirectoryService {
    /// Run the epoch loop until cancelled or until the node halts in the
    /// error state.
    pub async fn run_epoch_driver(
        self: Arc<Self>,
        token: CancellationToken,
    ) -> Result<(), DirectoryError> {
        if self.cfg.lookup_node_mode {
            warn!("epoch driver not expected on a lookup node");
            return Ok(());
        }

        // Nothing to drive until the bootstrap installs a committee.
        let mut mode_rx = self.mode_watch();
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            changed = mode_rx.wait_for(|mode| *mode != Mode::Idle) => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }

        loop {
            // Step 1: fresh collectors, open the PoW window.
            self.clean_variables();
            self.set_state(DirState::PowSubmission);
            {
                let head = self.chain.snapshot();
                DS_EPOCH.set(head.epoch as f64);
                info!(
                    epoch = head.epoch,
                    window_secs = self.cfg.pow_window_in_seconds,
                    "accepting PoW submissions"
                );
            }
            if !sleep_or_cancel(&token, Duration::from_secs(self.cfg.pow_window_in_seconds)).await {
                return Ok(());
            }

            // Step 2: close the window, assemble the DS block.
            self.set_state(DirState::DsBlockConsensusPrep);
            let proposal = self.compose_ds_block();
            *self.pending_ds_block.lock() = Some(proposal.clone());
            info!(
                block_num = proposal.header.block_num,
                difficulty = proposal.header.difficulty,
                ds_difficulty = proposal.header.ds_difficulty,
                winners = proposal.winners.len(),
                "starting consensus on DS block"
            );

            // Step 3: DS-block consensus (view changes inside).
            let committed = match self
                .run_consensus_phase(ConsensusPhase::DsBlock, proposal.encode(), &token)
                .await?
            {
                Some(bytes) => bytes,
                None => return Ok(()),
            };
            let ds_block = match DsBlock::decode(&committed) {
                Ok(block) => block,
                Err(err) => {
                    error!(%err, "committed DS block failed to decode");
                    self.set_state(DirState::Error);
                    return Err(err.into());
                }
            };
            self.commit_ds_block(&ds_block).await?;

            // Step 4: microblock collection window.
            self.set_state(DirState::MicroblockSubmission);
            if !sleep_or_cancel(&token, Duration::from_secs(self.cfg.microblock_timeout)).await {
                return Ok(());
            }

            // Step 5: final-block consensus.
            self.set_state(DirState::FinalBlockConsensusPrep);
            let final_proposal = self.compose_final_block();
            info!(
                block_num = final_proposal.header.block_num,
                microblocks = final_proposal.microblock_hashes.len(),
                "starting consensus on final block"
            );
            let committed = match self
                .run_consensus_phase(ConsensusPhase::FinalBlock, final_proposal.encode(), &token)
                .await?
            {
                Some(bytes) => bytes,
                None => return Ok(()),
            };
            let tx_block = match TxBlock::decode(&committed) {
                Ok(block) => block,
                Err(err) => {
                    error!(%err, "committed final block failed to decode");
                    self.set_state(DirState::Error);
                    return Err(err.into());
                }
            };
            self.commit_final_block(&tx_block).await?;
        }
    }

    /// Run one consensus phase to a commit, escalating timeouts and
    /// aborts into view changes and retrying the phase afterwards.
    /// `Ok(None)` means the driver was cancelled mid-phase.
    pub(crate) async fn run_consensus_phase(
        &self,
        phase: ConsensusPhase,
        payload: Vec<u8>,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, DirectoryError> {
        loop {
            if token.is_cancelled() {
                return Ok(None);
            }
            self.set_state(phase.state());
            if self.is_leader() {
                if let Err(err) = self.consensus.propose(payload.clone()).await {
                    warn!(%err, phase = phase.label(), "consensus proposal failed");
                }
            }
            match self.consensus.wait_outcome(phase.timeout(&self.cfg)).await {
                ConsensusOutcome::Commit(bytes) => {
                    CONSENSUS_ROUNDS_TOTAL
                        .with_label_values(&[phase.label(), "commit"])
                        .inc();
                    return Ok(Some(bytes));
                }
                ConsensusOutcome::Abort(reason) => {
                    warn!(%reason, phase = phase.label(), "consensus aborted");
                    CONSENSUS_ROUNDS_TOTAL
                        .with_label_values(&[phase.label(), "abort"])
                        .inc();
                }
                ConsensusOutcome::Timeout => {
                    warn!(phase = phase.label(), "consensus timed out");
                    CONSENSUS_ROUNDS_TOTAL
                        .with_label_values(&[phase.label(), "timeout"])
                        .inc();
                }
            }
            if !self.run_view_change(token).await? {
                return Ok(None);
            }
        }
    }

    /// Assemble the next DS block from this epoch's PoW pool.
    pub(crate) fn compose_ds_block(&self) -> DsBlock {
        let head = self.chain.snapshot();
        let submissions = self.pow_pool.all_pow_count() as i64;
        let active_nodes = self.active_node_count.load(Ordering::SeqCst);
        info!(active_nodes, submissions, "computing next difficulty");

        let difficulty = next_difficulty(
            &self.cfg,
            head.shard_difficulty,
            submissions,
            active_nodes,
            head.epoch,
        );
        let ds_difficulty = next_difficulty(
            &self.cfg,
            head.ds_difficulty,
            self.pow_pool.ds_pow_count() as i64,
            self.committee.len() as i64,
            head.epoch,
        );

        // Lowest solution hash wins promotion.
        let mut solutions = self.pow_pool.ds_pow_solutions();
        solutions.sort_by(|a, b| a.2.cmp(&b.2));
        let mut winners: Vec<(PubKeyBytes, Peer)> = solutions
            .into_iter()
            .take(self.cfg.ds_winners_per_epoch)
            .map(|(pubkey, peer, _)| (pubkey, peer))
            .collect();
        winners.sort_by(|a, b| a.0.cmp(&b.0));

        DsBlock {
            header: DsBlockHeader {
                block_num: head.last_ds_block_num + 1,
                difficulty,
                ds_difficulty,
                prev_hash: head.ds_block_rand,
                leader_pubkey: self.committee.leader_pubkey().unwrap_or(self.self_pubkey),
            },
            winners,
        }
    }

    /// Persist a committed DS block and roll the committee forward.
    pub(crate) async fn commit_ds_block(&self, block: &DsBlock) -> Result<(), DirectoryError> {
        let hash = block.hash();
        self.storage
            .put_ds_block(block.header.block_num, block.encode())
            .await?;
        self.storage
            .put_metadata(
                MetaType::LatestActiveDsBlockNum,
                block.header.block_num.to_be_bytes().to_vec(),
            )
            .await?;

        self.chain.apply_ds_block(&block.header, hash);
        let epoch = self.chain.snapshot().epoch;
        let evicted = self.committee.rotate(&block.winners, epoch);
        for member in &evicted {
            info!(pubkey = %member.pubkey, "kicked out of the DS committee");
        }

        // The admitted-submitter count is next epoch's active-node
        // estimate for difficulty adjustment.
        self.active_node_count
            .store(self.pow_pool.all_pow_count() as i64, Ordering::SeqCst);

        DS_DIFFICULTY
            .with_label_values(&["shard"])
            .set(block.header.difficulty as f64);
        DS_DIFFICULTY
            .with_label_values(&["ds"])
            .set(block.header.ds_difficulty as f64);
        info!(
            block_num = block.header.block_num,
            winners = block.winners.len(),
            evicted = evicted.len(),
            "DS block committed"
        );
        Ok(())
    }

    /// Assemble the final block over the collected microblocks.
    pub(crate) fn compose_final_block(&self) -> TxBlock {
        let head = self.chain.snapshot();
        let hashes: Vec<Hash> = self
            .microblocks
            .lock()
            .iter()
            .map(|microblock| microblock.hash())
            .collect();
        TxBlock {
            header: TxBlockHeader {
                block_num: head.epoch,
                prev_hash: head.tx_block_rand,
                microblock_root: TxBlock::compute_microblock_root(&hashes),
            },
            microblock_hashes: hashes,
        }
    }

    /// Persist a committed final block and enter the next epoch.
    pub(crate) async fn commit_final_block(&self, block: &TxBlock) -> Result<(), DirectoryError> {
        self.storage
            .put_tx_block(block.header.block_num, block.encode())
            .await?;

        let new_epoch = self.chain.apply_final_block(block.hash());
        self.view_change_counter.store(0, Ordering::SeqCst);

        // Open the next epoch's transaction-body database and trim the
        // rolling window.
        self.storage.push_back_tx_body_db(new_epoch).await?;
        while self.storage.tx_body_db_count().await? > self.cfg.num_ds_keep_tx_body {
            self.storage.pop_front_tx_body_db(false).await?;
        }

        DS_EPOCH.set(new_epoch as f64);
        info!(
            block_num = block.header.block_num,
            epoch = new_epoch,
            "final block committed; entering new epoch"
        );
        Ok(())
    }
}
