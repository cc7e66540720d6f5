//! Chain-head state shared across the directory service.
//!
//! Tracks the last DS block's number and difficulties, the two PoW
//! randomness values (`rand1` from the last DS block, `rand2` from the
//! last Tx block) and the epoch counter. Guarded by one lock; last in
//! the crate's lock hierarchy.

use kestrel_types::config::{rand1_genesis, rand2_genesis};
use kestrel_types::{DsBlockHeader, Hash, ProtocolConfig};
use parking_lot::Mutex;

/// Snapshot of the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHeadState {
    /// Current epoch number.
    pub epoch: u64,
    /// Number of the last committed DS block (0 before the first).
    pub last_ds_block_num: u64,
    /// Shard-tier difficulty from the last DS block header (genesis
    /// default before the first block).
    pub shard_difficulty: u8,
    /// DS-tier difficulty from the last DS block header.
    pub ds_difficulty: u8,
    /// `rand1`: randomness seeded from the last DS block.
    pub ds_block_rand: Hash,
    /// `rand2`: randomness seeded from the last Tx block.
    pub tx_block_rand: Hash,
}

/// The shared chain head.
pub struct ChainHead {
    inner: Mutex<ChainHeadState>,
}

impl ChainHead {
    /// Create a genesis chain head from the protocol defaults.
    pub fn new(cfg: &ProtocolConfig) -> Self {
        Self {
            inner: Mutex::new(ChainHeadState {
                epoch: 1,
                last_ds_block_num: 0,
                shard_difficulty: cfg.pow_difficulty,
                ds_difficulty: cfg.ds_pow_difficulty,
                ds_block_rand: rand1_genesis(),
                tx_block_rand: rand2_genesis(),
            }),
        }
    }

    /// Copy of the current head.
    pub fn snapshot(&self) -> ChainHeadState {
        *self.inner.lock()
    }

    /// Apply a committed DS block: advance the block number, adopt its
    /// difficulties and reseed `rand1` from its hash.
    pub fn apply_ds_block(&self, header: &DsBlockHeader, block_hash: Hash) {
        let mut head = self.inner.lock();
        head.last_ds_block_num = header.block_num;
        head.shard_difficulty = header.difficulty;
        head.ds_difficulty = header.ds_difficulty;
        head.ds_block_rand = block_hash;
    }

    /// Apply a committed Tx block: reseed `rand2` and advance the epoch.
    /// Returns the new epoch number.
    pub fn apply_final_block(&self, block_hash: Hash) -> u64 {
        let mut head = self.inner.lock();
        head.tx_block_rand = block_hash;
        head.epoch += 1;
        head.epoch
    }
}
