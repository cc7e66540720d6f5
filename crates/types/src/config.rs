//! Frozen snapshot of protocol constants.
//!
//! Every constant the directory service consults is read once at startup
//! into a [`ProtocolConfig`] and passed by reference into components.
//! Nothing reads configuration lazily at first use.

use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// Wire size of a block hash field.
pub const BLOCK_HASH_SIZE: usize = 32;
/// Wire size of a compressed public key.
pub const PUB_KEY_SIZE: usize = 33;
/// Wire size of a Schnorr signature challenge.
pub const SIGNATURE_CHALLENGE_SIZE: usize = 32;
/// Wire size of a Schnorr signature response.
pub const SIGNATURE_RESPONSE_SIZE: usize = 32;

/// Genesis `rand1` (DS-block randomness before any DS block exists).
pub const RAND1_GENESIS: &str = "2b740d75891749f94b6a8ec09f086889066608e4418eda656c93443e8310750a";
/// Genesis `rand2` (Tx-block randomness before any Tx block exists).
pub const RAND2_GENESIS: &str = "e8cc9106f8a28671d91e2de07b57b828934481fadf6956563b963bb8e5c266bf";

/// Decode one of the genesis randomness constants into a [`Hash`].
fn decode_genesis_rand(hex_str: &str) -> Hash {
    let bytes = hex::decode(hex_str).expect("genesis randomness constant is valid hex");
    let arr: [u8; 32] = bytes
        .try_into()
        .expect("genesis randomness constant is 32 bytes");
    Hash::from_bytes(arr)
}

/// Genesis `rand1` as a [`Hash`].
pub fn rand1_genesis() -> Hash {
    decode_genesis_rand(RAND1_GENESIS)
}

/// Genesis `rand2` as a [`Hash`].
pub fn rand2_genesis() -> Hash {
    decode_genesis_rand(RAND2_GENESIS)
}

/// Protocol constants, frozen at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Duration of the PoW submission window, in seconds.
    pub pow_window_in_seconds: u64,
    /// Bound on waiting for the state machine to leave final-block
    /// consensus before processing a PoW submission, in seconds.
    pub pow_submission_timeout: u64,
    /// Maximum accepted PoW submissions per public key per epoch.
    pub pow_submission_limit: u32,
    /// Minimum (shard-tier) PoW difficulty.
    pub pow_difficulty: u8,
    /// DS-tier PoW difficulty.
    pub ds_pow_difficulty: u8,
    /// Expected whole-network node count, used by difficulty adjustment.
    pub num_network_node: i64,
    /// Percentage of active nodes that the submission delta must reach
    /// before the difficulty adjustment scales proportionally.
    pub pow_change_percent_to_adj_diff: i64,
    /// Final blocks produced per PoW round.
    pub num_final_block_per_pow: u64,
    /// Transaction distribution time per final block, in milliseconds.
    pub tx_distribute_time_in_ms: u64,
    /// Duration of the microblock submission window, in seconds.
    pub microblock_timeout: u64,
    /// Bound on a single consensus round, in seconds.
    pub consensus_object_timeout: u64,
    /// Bound on a view-change consensus round, in seconds.
    pub viewchange_time: u64,
    /// View changes allowed before the node escalates to the error state.
    pub max_view_change_retries: u32,
    /// Target committee size maintained across epoch rotations.
    pub committee_size: usize,
    /// DS-tier PoW winners promoted into the committee per epoch.
    pub ds_winners_per_epoch: usize,
    /// Per-epoch transaction-body databases retained in the rolling window.
    pub num_ds_keep_tx_body: usize,
    /// Sleep between resync fetch iterations, in seconds.
    pub new_node_sync_interval: u64,
    /// Whether this process runs as a lookup node.
    pub lookup_node_mode: bool,
    /// Whether the testnet DS whitelist is enforced.
    pub test_net_mode: bool,
    /// Whether submissions from private or non-routable IPs are rejected.
    pub exclude_priv_ip: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            pow_window_in_seconds: 300,
            pow_submission_timeout: 30,
            pow_submission_limit: 3,
            pow_difficulty: 3,
            ds_pow_difficulty: 5,
            num_network_node: 100,
            pow_change_percent_to_adj_diff: 50,
            num_final_block_per_pow: 50,
            tx_distribute_time_in_ms: 10_000,
            microblock_timeout: 60,
            consensus_object_timeout: 60,
            viewchange_time: 30,
            max_view_change_retries: 16,
            committee_size: 10,
            ds_winners_per_epoch: 1,
            num_ds_keep_tx_body: 5,
            new_node_sync_interval: 10,
            lookup_node_mode: false,
            test_net_mode: false,
            exclude_priv_ip: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_rand_constants_decode() {
        assert_ne!(rand1_genesis(), Hash::ZERO);
        assert_ne!(rand2_genesis(), Hash::ZERO);
        assert_ne!(rand1_genesis(), rand2_genesis());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let cfg = ProtocolConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ProtocolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pow_window_in_seconds, cfg.pow_window_in_seconds);
        assert_eq!(back.pow_submission_limit, cfg.pow_submission_limit);
    }
}
