//! Directory-service error types.

use crate::state::DirState;
use kestrel_storage::StorageError;
use kestrel_types::DecodeError;
use thiserror::Error;

/// Errors surfaced by the epoch driver and the resync controller.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Storage collaborator failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A committed payload did not decode as the expected block.
    #[error("block decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Consensus reported an abort.
    #[error("consensus aborted: {0}")]
    ConsensusAborted(String),

    /// Consensus did not terminate within its bound.
    #[error("consensus timed out")]
    ConsensusTimeout,

    /// Too many consecutive view changes; the node halted in the error
    /// state and needs operator intervention.
    #[error("view change retries exhausted after {retries} attempts")]
    ViewChangeExceeded {
        /// Attempts made before giving up.
        retries: u32,
    },

    /// An operation that needs a committee ran before bootstrap.
    #[error("committee is empty")]
    EmptyCommittee,

    /// A resync fetch cycle timed out.
    #[error("resync fetch timed out")]
    ResyncTimeout,
}

/// Reasons a PoW submission is dropped by the intake pipeline.
///
/// Each rejection is logged at the rejection site; the handler reports
/// `false` to the dispatcher and nothing else happens. Submissions
/// rejected for invalid signatures, PoW or difficulty are candidates for
/// a future reputation penalty.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PowRejection {
    /// Submission arrived outside the PoW window.
    #[error("not accepting PoW submissions in state {0}")]
    WrongState(DirState),

    /// Message bytes do not match the fixed submission layout.
    #[error("malformed submission: expected {expected} bytes, got {got}")]
    WrongSize {
        /// Required message body size.
        expected: usize,
        /// Received message body size.
        got: usize,
    },

    /// Submission targets an already-produced DS block.
    #[error("stale block number {got}, expected {expected}")]
    StaleBlockNumber {
        /// Block number in the submission.
        got: u64,
        /// Block number currently being mined.
        expected: u64,
    },

    /// Submission targets a future DS block; this node is behind.
    #[error("future block number {got}, expected {expected}; node may be lagging")]
    FutureBlockNumber {
        /// Block number in the submission.
        got: u64,
        /// Block number currently being mined.
        expected: u64,
    },

    /// Testnet whitelist does not contain the submitter.
    #[error("submitter not in DS whitelist")]
    NotWhitelisted,

    /// Source address is private, broadcast or otherwise unroutable.
    #[error("source IP is not routable")]
    UnroutableSourceIp,

    /// Submitter exceeded the per-epoch submission limit.
    #[error("per-epoch submission limit reached")]
    RateLimited,

    /// Signature did not verify under the submitted public key.
    #[error("invalid submission signature")]
    InvalidSignature,

    /// Difficulty matches neither the shard nor the DS tier.
    #[error("invalid difficulty {got}, expected {expected_shard} or {expected_ds}")]
    InvalidDifficulty {
        /// Difficulty claimed by the submission.
        got: u8,
        /// Current shard-tier difficulty.
        expected_shard: u8,
        /// Current DS-tier difficulty.
        expected_ds: u8,
    },

    /// The PoW verifier rejected the solution.
    #[error("PoW verification failed")]
    InvalidPow,
}

impl PowRejection {
    /// Stable label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PowRejection::WrongState(_) => "wrong_state",
            PowRejection::WrongSize { .. } => "malformed",
            PowRejection::StaleBlockNumber { .. } => "stale_block",
            PowRejection::FutureBlockNumber { .. } => "future_block",
            PowRejection::NotWhitelisted => "not_whitelisted",
            PowRejection::UnroutableSourceIp => "bad_source_ip",
            PowRejection::RateLimited => "rate_limited",
            PowRejection::InvalidSignature => "bad_signature",
            PowRejection::InvalidDifficulty { .. } => "bad_difficulty",
            PowRejection::InvalidPow => "bad_pow",
        }
    }
}
