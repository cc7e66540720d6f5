//! The consensus collaborator seam.
//!
//! Byzantine agreement over a proposed block is an external black box.
//! The epoch driver hands it a payload with [`ConsensusEngine::propose`],
//! the dispatcher forwards consensus traffic through
//! [`ConsensusEngine::on_message`], and the driver blocks on
//! [`ConsensusEngine::wait_outcome`] until the round commits, aborts or
//! times out.

use crate::error::DirectoryError;
use async_trait::async_trait;
use kestrel_types::Peer;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Terminal result of one consensus round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusOutcome {
    /// The committee committed this payload.
    Commit(Vec<u8>),
    /// The round aborted with a reason.
    Abort(String),
    /// The round did not terminate within the wait bound.
    Timeout,
}

/// Byzantine agreement over a proposed payload.
#[async_trait]
pub trait ConsensusEngine: Send + Sync {
    /// Start a round on `payload`. Called by the round leader only.
    async fn propose(&self, payload: Vec<u8>) -> Result<(), DirectoryError>;

    /// Feed an inbound consensus message. Returns whether the message
    /// was accepted.
    async fn on_message(&self, message: &[u8], from: &Peer) -> bool;

    /// Wait for the current round to terminate, bounded by `timeout`.
    async fn wait_outcome(&self, timeout: Duration) -> ConsensusOutcome;
}

/// Trivial single-node engine: every proposal commits immediately.
///
/// Useful for single-validator development networks and tests; it
/// performs no agreement whatsoever.
#[derive(Default)]
pub struct LoopbackConsensus {
    proposal: Mutex<Option<Vec<u8>>>,
    proposed: Notify,
}

impl LoopbackConsensus {
    /// Create a new loopback engine.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsensusEngine for LoopbackConsensus {
    async fn propose(&self, payload: Vec<u8>) -> Result<(), DirectoryError> {
        *self.proposal.lock().await = Some(payload);
        self.proposed.notify_one();
        Ok(())
    }

    async fn on_message(&self, _message: &[u8], from: &Peer) -> bool {
        debug!(%from, "loopback consensus ignores peer traffic");
        false
    }

    async fn wait_outcome(&self, timeout: Duration) -> ConsensusOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(payload) = self.proposal.lock().await.take() {
                return ConsensusOutcome::Commit(payload);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return ConsensusOutcome::Timeout;
            }
            if tokio::time::timeout(deadline - now, self.proposed.notified())
                .await
                .is_err()
            {
                return ConsensusOutcome::Timeout;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_commits_proposal() {
        let engine = LoopbackConsensus::new();
        engine.propose(vec![1, 2, 3]).await.unwrap();
        assert_eq!(
            engine.wait_outcome(Duration::from_millis(100)).await,
            ConsensusOutcome::Commit(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn test_loopback_times_out_without_proposal() {
        let engine = LoopbackConsensus::new();
        assert_eq!(
            engine.wait_outcome(Duration::from_millis(20)).await,
            ConsensusOutcome::Timeout
        );
    }
}
