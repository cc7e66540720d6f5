//! The view-change controller.
//!
//! Entered whenever a consensus round times out or aborts. Each entry
//! increments the view-change counter `V`; the candidate leader is
//! `(leader_id + V) mod N`, so repeated failures walk past dead leaders.
//! A committed view change installs the agreed leader, clears `V`, and
//! control returns to the phase that failed. `V` beyond the configured
//! retry cap halts the node in the error state.

use crate::consensus::ConsensusOutcome;
use crate::error::DirectoryError;
use crate::service::DirectoryService;
use crate::state::DirState;
use crate::wire;
use kestrel_metrics::directory::{CONSENSUS_ROUNDS_TOTAL, VIEW_CHANGES_TOTAL};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl DirectoryService {
    /// Run view changes until one commits.
    ///
    /// Returns `Ok(true)` when a new leader is installed, `Ok(false)` on
    /// cancellation, and an error when the retry cap is exceeded (the
    /// node is left in [`DirState::Error`]).
    pub(crate) async fn run_view_change(
        &self,
        token: &CancellationToken,
    ) -> Result<bool, DirectoryError> {
        loop {
            if token.is_cancelled() {
                return Ok(false);
            }

            self.set_state(DirState::ViewChangeConsensusPrep);
            let attempt = self.view_change_counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.cfg.max_view_change_retries {
                error!(
                    retries = attempt - 1,
                    "view change retries exhausted; operator intervention required"
                );
                VIEW_CHANGES_TOTAL.with_label_values(&["failed"]).inc();
                self.set_state(DirState::Error);
                return Err(DirectoryError::ViewChangeExceeded {
                    retries: attempt - 1,
                });
            }

            let members = self.committee.len();
            if members == 0 {
                self.set_state(DirState::Error);
                return Err(DirectoryError::EmptyCommittee);
            }
            let candidate = (self.committee.leader_id() + attempt as usize) % members;
            info!(candidate, attempt, "starting view change consensus");

            self.set_state(DirState::ViewChangeConsensus);
            // The candidate leads its own election round.
            if self.my_consensus_id() == Some(candidate) {
                let payload = wire::encode_view_change(candidate as u32);
                if let Err(err) = self.consensus.propose(payload).await {
                    warn!(%err, "view change proposal failed");
                }
            }

            let bound = Duration::from_secs(self.cfg.viewchange_time);
            match self.consensus.wait_outcome(bound).await {
                ConsensusOutcome::Commit(payload) => {
                    let agreed = wire::decode_view_change(&payload)
                        .map(|index| index as usize % members)
                        .unwrap_or(candidate);
                    self.committee.set_leader(agreed);
                    self.view_change_counter.store(0, Ordering::SeqCst);
                    CONSENSUS_ROUNDS_TOTAL
                        .with_label_values(&["view_change", "commit"])
                        .inc();
                    VIEW_CHANGES_TOTAL.with_label_values(&["committed"]).inc();
                    info!(leader = agreed, "view change committed");
                    return Ok(true);
                }
                ConsensusOutcome::Abort(reason) => {
                    warn!(%reason, attempt, "view change aborted");
                    CONSENSUS_ROUNDS_TOTAL
                        .with_label_values(&["view_change", "abort"])
                        .inc();
                }
                ConsensusOutcome::Timeout => {
                    warn!(attempt, "view change timed out");
                    CONSENSUS_ROUNDS_TOTAL
                        .with_label_values(&["view_change", "timeout"])
                        .inc();
                }
            }
        }
    }
}
