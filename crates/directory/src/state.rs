//! The DS phase register and its guarded transitions.
//!
//! The state machine is the safety backbone of the directory service:
//! every inbound message is checked against the action-permission matrix
//! before any handler touches shared state. The register itself is a
//! `tokio::sync::watch` channel: [`StateMachine::set`] is the single
//! mutation point, it logs each transition exactly once, and waiters
//! block on the channel with explicit timeouts.

use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// DS node phase within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirState {
    /// Accepting PoW submissions.
    PowSubmission,
    /// PoW window closed; DS block proposal being assembled.
    DsBlockConsensusPrep,
    /// Consensus running on the DS block.
    DsBlockConsensus,
    /// Accepting shard microblocks.
    MicroblockSubmission,
    /// Microblock window closed; final block proposal being assembled.
    FinalBlockConsensusPrep,
    /// Consensus running on the final block.
    FinalBlockConsensus,
    /// View change pending; new leader being selected.
    ViewChangeConsensusPrep,
    /// Consensus running on the view change.
    ViewChangeConsensus,
    /// Unrecoverable fault; no further action permitted.
    Error,
}

impl DirState {
    /// Stable ordinal for metrics export.
    pub fn ordinal(self) -> u8 {
        match self {
            DirState::PowSubmission => 0,
            DirState::DsBlockConsensusPrep => 1,
            DirState::DsBlockConsensus => 2,
            DirState::MicroblockSubmission => 3,
            DirState::FinalBlockConsensusPrep => 4,
            DirState::FinalBlockConsensus => 5,
            DirState::ViewChangeConsensusPrep => 6,
            DirState::ViewChangeConsensus => 7,
            DirState::Error => 8,
        }
    }
}

impl fmt::Display for DirState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DirState::PowSubmission => "POW_SUBMISSION",
            DirState::DsBlockConsensusPrep => "DSBLOCK_CONSENSUS_PREP",
            DirState::DsBlockConsensus => "DSBLOCK_CONSENSUS",
            DirState::MicroblockSubmission => "MICROBLOCK_SUBMISSION",
            DirState::FinalBlockConsensusPrep => "FINALBLOCK_CONSENSUS_PREP",
            DirState::FinalBlockConsensus => "FINALBLOCK_CONSENSUS",
            DirState::ViewChangeConsensusPrep => "VIEWCHANGE_CONSENSUS_PREP",
            DirState::ViewChangeConsensus => "VIEWCHANGE_CONSENSUS",
            DirState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Actions a handler may attempt against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Process an inbound PoW submission.
    ProcessPowSubmission,
    /// Record a verified PoW solution.
    VerifyPow,
    /// Process a DS-block consensus message.
    ProcessDsBlockConsensus,
    /// Process a shard microblock.
    ProcessMicroblockSubmission,
    /// Process a final-block consensus message.
    ProcessFinalBlockConsensus,
    /// Process a view-change consensus message.
    ProcessViewChangeConsensus,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::ProcessPowSubmission => "PROCESS_POWSUBMISSION",
            Action::VerifyPow => "VERIFYPOW",
            Action::ProcessDsBlockConsensus => "PROCESS_DSBLOCKCONSENSUS",
            Action::ProcessMicroblockSubmission => "PROCESS_MICROBLOCKSUBMISSION",
            Action::ProcessFinalBlockConsensus => "PROCESS_FINALBLOCKCONSENSUS",
            Action::ProcessViewChangeConsensus => "PROCESS_VIEWCHANGECONSENSUS",
        };
        f.write_str(name)
    }
}

/// Role of this node within the DS committee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Not a committee member; DS messages are rejected.
    Idle,
    /// Committee leader for the current consensus.
    PrimaryDs,
    /// Committee backup.
    BackupDs,
}

/// The action-permission matrix.
///
/// Any `(state, action)` pair not listed here is rejected with a warning
/// and no side effect.
pub fn action_allowed_in(state: DirState, action: Action) -> bool {
    matches!(
        (state, action),
        (DirState::PowSubmission, Action::ProcessPowSubmission)
            | (DirState::PowSubmission, Action::VerifyPow)
            | (DirState::DsBlockConsensus, Action::ProcessDsBlockConsensus)
            | (
                DirState::MicroblockSubmission,
                Action::ProcessMicroblockSubmission
            )
            | (
                DirState::FinalBlockConsensus,
                Action::ProcessFinalBlockConsensus
            )
            | (
                DirState::ViewChangeConsensus,
                Action::ProcessViewChangeConsensus
            )
    )
}

/// The DS phase register.
pub struct StateMachine {
    tx: watch::Sender<DirState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a register starting in [`DirState::PowSubmission`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DirState::PowSubmission);
        kestrel_metrics::directory::DS_STATE.set(DirState::PowSubmission.ordinal() as f64);
        Self { tx }
    }

    /// Current phase.
    pub fn current(&self) -> DirState {
        *self.tx.borrow()
    }

    /// Transition to `next`, logging the transition and waking waiters.
    ///
    /// Setting the current state again is a no-op: nothing is logged and
    /// no waiter is woken.
    pub fn set(&self, next: DirState) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            info!(from = %state, to = %next, "DS state transition");
            *state = next;
            true
        });
        if changed {
            kestrel_metrics::directory::DS_STATE.set(next.ordinal() as f64);
        }
    }

    /// Whether `action` is permitted in the current phase.
    pub fn check_action(&self, action: Action) -> bool {
        action_allowed_in(self.current(), action)
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> watch::Receiver<DirState> {
        self.tx.subscribe()
    }

    /// Wait until the phase equals `target`, bounded by `timeout`.
    ///
    /// Returns `true` if the target phase was observed in time.
    pub async fn wait_for(&self, target: DirState, timeout: Duration) -> bool {
        let mut rx = self.subscribe();
        let result = tokio::time::timeout(timeout, rx.wait_for(|state| *state == target)).await;
        matches!(result, Ok(Ok(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [DirState; 9] = [
        DirState::PowSubmission,
        DirState::DsBlockConsensusPrep,
        DirState::DsBlockConsensus,
        DirState::MicroblockSubmission,
        DirState::FinalBlockConsensusPrep,
        DirState::FinalBlockConsensus,
        DirState::ViewChangeConsensusPrep,
        DirState::ViewChangeConsensus,
        DirState::Error,
    ];

    const ALL_ACTIONS: [Action; 6] = [
        Action::ProcessPowSubmission,
        Action::VerifyPow,
        Action::ProcessDsBlockConsensus,
        Action::ProcessMicroblockSubmission,
        Action::ProcessFinalBlockConsensus,
        Action::ProcessViewChangeConsensus,
    ];

    #[test]
    fn test_permission_matrix_is_exact() {
        let allowed: &[(DirState, Action)] = &[
            (DirState::PowSubmission, Action::ProcessPowSubmission),
            (DirState::PowSubmission, Action::VerifyPow),
            (DirState::DsBlockConsensus, Action::ProcessDsBlockConsensus),
            (
                DirState::MicroblockSubmission,
                Action::ProcessMicroblockSubmission,
            ),
            (
                DirState::FinalBlockConsensus,
                Action::ProcessFinalBlockConsensus,
            ),
            (
                DirState::ViewChangeConsensus,
                Action::ProcessViewChangeConsensus,
            ),
        ];

        for state in ALL_STATES {
            for action in ALL_ACTIONS {
                let expected = allowed.contains(&(state, action));
                assert_eq!(
                    action_allowed_in(state, action),
                    expected,
                    "({state}, {action})"
                );
            }
        }
    }

    #[test]
    fn test_error_state_permits_nothing() {
        for action in ALL_ACTIONS {
            assert!(!action_allowed_in(DirState::Error, action));
        }
    }

    #[tokio::test]
    async fn test_set_is_idempotent() {
        let machine = StateMachine::new();
        let mut rx = machine.subscribe();
        rx.mark_unchanged();

        machine.set(DirState::DsBlockConsensus);
        machine.set(DirState::DsBlockConsensus);

        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();
        // Second identical set produced no further notification.
        assert!(!rx.has_changed().unwrap());
        assert_eq!(machine.current(), DirState::DsBlockConsensus);
    }

    #[tokio::test]
    async fn test_wait_for_observes_transition() {
        let machine = std::sync::Arc::new(StateMachine::new());
        let waiter = {
            let machine = machine.clone();
            tokio::spawn(async move {
                machine
                    .wait_for(DirState::MicroblockSubmission, Duration::from_secs(5))
                    .await
            })
        };
        tokio::task::yield_now().await;
        machine.set(DirState::MicroblockSubmission);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let machine = StateMachine::new();
        assert!(
            !machine
                .wait_for(DirState::Error, Duration::from_millis(10))
                .await
        );
    }
}
