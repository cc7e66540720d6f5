//! The directory service itself.
//!
//! [`DirectoryService`] owns the epoch state machine and all shared
//! committee/PoW state, and holds the collaborator seams (consensus,
//! PoW verifier, storage, lookup client). Handlers run on network worker
//! tasks; the epoch driver and the resync controller run as supervised
//! tasks over the same instance.

use crate::chain::ChainHead;
use crate::committee::Committee;
use crate::consensus::ConsensusEngine;
use crate::lookup::LookupClient;
use crate::pow_pool::PowPool;
use crate::resync::SyncHandle;
use crate::state::{Action, DirState, Mode, StateMachine};
use crate::whitelist::DsWhitelist;
use crate::wire;
use kestrel_crypto::{PowVerifier, SchnorrKeyPair};
use kestrel_storage::BlockStorage;
use kestrel_types::{DsBlock, Microblock, Peer, ProtocolConfig, PubKeyBytes};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// The DS node core.
pub struct DirectoryService {
    pub(crate) cfg: ProtocolConfig,
    pub(crate) keypair: SchnorrKeyPair,
    pub(crate) self_pubkey: PubKeyBytes,
    pub(crate) self_peer: Peer,
    /// Peers expected in the bootstrap committee (including this node).
    bootstrap_peers: Vec<(PubKeyBytes, Peer)>,

    pub(crate) state: StateMachine,
    mode: watch::Sender<Mode>,
    pub(crate) committee: Committee,
    pub(crate) pow_pool: PowPool,
    pub(crate) chain: ChainHead,
    pub(crate) microblocks: Mutex<Vec<Microblock>>,
    pub(crate) pending_ds_block: Mutex<Option<DsBlock>>,
    pub(crate) view_change_counter: AtomicU32,
    /// Active-node estimate fed into difficulty adjustment; refreshed at
    /// each DS-block commit from the epoch's admitted submitter count.
    pub(crate) active_node_count: AtomicI64,
    pub(crate) sync: SyncHandle,
    pub(crate) whitelist: DsWhitelist,

    pub(crate) storage: Arc<dyn BlockStorage>,
    pub(crate) pow_verifier: Arc<dyn PowVerifier>,
    pub(crate) consensus: Arc<dyn ConsensusEngine>,
    pub(crate) lookup: Arc<dyn LookupClient>,
}

impl DirectoryService {
    /// Construct a DS node core.
    ///
    /// The node starts in [`DirState::PowSubmission`] with mode
    /// [`Mode::Idle`]; it only acts on DS messages once
    /// `ProcessSetPrimary` has installed the committee.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: ProtocolConfig,
        keypair: SchnorrKeyPair,
        self_peer: Peer,
        bootstrap_peers: Vec<(PubKeyBytes, Peer)>,
        storage: Arc<dyn BlockStorage>,
        pow_verifier: Arc<dyn PowVerifier>,
        consensus: Arc<dyn ConsensusEngine>,
        lookup: Arc<dyn LookupClient>,
    ) -> Self {
        let (mode, _) = watch::channel(Mode::Idle);
        let self_pubkey = keypair.public_key.to_pubkey_bytes();
        Self {
            state: StateMachine::new(),
            mode,
            committee: Committee::new(cfg.committee_size),
            pow_pool: PowPool::new(cfg.pow_submission_limit),
            chain: ChainHead::new(&cfg),
            microblocks: Mutex::new(Vec::new()),
            pending_ds_block: Mutex::new(None),
            view_change_counter: AtomicU32::new(0),
            active_node_count: AtomicI64::new(0),
            sync: SyncHandle::new(),
            whitelist: DsWhitelist::new(),
            cfg,
            keypair,
            self_pubkey,
            self_peer,
            bootstrap_peers,
            storage,
            pow_verifier,
            consensus,
            lookup,
        }
    }

    /// Protocol configuration snapshot.
    pub fn config(&self) -> &ProtocolConfig {
        &self.cfg
    }

    /// This node's key pair, for collaborators that sign on its behalf.
    pub fn keypair(&self) -> &SchnorrKeyPair {
        &self.keypair
    }

    /// This node's public key in wire form.
    pub fn self_pubkey(&self) -> PubKeyBytes {
        self.self_pubkey
    }

    /// This node's own endpoint.
    pub fn self_peer(&self) -> Peer {
        self.self_peer
    }

    /// Current DS phase.
    pub fn current_state(&self) -> DirState {
        self.state.current()
    }

    /// Subscribe to DS phase changes.
    pub fn state_watch(&self) -> tokio::sync::watch::Receiver<DirState> {
        self.state.subscribe()
    }

    /// Transition the DS phase.
    pub fn set_state(&self, state: DirState) {
        self.state.set(state);
    }

    /// Current node mode.
    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    /// Change the node mode.
    pub fn set_mode(&self, mode: Mode) {
        self.mode.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            info!(from = ?current, to = ?mode, "DS mode change");
            *current = mode;
            true
        });
    }

    /// Subscribe to mode changes (used by the epoch driver to wait out
    /// the bootstrap).
    pub(crate) fn mode_watch(&self) -> watch::Receiver<Mode> {
        self.mode.subscribe()
    }

    /// The committee registry.
    pub fn committee(&self) -> &Committee {
        &self.committee
    }

    /// The PoW submission pool.
    pub fn pow_pool(&self) -> &PowPool {
        &self.pow_pool
    }

    /// The chain head.
    pub fn chain(&self) -> &ChainHead {
        &self.chain
    }

    /// The sync-mode register.
    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// The testnet whitelist.
    pub fn whitelist(&self) -> &DsWhitelist {
        &self.whitelist
    }

    /// Current view-change counter.
    pub fn view_change_count(&self) -> u32 {
        self.view_change_counter.load(Ordering::SeqCst)
    }

    /// This node's consensus index, if it is a committee member.
    pub fn my_consensus_id(&self) -> Option<usize> {
        self.committee.consensus_index(&self.self_pubkey)
    }

    /// Whether this node currently leads the committee.
    pub fn is_leader(&self) -> bool {
        !self.committee.is_empty() && self.my_consensus_id() == Some(self.committee.leader_id())
    }

    /// Gate an action against the current mode and phase.
    ///
    /// Lookup nodes never run this state machine and pass trivially;
    /// idle nodes reject everything addressed to the DS role.
    pub fn check_action(&self, action: Action) -> bool {
        if self.cfg.lookup_node_mode {
            warn!("DS action check not expected on a lookup node");
            return true;
        }
        if self.mode() == Mode::Idle {
            warn!(%action, "not a DS node; rejecting DS action");
            return false;
        }
        let allowed = self.state.check_action(action);
        if !allowed {
            warn!(
                %action,
                state = %self.state.current(),
                "action not allowed in current state"
            );
        }
        allowed
    }

    /// Reset all per-epoch collectors: the four PoW maps, the microblock
    /// buffer, the pending DS block and the view-change counter.
    pub fn clean_variables(&self) {
        self.pow_pool.clean();
        self.microblocks.lock().clear();
        *self.pending_ds_block.lock() = None;
        self.view_change_counter.store(0, Ordering::SeqCst);
    }

    /// Bootstrap handler (`SetPrimary`, opcode 0).
    ///
    /// The message carries the bootstrap leader's endpoint. Comparing it
    /// against this node's own endpoint decides primary versus backup
    /// mode; the pre-shared bootstrap peer list (sorted by public key)
    /// becomes the initial committee and this node's position in it
    /// becomes its consensus index.
    pub async fn process_set_primary(&self, message: &[u8], offset: usize, _from: &Peer) -> bool {
        if self.cfg.lookup_node_mode {
            warn!("ProcessSetPrimary not expected on a lookup node");
            return true;
        }

        let Some((primary, _)) = Peer::decode(message, offset) else {
            warn!("failed to deserialize bootstrap leader peer");
            return false;
        };

        let epoch = self.chain.snapshot().epoch;
        if primary == self.self_peer {
            info!(epoch, "I am the DS committee leader");
            self.set_mode(Mode::PrimaryDs);
        } else {
            info!(epoch, leader = %primary, me = %self.self_peer, "I am a DS committee backup");
            self.set_mode(Mode::BackupDs);
        }

        let mut entries = self.bootstrap_peers.clone();
        entries.push((self.self_pubkey, self.self_peer));
        self.committee.bootstrap(entries, epoch);
        self.committee.set_leader(0);

        match self.my_consensus_id() {
            Some(id) => info!(epoch, consensus_id = id, "my node ID for this PoW consensus"),
            None => {
                warn!("own public key missing from bootstrap committee");
                return false;
            }
        }

        // The bootstrap leader announces the committee to the lookups.
        if self.mode() == Mode::PrimaryDs {
            let members: Vec<_> = self
                .committee
                .members()
                .into_iter()
                .map(|m| (m.pubkey, m.peer))
                .collect();
            self.lookup
                .send_to_lookups(wire::encode_ds_info_from_seed(&members))
                .await;
            info!(me = %self.self_peer, "[IDENT] DSLD");
        } else {
            info!(me = %self.self_peer, id = ?self.my_consensus_id(), "[IDENT] DSBK");
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_service, TestServiceConfig};
    use kestrel_types::{Hash, Microblock};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_clean_variables_resets_epoch_state() {
        let (service, _) = build_service(TestServiceConfig::default());

        let pubkey = PubKeyBytes::from_bytes([0x02; 33]);
        let peer = Peer::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 9000);
        service
            .pow_pool()
            .record(pubkey, peer, Hash::compute(b"soln"), true);
        service.microblocks.lock().push(Microblock {
            shard_id: 0,
            block_num: 1,
            tx_root: Hash::ZERO,
        });
        *service.pending_ds_block.lock() = Some(service.compose_ds_block());
        service.view_change_counter.store(3, Ordering::SeqCst);

        service.clean_variables();

        assert_eq!(service.pow_pool().all_pow_count(), 0);
        assert_eq!(service.pow_pool().ds_pow_count(), 0);
        assert_eq!(service.pow_pool().submission_count(&pubkey), 0);
        assert!(service.microblocks.lock().is_empty());
        assert!(service.pending_ds_block.lock().is_none());
        assert_eq!(service.view_change_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_mode_rejects_ds_actions() {
        let (service, _) = build_service(TestServiceConfig::default());
        service.set_mode(Mode::Idle);
        assert!(!service.check_action(Action::ProcessPowSubmission));

        service.set_mode(Mode::BackupDs);
        assert!(service.check_action(Action::ProcessPowSubmission));
    }

    #[tokio::test]
    async fn test_set_primary_elects_self_as_leader() {
        let (service, _) = build_service(TestServiceConfig::default());
        service.set_mode(Mode::Idle);

        let mut message = vec![0u8];
        service.self_peer().encode_to(&mut message);
        assert!(service.process_set_primary(&message, 1, &service.self_peer()).await);

        assert_eq!(service.mode(), Mode::PrimaryDs);
        assert_eq!(service.my_consensus_id(), Some(0));
        assert!(service.is_leader());
    }

    #[tokio::test]
    async fn test_set_primary_backup_when_leader_is_remote() {
        let (service, _) = build_service(TestServiceConfig::default());
        service.set_mode(Mode::Idle);

        let leader = Peer::new(IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)), 4300);
        let mut message = vec![0u8];
        leader.encode_to(&mut message);
        assert!(service.process_set_primary(&message, 1, &leader).await);
        assert_eq!(service.mode(), Mode::BackupDs);

        // Truncated peer field is rejected.
        assert!(!service.process_set_primary(&message[..5], 1, &leader).await);
    }
}
