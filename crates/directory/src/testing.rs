//! Scripted collaborators for exercising the directory service.
//!
//! These stubs stand in for the consensus, PoW and lookup seams in unit
//! and integration tests: the consensus engine replays a scripted
//! sequence of outcomes, the PoW verifier accepts everything, and the
//! lookup client serves a canned chain. Production code never uses them.

use crate::consensus::{ConsensusEngine, ConsensusOutcome};
use crate::error::DirectoryError;
use crate::lookup::LookupClient;
use crate::service::DirectoryService;
use crate::state::Mode;
use async_trait::async_trait;
use kestrel_crypto::{PowVerifier, SchnorrKeyPair};
use kestrel_storage::InMemoryStorage;
use kestrel_types::{Hash, Peer, ProtocolConfig, PubKeyBytes};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

/// Protocol constants tightened for fast tests.
pub fn test_protocol() -> ProtocolConfig {
    ProtocolConfig {
        pow_window_in_seconds: 1,
        pow_submission_timeout: 1,
        microblock_timeout: 1,
        consensus_object_timeout: 5,
        viewchange_time: 2,
        new_node_sync_interval: 0,
        committee_size: 4,
        ..ProtocolConfig::default()
    }
}

/// PoW verifier that accepts every solution.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllPow;

impl PowVerifier for AcceptAllPow {
    fn verify(
        &self,
        _block_num: u64,
        _difficulty: u8,
        _rand1: &Hash,
        _rand2: &Hash,
        _src_ip: &IpAddr,
        _pubkey: &PubKeyBytes,
        _nonce: u64,
        _result_hash: &Hash,
        _mix_hash: &Hash,
    ) -> bool {
        true
    }
}

/// One scripted consensus outcome.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Commit the most recently proposed payload.
    CommitProposal,
    /// Report a timeout.
    Timeout,
    /// Report an abort.
    Abort(String),
}

/// Consensus engine replaying a scripted outcome sequence.
///
/// Outcomes are consumed front-to-back; once the script is exhausted the
/// configurable default applies (committing the latest proposal unless
/// overridden).
pub struct ScriptedConsensus {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    fallback: Mutex<ScriptedOutcome>,
    last_proposal: Mutex<Option<Vec<u8>>>,
    proposals: Mutex<Vec<Vec<u8>>>,
}

impl Default for ScriptedConsensus {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedConsensus {
    /// Engine that commits every proposal.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(ScriptedOutcome::CommitProposal),
            last_proposal: Mutex::new(None),
            proposals: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes for the next rounds.
    pub fn script(&self, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.script.lock().extend(outcomes);
    }

    /// Outcome applied once the script is exhausted.
    pub fn default_outcome(&self, outcome: ScriptedOutcome) {
        *self.fallback.lock() = outcome;
    }

    /// Number of proposals received so far.
    pub fn proposal_count(&self) -> usize {
        self.proposals.lock().len()
    }

    /// Copy of all received proposals, oldest first.
    pub fn proposals(&self) -> Vec<Vec<u8>> {
        self.proposals.lock().clone()
    }
}

#[async_trait]
impl ConsensusEngine for ScriptedConsensus {
    async fn propose(&self, payload: Vec<u8>) -> Result<(), DirectoryError> {
        *self.last_proposal.lock() = Some(payload.clone());
        self.proposals.lock().push(payload);
        Ok(())
    }

    async fn on_message(&self, _message: &[u8], _from: &Peer) -> bool {
        true
    }

    async fn wait_outcome(&self, _timeout: Duration) -> ConsensusOutcome {
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone());
        match next {
            ScriptedOutcome::CommitProposal => {
                ConsensusOutcome::Commit(self.last_proposal.lock().clone().unwrap_or_default())
            }
            ScriptedOutcome::Timeout => {
                // Pace scripted timeouts so retry loops do not spin.
                tokio::time::sleep(Duration::from_millis(10)).await;
                ConsensusOutcome::Timeout
            }
            ScriptedOutcome::Abort(reason) => ConsensusOutcome::Abort(reason),
        }
    }
}

/// Lookup client serving one canned batch of DS and Tx blocks.
pub struct ScriptedLookup {
    ds_blocks: Mutex<Option<Vec<Vec<u8>>>>,
    tx_blocks: Mutex<Option<Vec<Vec<u8>>>>,
}

impl ScriptedLookup {
    /// Serve `ds_blocks` and `tx_blocks` on the first fetch, nothing
    /// afterwards.
    pub fn new(ds_blocks: Vec<Vec<u8>>, tx_blocks: Vec<Vec<u8>>) -> Self {
        Self {
            ds_blocks: Mutex::new(Some(ds_blocks)),
            tx_blocks: Mutex::new(Some(tx_blocks)),
        }
    }
}

#[async_trait]
impl LookupClient for ScriptedLookup {
    async fn fetch_offline_lookups(&self) {}

    async fn wait_offline_lookups(&self, _timeout: Duration) -> bool {
        true
    }

    async fn fetch_ds_info(&self) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn fetch_ds_blocks_from(&self, _block_num: u64) -> Result<Vec<Vec<u8>>, DirectoryError> {
        Ok(self.ds_blocks.lock().take().unwrap_or_default())
    }

    async fn fetch_tx_blocks_from(&self, _block_num: u64) -> Result<Vec<Vec<u8>>, DirectoryError> {
        Ok(self.tx_blocks.lock().take().unwrap_or_default())
    }

    async fn send_to_lookups(&self, _message: Vec<u8>) {}
}

/// Knobs for [`build_service`].
pub struct TestServiceConfig {
    /// Protocol constants (defaults to [`test_protocol`]).
    pub protocol: ProtocolConfig,
    /// PoW verifier seam (defaults to [`AcceptAllPow`]).
    pub pow_verifier: Arc<dyn PowVerifier>,
    /// Consensus seam.
    pub consensus: Arc<ScriptedConsensus>,
    /// Lookup seam.
    pub lookup: Arc<dyn LookupClient>,
    /// Storage, kept accessible to the test.
    pub storage: Arc<InMemoryStorage>,
}

impl Default for TestServiceConfig {
    fn default() -> Self {
        Self {
            protocol: test_protocol(),
            pow_verifier: Arc::new(AcceptAllPow),
            consensus: Arc::new(ScriptedConsensus::new()),
            lookup: Arc::new(crate::lookup::StaticLookup),
            storage: Arc::new(InMemoryStorage::new()),
        }
    }
}

/// Build a bootstrapped single-member service: this node is the whole
/// committee and the primary, so handlers pass the mode gate.
pub fn build_service(config: TestServiceConfig) -> (Arc<DirectoryService>, Arc<ScriptedConsensus>) {
    let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
    let self_peer = Peer::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 4201);
    let consensus = config.consensus.clone();

    let service = Arc::new(DirectoryService::new(
        config.protocol,
        keypair,
        self_peer,
        Vec::new(),
        config.storage,
        config.pow_verifier,
        consensus.clone(),
        config.lookup,
    ));

    service
        .committee()
        .bootstrap(vec![(service.self_pubkey(), self_peer)], 1);
    service.set_mode(Mode::PrimaryDs);

    (service, consensus)
}
