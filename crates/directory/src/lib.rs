//! Directory-service node core.
//!
//! A DS committee is a small rotating group of nodes coordinating
//! network-wide consensus: it admits new nodes via PoW, produces DS
//! blocks, aggregates shard microblocks into final blocks, and recovers
//! from leader failures via view changes. This crate implements the DS
//! node's epoch state machine and PoW-admission engine:
//!
//! - [`state`] — the DS phase register and its action-permission matrix
//! - [`committee`] — the sorted committee registry and leader rotation
//! - [`pow_pool`] — concurrent collectors for PoW submissions
//! - [`difficulty`] — the adaptive difficulty controller
//! - [`intake`] — the PoW submission verification pipeline
//! - [`dispatch`] — opcode demultiplexing onto stateful handlers
//! - [`driver`] — the per-epoch sequencing task
//! - [`view_change`] — leader-failure recovery
//! - [`resync`] — catch-up after falling behind
//!
//! Consensus, PoW hashing, persistence and the transport are external
//! collaborators behind the [`consensus::ConsensusEngine`],
//! [`kestrel_crypto::PowVerifier`], [`kestrel_storage::BlockStorage`] and
//! [`lookup::LookupClient`] seams.
//!
//! # Lock hierarchy
//!
//! Shared state is guarded by `parking_lot` locks acquired in a fixed
//! order: PoW records → submission counter → committee roster → chain
//! head. No lock is held across an `.await`; the state register itself is
//! a `tokio::sync::watch` channel so waiters are woken without a lock.

pub mod chain;
pub mod committee;
pub mod consensus;
pub mod difficulty;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod intake;
pub mod lookup;
pub mod pow_pool;
pub mod resync;
pub mod service;
pub mod state;
pub mod testing;
pub mod view_change;
pub mod whitelist;
pub mod wire;

pub use chain::{ChainHead, ChainHeadState};
pub use committee::{Committee, CommitteeMember};
pub use consensus::{ConsensusEngine, ConsensusOutcome, LoopbackConsensus};
pub use difficulty::next_difficulty;
pub use error::{DirectoryError, PowRejection};
pub use lookup::{LookupClient, StaticLookup};
pub use pow_pool::PowPool;
pub use resync::SyncHandle;
pub use service::DirectoryService;
pub use state::{Action, DirState, Mode, StateMachine};
pub use whitelist::DsWhitelist;
pub use wire::{DsInstruction, PowSubmission};
