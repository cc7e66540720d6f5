//! Core types for the Kestrel directory service.
//!
//! This crate provides the fundamental data structures shared by every
//! Kestrel component: hashes, peer descriptors, public-key bytes, the
//! DS / Tx / micro block types, the sync-mode register, and the frozen
//! protocol-constants snapshot.

#![deny(missing_docs)]

pub mod block;
pub mod config;
pub mod hash;
pub mod keys;
pub mod peer;
pub mod sync;

pub use block::{DecodeError, DsBlock, DsBlockHeader, Microblock, TxBlock, TxBlockHeader};
pub use config::ProtocolConfig;
pub use hash::Hash;
pub use keys::PubKeyBytes;
pub use peer::Peer;
pub use sync::SyncType;
