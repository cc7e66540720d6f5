//! Persistent block storage for the Kestrel directory service.
//!
//! The directory service treats storage as an external collaborator: a
//! typed key/value surface for DS blocks, Tx blocks and transaction
//! bodies, plus a rolling window of per-epoch transaction-body databases
//! and a small metadata table.
//!
//! [`BlockStorage`] is the trait the node programs against;
//! [`InMemoryStorage`] is the in-process implementation used by tests and
//! single-node deployments. Durable backends implement the same trait.

pub mod blocks;
pub mod error;
pub mod memory;

pub use blocks::{BlockStorage, DbType, MetaType};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
