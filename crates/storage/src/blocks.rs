//! The block-storage trait.

use crate::error::StorageResult;
use async_trait::async_trait;
use kestrel_types::Hash;

/// Metadata keys persisted alongside the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaType {
    /// Last persisted state-trie root.
    StateRoot,
    /// Flag set while a DS epoch is mid-flight (crash-recovery marker).
    DsIncompleted,
    /// Highest DS block number this node has fully processed.
    LatestActiveDsBlockNum,
}

/// Database selector for targeted resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    /// Metadata table.
    Meta,
    /// DS block database.
    DsBlock,
    /// Tx block database.
    TxBlock,
    /// The rolling transaction-body window.
    TxBodies,
}

/// Typed key/value storage surface for blocks and transaction bodies.
///
/// Implementations must be `Send + Sync`; the epoch driver, the resync
/// controller and the dispatcher handlers all hold the same instance.
/// `get_*` operations return `Ok(None)` for missing keys; errors are
/// reserved for backend failures.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    /// Store a DS block by number.
    async fn put_ds_block(&self, block_num: u64, bytes: Vec<u8>) -> StorageResult<()>;

    /// Retrieve a DS block by number.
    async fn get_ds_block(&self, block_num: u64) -> StorageResult<Option<Vec<u8>>>;

    /// Delete a DS block by number.
    async fn delete_ds_block(&self, block_num: u64) -> StorageResult<()>;

    /// Store a Tx block by number.
    async fn put_tx_block(&self, block_num: u64, bytes: Vec<u8>) -> StorageResult<()>;

    /// Retrieve a Tx block by number.
    async fn get_tx_block(&self, block_num: u64) -> StorageResult<Option<Vec<u8>>>;

    /// Delete a Tx block by number.
    async fn delete_tx_block(&self, block_num: u64) -> StorageResult<()>;

    /// Store a transaction body in the newest epoch database.
    async fn put_tx_body(&self, hash: Hash, bytes: Vec<u8>) -> StorageResult<()>;

    /// Retrieve a transaction body, searching the whole window.
    async fn get_tx_body(&self, hash: Hash) -> StorageResult<Option<Vec<u8>>>;

    /// Delete a transaction body from the whole window.
    async fn delete_tx_body(&self, hash: Hash) -> StorageResult<()>;

    /// Open a fresh transaction-body database for `epoch` at the back of
    /// the rolling window.
    async fn push_back_tx_body_db(&self, epoch: u64) -> StorageResult<()>;

    /// Drop the oldest transaction-body database. When `mandatory` is
    /// false the pop is skipped (with `Ok`) if the window is empty;
    /// when true an empty window is an error.
    async fn pop_front_tx_body_db(&self, mandatory: bool) -> StorageResult<()>;

    /// Number of databases currently in the rolling window.
    async fn tx_body_db_count(&self) -> StorageResult<usize>;

    /// Store a metadata entry.
    async fn put_metadata(&self, meta: MetaType, bytes: Vec<u8>) -> StorageResult<()>;

    /// Retrieve a metadata entry.
    async fn get_metadata(&self, meta: MetaType) -> StorageResult<Option<Vec<u8>>>;

    /// All DS blocks, ordered by block number.
    async fn list_ds_blocks(&self) -> StorageResult<Vec<(u64, Vec<u8>)>>;

    /// All Tx blocks, ordered by block number.
    async fn list_tx_blocks(&self) -> StorageResult<Vec<(u64, Vec<u8>)>>;

    /// Clear one database.
    async fn reset_db(&self, db: DbType) -> StorageResult<()>;

    /// Clear everything.
    async fn reset_all(&self) -> StorageResult<()>;
}
