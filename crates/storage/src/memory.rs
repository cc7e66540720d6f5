//! In-memory implementation of [`BlockStorage`].
//!
//! All tables live under a single `parking_lot::Mutex`: every operation
//! touches exactly one lock, so there is no lock-ordering concern and
//! multi-table operations (window rotation, resets) are atomic with
//! respect to readers.

use crate::blocks::{BlockStorage, DbType, MetaType};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use kestrel_types::Hash;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// One per-epoch transaction-body database.
struct TxBodyDb {
    epoch: u64,
    bodies: HashMap<Hash, Vec<u8>>,
}

/// All tables, grouped under one lock.
#[derive(Default)]
struct Tables {
    ds_blocks: BTreeMap<u64, Vec<u8>>,
    tx_blocks: BTreeMap<u64, Vec<u8>>,
    tx_body_window: VecDeque<TxBodyDb>,
    metadata: HashMap<MetaType, Vec<u8>>,
}

/// In-memory block storage.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Epochs currently present in the rolling window, oldest first.
    pub fn tx_body_epochs(&self) -> Vec<u64> {
        self.tables
            .lock()
            .tx_body_window
            .iter()
            .map(|db| db.epoch)
            .collect()
    }
}

#[async_trait]
impl BlockStorage for InMemoryStorage {
    async fn put_ds_block(&self, block_num: u64, bytes: Vec<u8>) -> StorageResult<()> {
        self.tables.lock().ds_blocks.insert(block_num, bytes);
        Ok(())
    }

    async fn get_ds_block(&self, block_num: u64) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tables.lock().ds_blocks.get(&block_num).cloned())
    }

    async fn delete_ds_block(&self, block_num: u64) -> StorageResult<()> {
        self.tables.lock().ds_blocks.remove(&block_num);
        Ok(())
    }

    async fn put_tx_block(&self, block_num: u64, bytes: Vec<u8>) -> StorageResult<()> {
        self.tables.lock().tx_blocks.insert(block_num, bytes);
        Ok(())
    }

    async fn get_tx_block(&self, block_num: u64) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tables.lock().tx_blocks.get(&block_num).cloned())
    }

    async fn delete_tx_block(&self, block_num: u64) -> StorageResult<()> {
        self.tables.lock().tx_blocks.remove(&block_num);
        Ok(())
    }

    async fn put_tx_body(&self, hash: Hash, bytes: Vec<u8>) -> StorageResult<()> {
        let mut tables = self.tables.lock();
        let db = tables
            .tx_body_window
            .back_mut()
            .ok_or(StorageError::EmptyTxBodyWindow)?;
        db.bodies.insert(hash, bytes);
        Ok(())
    }

    async fn get_tx_body(&self, hash: Hash) -> StorageResult<Option<Vec<u8>>> {
        let tables = self.tables.lock();
        for db in tables.tx_body_window.iter().rev() {
            if let Some(bytes) = db.bodies.get(&hash) {
                return Ok(Some(bytes.clone()));
            }
        }
        Ok(None)
    }

    async fn delete_tx_body(&self, hash: Hash) -> StorageResult<()> {
        let mut tables = self.tables.lock();
        for db in tables.tx_body_window.iter_mut() {
            db.bodies.remove(&hash);
        }
        Ok(())
    }

    async fn push_back_tx_body_db(&self, epoch: u64) -> StorageResult<()> {
        self.tables.lock().tx_body_window.push_back(TxBodyDb {
            epoch,
            bodies: HashMap::new(),
        });
        Ok(())
    }

    async fn pop_front_tx_body_db(&self, mandatory: bool) -> StorageResult<()> {
        let mut tables = self.tables.lock();
        match tables.tx_body_window.pop_front() {
            Some(_) => Ok(()),
            None if mandatory => Err(StorageError::EmptyTxBodyWindow),
            None => Ok(()),
        }
    }

    async fn tx_body_db_count(&self) -> StorageResult<usize> {
        Ok(self.tables.lock().tx_body_window.len())
    }

    async fn put_metadata(&self, meta: MetaType, bytes: Vec<u8>) -> StorageResult<()> {
        self.tables.lock().metadata.insert(meta, bytes);
        Ok(())
    }

    async fn get_metadata(&self, meta: MetaType) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tables.lock().metadata.get(&meta).cloned())
    }

    async fn list_ds_blocks(&self) -> StorageResult<Vec<(u64, Vec<u8>)>> {
        Ok(self
            .tables
            .lock()
            .ds_blocks
            .iter()
            .map(|(num, bytes)| (*num, bytes.clone()))
            .collect())
    }

    async fn list_tx_blocks(&self) -> StorageResult<Vec<(u64, Vec<u8>)>> {
        Ok(self
            .tables
            .lock()
            .tx_blocks
            .iter()
            .map(|(num, bytes)| (*num, bytes.clone()))
            .collect())
    }

    async fn reset_db(&self, db: DbType) -> StorageResult<()> {
        let mut tables = self.tables.lock();
        match db {
            DbType::Meta => tables.metadata.clear(),
            DbType::DsBlock => tables.ds_blocks.clear(),
            DbType::TxBlock => tables.tx_blocks.clear(),
            DbType::TxBodies => tables.tx_body_window.clear(),
        }
        Ok(())
    }

    async fn reset_all(&self) -> StorageResult<()> {
        *self.tables.lock() = Tables::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ds_block_put_get_delete() {
        let store = InMemoryStorage::new();
        store.put_ds_block(1, vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get_ds_block(1).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.get_ds_block(2).await.unwrap(), None);

        store.delete_ds_block(1).await.unwrap();
        assert_eq!(store.get_ds_block(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_blocks_ordered() {
        let store = InMemoryStorage::new();
        store.put_tx_block(3, vec![3]).await.unwrap();
        store.put_tx_block(1, vec![1]).await.unwrap();
        store.put_tx_block(2, vec![2]).await.unwrap();

        let nums: Vec<u64> = store
            .list_tx_blocks()
            .await
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(nums, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_tx_body_requires_open_window() {
        let store = InMemoryStorage::new();
        let hash = Hash::compute(b"tx");
        assert_eq!(
            store.put_tx_body(hash, vec![0]).await.unwrap_err(),
            StorageError::EmptyTxBodyWindow
        );

        store.push_back_tx_body_db(1).await.unwrap();
        store.put_tx_body(hash, vec![0xaa]).await.unwrap();
        assert_eq!(store.get_tx_body(hash).await.unwrap(), Some(vec![0xaa]));
    }

    #[tokio::test]
    async fn test_rolling_window_pop() {
        let store = InMemoryStorage::new();
        let hash = Hash::compute(b"old tx");

        store.push_back_tx_body_db(1).await.unwrap();
        store.put_tx_body(hash, vec![1]).await.unwrap();
        store.push_back_tx_body_db(2).await.unwrap();
        assert_eq!(store.tx_body_db_count().await.unwrap(), 2);
        assert_eq!(store.tx_body_epochs(), vec![1, 2]);

        // Body written into epoch 1 is still reachable across the window.
        assert_eq!(store.get_tx_body(hash).await.unwrap(), Some(vec![1]));

        store.pop_front_tx_body_db(true).await.unwrap();
        assert_eq!(store.tx_body_epochs(), vec![2]);
        assert_eq!(store.get_tx_body(hash).await.unwrap(), None);

        store.pop_front_tx_body_db(false).await.unwrap();
        assert_eq!(
            store.pop_front_tx_body_db(true).await.unwrap_err(),
            StorageError::EmptyTxBodyWindow
        );
    }

    #[tokio::test]
    async fn test_metadata_and_resets() {
        let store = InMemoryStorage::new();
        store
            .put_metadata(MetaType::LatestActiveDsBlockNum, 7u64.to_be_bytes().to_vec())
            .await
            .unwrap();
        assert!(store
            .get_metadata(MetaType::LatestActiveDsBlockNum)
            .await
            .unwrap()
            .is_some());
        assert!(store.get_metadata(MetaType::StateRoot).await.unwrap().is_none());

        store.put_ds_block(1, vec![1]).await.unwrap();
        store.reset_db(DbType::DsBlock).await.unwrap();
        assert_eq!(store.get_ds_block(1).await.unwrap(), None);
        assert!(store
            .get_metadata(MetaType::LatestActiveDsBlockNum)
            .await
            .unwrap()
            .is_some());

        store.reset_all().await.unwrap();
        assert!(store
            .get_metadata(MetaType::LatestActiveDsBlockNum)
            .await
            .unwrap()
            .is_none());
    }
}
