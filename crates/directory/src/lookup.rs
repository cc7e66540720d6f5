//! The lookup-node collaborator seam.
//!
//! Lookup nodes are full-history archive nodes. The resync controller
//! pulls missing blocks from them, and the bootstrap leader pushes the
//! initial committee to them. The transport details live behind this
//! trait.

use crate::error::DirectoryError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Client for talking to the lookup nodes.
#[async_trait]
pub trait LookupClient: Send + Sync {
    /// Kick off discovery of currently-offline lookup addresses.
    async fn fetch_offline_lookups(&self);

    /// Wait until lookup addresses are available, bounded by `timeout`.
    /// Returns `false` on timeout.
    async fn wait_offline_lookups(&self, timeout: Duration) -> bool;

    /// Fetch the current DS committee from a lookup.
    async fn fetch_ds_info(&self) -> Result<(), DirectoryError>;

    /// Fetch DS blocks starting at `block_num`, encoded. An empty vector
    /// means the lookup has nothing newer.
    async fn fetch_ds_blocks_from(&self, block_num: u64) -> Result<Vec<Vec<u8>>, DirectoryError>;

    /// Fetch Tx blocks starting at `block_num`, encoded.
    async fn fetch_tx_blocks_from(&self, block_num: u64) -> Result<Vec<Vec<u8>>, DirectoryError>;

    /// Send a message to all lookup nodes.
    async fn send_to_lookups(&self, message: Vec<u8>);
}

/// Lookup client for deployments without lookup nodes.
///
/// Discovery succeeds immediately and every fetch returns empty, so a
/// resync against it terminates at once with the local chain unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticLookup;

#[async_trait]
impl LookupClient for StaticLookup {
    async fn fetch_offline_lookups(&self) {}

    async fn wait_offline_lookups(&self, _timeout: Duration) -> bool {
        true
    }

    async fn fetch_ds_info(&self) -> Result<(), DirectoryError> {
        Ok(())
    }

    async fn fetch_ds_blocks_from(&self, _block_num: u64) -> Result<Vec<Vec<u8>>, DirectoryError> {
        Ok(Vec::new())
    }

    async fn fetch_tx_blocks_from(&self, _block_num: u64) -> Result<Vec<Vec<u8>>, DirectoryError> {
        Ok(Vec::new())
    }

    async fn send_to_lookups(&self, message: Vec<u8>) {
        debug!(len = message.len(), "no lookup nodes configured; dropping message");
    }
}
