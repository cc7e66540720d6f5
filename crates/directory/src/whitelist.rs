//! Testnet DS whitelist.
//!
//! On test networks, PoW admission is restricted to a pre-registered set
//! of `(peer, public key)` pairs. The check is a no-op on mainnet
//! deployments (`test_net_mode` off).

use kestrel_types::{Peer, PubKeyBytes};
use parking_lot::RwLock;
use std::collections::HashSet;

/// Registered `(peer, pubkey)` pairs allowed to submit DS PoW.
#[derive(Default)]
pub struct DsWhitelist {
    entries: RwLock<HashSet<(Peer, PubKeyBytes)>>,
}

impl DsWhitelist {
    /// Create an empty whitelist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a submitter.
    pub fn insert(&self, peer: Peer, pubkey: PubKeyBytes) {
        self.entries.write().insert((peer, pubkey));
    }

    /// Whether the submitter is registered.
    pub fn contains(&self, peer: &Peer, pubkey: &PubKeyBytes) -> bool {
        self.entries.read().contains(&(*peer, *pubkey))
    }

    /// Number of registered submitters.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the whitelist is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_insert_and_contains() {
        let whitelist = DsWhitelist::new();
        let peer = Peer::new(IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)), 9000);
        let pubkey = PubKeyBytes::from_bytes([0x02; 33]);

        assert!(whitelist.is_empty());
        assert!(!whitelist.contains(&peer, &pubkey));

        whitelist.insert(peer, pubkey);
        assert!(whitelist.contains(&peer, &pubkey));
        assert_eq!(whitelist.len(), 1);

        // Same key from a different endpoint is a different entry.
        let other_peer = Peer::new(IpAddr::V4(Ipv4Addr::new(5, 6, 7, 9)), 9000);
        assert!(!whitelist.contains(&other_peer, &pubkey));
    }
}
