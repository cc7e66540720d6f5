//! Node configuration.

use anyhow::Context;
use kestrel_crypto::{SchnorrKeyPair, SchnorrSecretKey};
use kestrel_types::{Peer, ProtocolConfig, PubKeyBytes};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// A bootstrap committee member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapPeer {
    /// Compressed public key, hex encoded (33 bytes).
    pub pubkey_hex: String,
    /// DS listen address.
    pub addr: SocketAddr,
}

impl BootstrapPeer {
    /// Parse into the directory-service representation.
    pub fn parse(&self) -> anyhow::Result<(PubKeyBytes, Peer)> {
        let bytes = hex::decode(&self.pubkey_hex).context("invalid bootstrap pubkey hex")?;
        let arr: [u8; 33] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("bootstrap pubkey must be 33 bytes"))?;
        Ok((
            PubKeyBytes::from_bytes(arr),
            Peer::new(self.addr.ip(), self.addr.port()),
        ))
    }
}

/// Node configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// DS listen address of this node.
    pub listen: SocketAddr,
    /// Schnorr secret key, hex encoded (32 bytes).
    pub secret_key_hex: String,
    /// Endpoint of the bootstrap committee leader.
    pub primary: SocketAddr,
    /// The other bootstrap committee members.
    pub peers: Vec<BootstrapPeer>,
    /// Lookup node addresses (may be empty).
    pub lookups: Vec<SocketAddr>,
    /// Protocol constants.
    pub protocol: ProtocolConfig,
}

impl NodeConfig {
    /// Generate a single-node test configuration.
    pub fn for_local_test(index: usize) -> Self {
        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let port = 4201 + index as u16 * 10;
        let listen: SocketAddr = format!("127.0.0.1:{port}")
            .parse()
            .expect("loopback address parses");
        Self {
            listen,
            secret_key_hex: hex::encode(keypair.secret_key.to_bytes()),
            primary: listen,
            peers: Vec::new(),
            lookups: Vec::new(),
            protocol: ProtocolConfig::default(),
        }
    }

    /// This node's key pair.
    pub fn keypair(&self) -> anyhow::Result<SchnorrKeyPair> {
        let bytes = hex::decode(&self.secret_key_hex).context("invalid secret key hex")?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("secret key must be 32 bytes"))?;
        let secret = SchnorrSecretKey::from_bytes(&arr)
            .map_err(|err| anyhow::anyhow!("invalid secret key: {err}"))?;
        Ok(SchnorrKeyPair::from_secret_key(secret))
    }

    /// This node's own peer descriptor.
    pub fn self_peer(&self) -> Peer {
        Peer::new(self.listen.ip(), self.listen.port())
    }

    /// The bootstrap leader's peer descriptor.
    pub fn primary_peer(&self) -> Peer {
        Peer::new(self.primary.ip(), self.primary.port())
    }

    /// Parse the bootstrap peer list.
    pub fn bootstrap_peers(&self) -> anyhow::Result<Vec<(PubKeyBytes, Peer)>> {
        self.peers.iter().map(|peer| peer.parse()).collect()
    }

    /// Save to a JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}
