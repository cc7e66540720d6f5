//! Raw public-key bytes.
//!
//! The directory service orders its committee by public key and keys its
//! PoW pools by public key, but it never needs curve arithmetic for that.
//! `PubKeyBytes` is the 33-byte compressed-SEC1 representation used as a
//! map key and wire field; `kestrel-crypto` converts it to a checked curve
//! point when a signature actually has to be verified.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compressed secp256k1 public key bytes (33 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PubKeyBytes(#[serde(with = "hex_array")] pub [u8; 33]);

impl PubKeyBytes {
    /// Wire size in bytes.
    pub const SIZE: usize = 33;

    /// Create from raw bytes. No curve validity check is performed here.
    pub fn from_bytes(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

impl AsRef<[u8]> for PubKeyBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PubKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PubKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Hex serde helper for 33-byte arrays.
mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 33], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 33], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid public key length"))
    }
}
