//! Block types produced and consumed by the directory service.
//!
//! All block encodings are fixed-layout big-endian byte strings. They are
//! hand-rolled because the encodings are part of the wire protocol: the
//! same bytes travel through consensus, into storage and across the
//! network, and must be bit-stable across versions and platforms.

use crate::hash::Hash;
use crate::keys::PubKeyBytes;
use crate::peer::Peer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error decoding a block or wire field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the field was complete.
    #[error("truncated input: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Bytes required to finish the current field.
        needed: usize,
        /// Offset at which decoding stopped.
        offset: usize,
    },
    /// The buffer had bytes left over after the last field.
    #[error("{0} trailing bytes after block body")]
    TrailingBytes(usize),
}

/// Sequential big-endian reader over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.bytes.len() - self.pos < n {
            return Err(DecodeError::Truncated {
                needed: n,
                offset: self.pos,
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }

    fn hash(&mut self) -> Result<Hash, DecodeError> {
        let mut buf = [0u8; 32];
        buf.copy_from_slice(self.take(32)?);
        Ok(Hash::from_bytes(buf))
    }

    fn pubkey(&mut self) -> Result<PubKeyBytes, DecodeError> {
        let mut buf = [0u8; 33];
        buf.copy_from_slice(self.take(33)?);
        Ok(PubKeyBytes::from_bytes(buf))
    }

    fn peer(&mut self) -> Result<Peer, DecodeError> {
        let (peer, end) = Peer::decode(self.bytes, self.pos).ok_or(DecodeError::Truncated {
            needed: Peer::SIZE,
            offset: self.pos,
        })?;
        self.pos = end;
        Ok(peer)
    }

    fn finish(self) -> Result<(), DecodeError> {
        let rest = self.bytes.len() - self.pos;
        if rest != 0 {
            return Err(DecodeError::TrailingBytes(rest));
        }
        Ok(())
    }
}

/// Header of a DS (committee-level) block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsBlockHeader {
    /// DS block number (monotonic, 1-based; genesis context is 0).
    pub block_num: u64,
    /// Shard-tier PoW difficulty for the next window.
    pub difficulty: u8,
    /// DS-tier PoW difficulty for the next window.
    pub ds_difficulty: u8,
    /// Hash of the previous DS block.
    pub prev_hash: Hash,
    /// Public key of the committee leader that proposed this block.
    pub leader_pubkey: PubKeyBytes,
}

/// A DS block: header plus the PoW winners promoted into the committee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsBlock {
    /// Block header.
    pub header: DsBlockHeader,
    /// Promoted committee members, ordered by ascending public key.
    pub winners: Vec<(PubKeyBytes, Peer)>,
}

impl DsBlock {
    /// Encode to the canonical wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(75 + 4 + self.winners.len() * 53);
        out.extend_from_slice(&self.header.block_num.to_be_bytes());
        out.push(self.header.difficulty);
        out.push(self.header.ds_difficulty);
        out.extend_from_slice(self.header.prev_hash.as_bytes());
        out.extend_from_slice(self.header.leader_pubkey.as_bytes());
        out.extend_from_slice(&(self.winners.len() as u32).to_be_bytes());
        for (pubkey, peer) in &self.winners {
            out.extend_from_slice(pubkey.as_bytes());
            peer.encode_to(&mut out);
        }
        out
    }

    /// Decode from the canonical wire layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let header = DsBlockHeader {
            block_num: r.u64()?,
            difficulty: r.u8()?,
            ds_difficulty: r.u8()?,
            prev_hash: r.hash()?,
            leader_pubkey: r.pubkey()?,
        };
        let count = r.u32()? as usize;
        let mut winners = Vec::with_capacity(count);
        for _ in 0..count {
            let pubkey = r.pubkey()?;
            let peer = r.peer()?;
            winners.push((pubkey, peer));
        }
        r.finish()?;
        Ok(Self { header, winners })
    }

    /// Block hash (SHA-256 over the canonical encoding). This hash doubles
    /// as the next epoch's `rand1` PoW randomness.
    pub fn hash(&self) -> Hash {
        Hash::compute(&self.encode())
    }
}

/// Header of a Tx (final) block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBlockHeader {
    /// Tx block number (one per epoch).
    pub block_num: u64,
    /// Hash of the previous Tx block.
    pub prev_hash: Hash,
    /// Root over the included microblock hashes.
    pub microblock_root: Hash,
}

/// A Tx (final) block aggregating the epoch's shard microblocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBlock {
    /// Block header.
    pub header: TxBlockHeader,
    /// Hashes of the included microblocks.
    pub microblock_hashes: Vec<Hash>,
}

impl TxBlock {
    /// Compute the microblock root over a set of microblock hashes.
    pub fn compute_microblock_root(hashes: &[Hash]) -> Hash {
        let mut bytes = Vec::with_capacity(hashes.len() * Hash::SIZE);
        for hash in hashes {
            bytes.extend_from_slice(hash.as_bytes());
        }
        Hash::compute(&bytes)
    }

    /// Encode to the canonical wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(72 + 4 + self.microblock_hashes.len() * 32);
        out.extend_from_slice(&self.header.block_num.to_be_bytes());
        out.extend_from_slice(self.header.prev_hash.as_bytes());
        out.extend_from_slice(self.header.microblock_root.as_bytes());
        out.extend_from_slice(&(self.microblock_hashes.len() as u32).to_be_bytes());
        for hash in &self.microblock_hashes {
            out.extend_from_slice(hash.as_bytes());
        }
        out
    }

    /// Decode from the canonical wire layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let header = TxBlockHeader {
            block_num: r.u64()?,
            prev_hash: r.hash()?,
            microblock_root: r.hash()?,
        };
        let count = r.u32()? as usize;
        let mut microblock_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            microblock_hashes.push(r.hash()?);
        }
        r.finish()?;
        Ok(Self {
            header,
            microblock_hashes,
        })
    }

    /// Block hash (SHA-256 over the canonical encoding). This hash doubles
    /// as the next epoch's `rand2` PoW randomness.
    pub fn hash(&self) -> Hash {
        Hash::compute(&self.encode())
    }
}

/// A microblock produced by a shard and submitted to the DS committee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Microblock {
    /// Shard that produced the microblock.
    pub shard_id: u32,
    /// Tx block number this microblock belongs to.
    pub block_num: u64,
    /// Transaction root of the microblock body.
    pub tx_root: Hash,
}

impl Microblock {
    /// Wire size in bytes.
    pub const SIZE: usize = 4 + 8 + 32;

    /// Encode to the canonical wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.shard_id.to_be_bytes());
        out.extend_from_slice(&self.block_num.to_be_bytes());
        out.extend_from_slice(self.tx_root.as_bytes());
        out
    }

    /// Decode from the canonical wire layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let block = Self {
            shard_id: r.u32()?,
            block_num: r.u64()?,
            tx_root: r.hash()?,
        };
        r.finish()?;
        Ok(block)
    }

    /// Microblock hash.
    pub fn hash(&self) -> Hash {
        Hash::compute(&self.encode())
    }
}
