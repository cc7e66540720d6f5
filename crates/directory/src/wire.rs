//! Wire formats for DS messages.
//!
//! Inbound wire messages are length-prefixed byte vectors. The first
//! payload byte is a frame-type byte (`DS_MSG_TYPE` for messages handled
//! here), the next is the DS instruction opcode, and the remainder is the
//! instruction body at a fixed, bit-exact layout.

use crate::error::PowRejection;
use kestrel_types::config::{
    BLOCK_HASH_SIZE, PUB_KEY_SIZE, SIGNATURE_CHALLENGE_SIZE, SIGNATURE_RESPONSE_SIZE,
};
use kestrel_types::{Hash, Peer, PubKeyBytes};
use kestrel_crypto::SchnorrKeyPair;

/// Frame-type byte for DS messages.
pub const DS_MSG_TYPE: u8 = 0x01;
/// Frame-type byte for lookup messages.
pub const LOOKUP_MSG_TYPE: u8 = 0x02;
/// Lookup subtype carrying the DS committee from the seed node.
pub const SET_DS_INFO_FROM_SEED: u8 = 0x00;

/// DS instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DsInstruction {
    /// Bootstrap: learn the committee leader.
    SetPrimary = 0,
    /// A miner's PoW submission.
    PowSubmission = 1,
    /// DS-block consensus traffic.
    DsBlockConsensus = 2,
    /// A shard microblock.
    MicroblockSubmission = 3,
    /// Final-block consensus traffic.
    FinalBlockConsensus = 4,
    /// View-change consensus traffic.
    ViewChangeConsensus = 5,
}

impl TryFrom<u8> for DsInstruction {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        match byte {
            0 => Ok(DsInstruction::SetPrimary),
            1 => Ok(DsInstruction::PowSubmission),
            2 => Ok(DsInstruction::DsBlockConsensus),
            3 => Ok(DsInstruction::MicroblockSubmission),
            4 => Ok(DsInstruction::FinalBlockConsensus),
            5 => Ok(DsInstruction::ViewChangeConsensus),
            other => Err(other),
        }
    }
}

/// A decoded PoW submission.
///
/// Body layout, all fields big-endian:
///
/// ```text
/// [8: block_num][1: difficulty][4: port][33: pubkey][8: nonce]
/// [32: result_hash][32: mix_hash][32: sig_challenge][32: sig_response]
/// ```
///
/// The signature covers every message byte before itself, including the
/// frame and opcode prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowSubmission {
    /// DS block the solution targets.
    pub block_num: u64,
    /// Claimed difficulty tier.
    pub difficulty: u8,
    /// Submitter's listening port (its IP is taken from the transport).
    pub port: u32,
    /// Submitter public key.
    pub pubkey: PubKeyBytes,
    /// PoW nonce.
    pub nonce: u64,
    /// PoW result hash.
    pub result_hash: Hash,
    /// PoW mix hash.
    pub mix_hash: Hash,
    /// Schnorr signature (challenge || response).
    pub signature: [u8; 64],
}

impl PowSubmission {
    /// Body length covered by the signature.
    pub const UNSIGNED_LEN: usize =
        8 + 1 + 4 + PUB_KEY_SIZE + 8 + BLOCK_HASH_SIZE + BLOCK_HASH_SIZE;
    /// Total body length.
    pub const LEN: usize = Self::UNSIGNED_LEN + SIGNATURE_CHALLENGE_SIZE + SIGNATURE_RESPONSE_SIZE;

    /// Decode the submission body starting at `offset`.
    ///
    /// The body must occupy exactly the remainder of the message.
    pub fn decode(message: &[u8], offset: usize) -> Result<Self, PowRejection> {
        let got = message.len().saturating_sub(offset);
        if got != Self::LEN {
            return Err(PowRejection::WrongSize {
                expected: Self::LEN,
                got,
            });
        }

        let body = &message[offset..];
        let mut pubkey_bytes = [0u8; PUB_KEY_SIZE];
        pubkey_bytes.copy_from_slice(&body[13..46]);
        let mut result_bytes = [0u8; BLOCK_HASH_SIZE];
        result_bytes.copy_from_slice(&body[54..86]);
        let mut mix_bytes = [0u8; BLOCK_HASH_SIZE];
        mix_bytes.copy_from_slice(&body[86..118]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&body[118..182]);

        let block_num = u64::from_be_bytes(body[0..8].try_into().expect("fixed width"));
        let difficulty = body[8];
        let port = u32::from_be_bytes(body[9..13].try_into().expect("fixed width"));
        let pubkey = PubKeyBytes::from_bytes(pubkey_bytes);
        let nonce = u64::from_be_bytes(body[46..54].try_into().expect("fixed width"));
        let result_hash = Hash::from_bytes(result_bytes);
        let mix_hash = Hash::from_bytes(mix_bytes);

        Ok(Self {
            block_num,
            difficulty,
            port,
            pubkey,
            nonce,
            result_hash,
            mix_hash,
            signature,
        })
    }

    /// Build a complete signed submission message.
    ///
    /// `prefix` is everything before the body (frame and opcode bytes);
    /// the signature covers `prefix` plus the unsigned body fields.
    #[allow(clippy::too_many_arguments)]
    pub fn build_signed(
        prefix: &[u8],
        block_num: u64,
        difficulty: u8,
        port: u32,
        keypair: &SchnorrKeyPair,
        nonce: u64,
        result_hash: &Hash,
        mix_hash: &Hash,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(prefix.len() + Self::LEN);
        out.extend_from_slice(prefix);
        out.extend_from_slice(&block_num.to_be_bytes());
        out.push(difficulty);
        out.extend_from_slice(&port.to_be_bytes());
        out.extend_from_slice(keypair.public_key.to_pubkey_bytes().as_bytes());
        out.extend_from_slice(&nonce.to_be_bytes());
        out.extend_from_slice(result_hash.as_bytes());
        out.extend_from_slice(mix_hash.as_bytes());

        let signature = keypair.sign(&out);
        out.extend_from_slice(&signature.to_bytes());
        out
    }
}

/// Encode the `SETDSINFOFROMSEED` committee broadcast sent to lookups:
/// `[type][subtype][4: count][(pubkey || peer) x count]`.
pub fn encode_ds_info_from_seed(members: &[(PubKeyBytes, Peer)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 4 + members.len() * (PubKeyBytes::SIZE + Peer::SIZE));
    out.push(LOOKUP_MSG_TYPE);
    out.push(SET_DS_INFO_FROM_SEED);
    out.extend_from_slice(&(members.len() as u32).to_be_bytes());
    for (pubkey, peer) in members {
        out.extend_from_slice(pubkey.as_bytes());
        peer.encode_to(&mut out);
    }
    out
}

/// Encode a view-change proposal payload: the candidate leader index.
pub fn encode_view_change(candidate: u32) -> Vec<u8> {
    candidate.to_be_bytes().to_vec()
}

/// Decode a view-change proposal payload.
pub fn decode_view_change(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = payload.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_crypto::{SchnorrPublicKey, SchnorrSignature};
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_submission_layout_offsets() {
        assert_eq!(PowSubmission::UNSIGNED_LEN, 118);
        assert_eq!(PowSubmission::LEN, 182);

        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let result = Hash::compute(b"result");
        let mix = Hash::compute(b"mix");
        let prefix = [DS_MSG_TYPE, DsInstruction::PowSubmission as u8];
        let message =
            PowSubmission::build_signed(&prefix, 9, 7, 30303, &keypair, 0xdead_beef, &result, &mix);

        assert_eq!(message.len(), 2 + PowSubmission::LEN);
        // Field offsets, relative to the body.
        assert_eq!(&message[2..10], &9u64.to_be_bytes());
        assert_eq!(message[10], 7);
        assert_eq!(&message[11..15], &30303u32.to_be_bytes());
        assert_eq!(
            &message[15..48],
            keypair.public_key.to_pubkey_bytes().as_bytes()
        );

        let decoded = PowSubmission::decode(&message, 2).unwrap();
        assert_eq!(decoded.block_num, 9);
        assert_eq!(decoded.difficulty, 7);
        assert_eq!(decoded.port, 30303);
        assert_eq!(decoded.nonce, 0xdead_beef);
        assert_eq!(decoded.result_hash, result);
        assert_eq!(decoded.mix_hash, mix);
    }

    #[test]
    fn test_signature_covers_prefix() {
        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let prefix = [DS_MSG_TYPE, DsInstruction::PowSubmission as u8];
        let message = PowSubmission::build_signed(
            &prefix,
            1,
            3,
            4444,
            &keypair,
            42,
            &Hash::compute(b"r"),
            &Hash::compute(b"m"),
        );

        let decoded = PowSubmission::decode(&message, 2).unwrap();
        let sig = SchnorrSignature::from_bytes(&decoded.signature).unwrap();
        let pubkey = SchnorrPublicKey::from_pubkey_bytes(&decoded.pubkey).unwrap();
        assert!(pubkey.verify(&message[..2 + PowSubmission::UNSIGNED_LEN], &sig));

        // Tampering with the prefix invalidates the signature.
        let mut tampered = message.clone();
        tampered[0] ^= 0xff;
        assert!(!pubkey.verify(&tampered[..2 + PowSubmission::UNSIGNED_LEN], &sig));
    }

    #[test]
    fn test_decode_rejects_wrong_size() {
        let err = PowSubmission::decode(&[0u8; 50], 0).unwrap_err();
        assert_eq!(
            err,
            PowRejection::WrongSize {
                expected: PowSubmission::LEN,
                got: 50
            }
        );

        // One trailing byte is also a size mismatch.
        let err = PowSubmission::decode(&[0u8; PowSubmission::LEN + 1], 0).unwrap_err();
        assert!(matches!(err, PowRejection::WrongSize { .. }));
    }

    #[test]
    fn test_ds_info_from_seed_layout() {
        let pubkey = PubKeyBytes::from_bytes([0x02; 33]);
        let peer = Peer::new(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 5555);
        let bytes = encode_ds_info_from_seed(&[(pubkey, peer)]);

        assert_eq!(bytes[0], LOOKUP_MSG_TYPE);
        assert_eq!(bytes[1], SET_DS_INFO_FROM_SEED);
        assert_eq!(&bytes[2..6], &1u32.to_be_bytes());
        assert_eq!(&bytes[6..39], pubkey.as_bytes());
        assert_eq!(bytes.len(), 6 + 33 + Peer::SIZE);
    }

    #[test]
    fn test_view_change_payload() {
        assert_eq!(decode_view_change(&encode_view_change(3)), Some(3));
        assert_eq!(decode_view_change(&[1, 2]), None);
    }

    #[test]
    fn test_instruction_opcodes() {
        for (byte, instruction) in [
            (0u8, DsInstruction::SetPrimary),
            (1, DsInstruction::PowSubmission),
            (2, DsInstruction::DsBlockConsensus),
            (3, DsInstruction::MicroblockSubmission),
            (4, DsInstruction::FinalBlockConsensus),
            (5, DsInstruction::ViewChangeConsensus),
        ] {
            assert_eq!(DsInstruction::try_from(byte), Ok(instruction));
        }
        assert_eq!(DsInstruction::try_from(6), Err(6));
    }
}
