//! Proof-of-work verification seam.
//!
//! The directory service treats the PoW scheme as a collaborator: the
//! intake pipeline hands every submission to a [`PowVerifier`] and only
//! records the solution if the verifier accepts it. The verifier binds a
//! submission to the current chain head through `rand1`/`rand2` and to the
//! submitter through its source IP and public key.
//!
//! [`Sha2PowVerifier`] is the reference scheme used by the node and the
//! test suites: a double-SHA-256 construction with a leading-zero-bit
//! difficulty target.

use kestrel_types::{Hash, PubKeyBytes};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Verifies PoW solutions submitted to the DS committee.
pub trait PowVerifier: Send + Sync {
    /// Verify one solution. Returns `true` iff the solution is valid for
    /// the given chain context and submitter identity.
    #[allow(clippy::too_many_arguments)]
    fn verify(
        &self,
        block_num: u64,
        difficulty: u8,
        rand1: &Hash,
        rand2: &Hash,
        src_ip: &IpAddr,
        pubkey: &PubKeyBytes,
        nonce: u64,
        result_hash: &Hash,
        mix_hash: &Hash,
    ) -> bool;
}

fn ip_bytes(ip: &IpAddr) -> [u8; 16] {
    let value: u128 = match ip {
        IpAddr::V4(v4) => u32::from(*v4) as u128,
        IpAddr::V6(v6) => u128::from(*v6),
    };
    value.to_be_bytes()
}

/// Double-SHA-256 PoW.
///
/// The seed hash commits to everything except the nonce:
/// `seed = H(block_num || difficulty || rand1 || rand2 || ip || pubkey)`.
/// A solution is `mix = H(seed || nonce)` and `result = H(seed || mix)`,
/// where `result` must carry at least `difficulty` leading zero bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha2PowVerifier;

impl Sha2PowVerifier {
    /// Compute the seed hash binding a submission to its context.
    #[allow(clippy::too_many_arguments)]
    fn seed(
        block_num: u64,
        difficulty: u8,
        rand1: &Hash,
        rand2: &Hash,
        src_ip: &IpAddr,
        pubkey: &PubKeyBytes,
    ) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(block_num.to_be_bytes());
        hasher.update([difficulty]);
        hasher.update(rand1.as_bytes());
        hasher.update(rand2.as_bytes());
        hasher.update(ip_bytes(src_ip));
        hasher.update(pubkey.as_bytes());
        Hash::from_bytes(hasher.finalize().into())
    }

    fn mix(seed: &Hash, nonce: u64) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(nonce.to_be_bytes());
        Hash::from_bytes(hasher.finalize().into())
    }

    fn result(seed: &Hash, mix: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(mix.as_bytes());
        Hash::from_bytes(hasher.finalize().into())
    }

    /// Search for a nonce satisfying `difficulty`, up to `max_iterations`.
    ///
    /// Returns `(nonce, result_hash, mix_hash)` on success. Intended for
    /// tests and local mining tools; real miners run outside this process.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        block_num: u64,
        difficulty: u8,
        rand1: &Hash,
        rand2: &Hash,
        src_ip: &IpAddr,
        pubkey: &PubKeyBytes,
        max_iterations: u64,
    ) -> Option<(u64, Hash, Hash)> {
        let seed = Self::seed(block_num, difficulty, rand1, rand2, src_ip, pubkey);
        for nonce in 0..max_iterations {
            let mix = Self::mix(&seed, nonce);
            let result = Self::result(&seed, &mix);
            if result.leading_zero_bits() >= difficulty as u32 {
                return Some((nonce, result, mix));
            }
        }
        None
    }
}

impl PowVerifier for Sha2PowVerifier {
    fn verify(
        &self,
        block_num: u64,
        difficulty: u8,
        rand1: &Hash,
        rand2: &Hash,
        src_ip: &IpAddr,
        pubkey: &PubKeyBytes,
        nonce: u64,
        result_hash: &Hash,
        mix_hash: &Hash,
    ) -> bool {
        let seed = Self::seed(block_num, difficulty, rand1, rand2, src_ip, pubkey);
        let mix = Self::mix(&seed, nonce);
        if mix != *mix_hash {
            return false;
        }
        let result = Self::result(&seed, &mix);
        result == *result_hash && result.leading_zero_bits() >= difficulty as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const DIFFICULTY: u8 = 4;

    fn context() -> (Hash, Hash, IpAddr, PubKeyBytes) {
        (
            Hash::compute(b"rand1"),
            Hash::compute(b"rand2"),
            IpAddr::V4(Ipv4Addr::new(52, 0, 0, 9)),
            PubKeyBytes::from_bytes([0x02; 33]),
        )
    }

    #[test]
    fn test_solve_then_verify() {
        let (rand1, rand2, ip, pubkey) = context();
        let (nonce, result, mix) =
            Sha2PowVerifier::solve(1, DIFFICULTY, &rand1, &rand2, &ip, &pubkey, 1 << 20)
                .expect("low difficulty is solvable");
        assert!(Sha2PowVerifier.verify(
            1, DIFFICULTY, &rand1, &rand2, &ip, &pubkey, nonce, &result, &mix
        ));
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let (rand1, rand2, ip, pubkey) = context();
        let (nonce, result, mix) =
            Sha2PowVerifier::solve(1, DIFFICULTY, &rand1, &rand2, &ip, &pubkey, 1 << 20).unwrap();
        assert!(!Sha2PowVerifier.verify(
            1,
            DIFFICULTY,
            &rand1,
            &rand2,
            &ip,
            &pubkey,
            nonce + 1,
            &result,
            &mix
        ));
    }

    #[test]
    fn test_solution_bound_to_source_ip() {
        let (rand1, rand2, ip, pubkey) = context();
        let (nonce, result, mix) =
            Sha2PowVerifier::solve(1, DIFFICULTY, &rand1, &rand2, &ip, &pubkey, 1 << 20).unwrap();
        let other_ip = IpAddr::V4(Ipv4Addr::new(52, 0, 0, 10));
        assert!(!Sha2PowVerifier.verify(
            1, DIFFICULTY, &rand1, &rand2, &other_ip, &pubkey, nonce, &result, &mix
        ));
    }

    #[test]
    fn test_solution_bound_to_randomness() {
        let (rand1, rand2, ip, pubkey) = context();
        let (nonce, result, mix) =
            Sha2PowVerifier::solve(1, DIFFICULTY, &rand1, &rand2, &ip, &pubkey, 1 << 20).unwrap();
        let other_rand = Hash::compute(b"next epoch");
        assert!(!Sha2PowVerifier.verify(
            1, DIFFICULTY, &other_rand, &rand2, &ip, &pubkey, nonce, &result, &mix
        ));
    }
}
