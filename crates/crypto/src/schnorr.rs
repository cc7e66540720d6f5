//! EC-Schnorr signatures over secp256k1.
//!
//! The scheme is commitment/challenge/response:
//!
//! - sign: pick nonce `k`, commit `Q = k*G`, derive the challenge
//!   `r = H(Q || pubkey || msg) mod n`, respond with `s = k - r*sk mod n`.
//! - verify: reconstruct `Q' = s*G + r*P` and accept iff
//!   `H(Q' || pubkey || msg) mod n == r`.
//!
//! Signatures serialize as the 32-byte challenge followed by the 32-byte
//! response; public keys serialize as 33-byte compressed SEC1 points.

use crate::error::CryptoError;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::{Field, Group, PrimeField};
use k256::{FieldBytes, ProjectivePoint, PublicKey as K256PublicKey, Scalar, SecretKey as K256SecretKey};
use kestrel_types::PubKeyBytes;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Derive the Schnorr challenge scalar for commitment `q`.
fn challenge(q: &ProjectivePoint, pubkey: &SchnorrPublicKey, msg: &[u8]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(q.to_affine().to_encoded_point(true).as_bytes());
    hasher.update(pubkey.to_bytes());
    hasher.update(msg);
    let digest: [u8; 32] = hasher.finalize().into();
    <Scalar as k256::elliptic_curve::ops::Reduce<k256::U256>>::reduce_bytes(&FieldBytes::from(
        digest,
    ))
}

/// Schnorr secret key (secp256k1 scalar).
#[derive(Clone)]
pub struct SchnorrSecretKey(K256SecretKey);

impl SchnorrSecretKey {
    /// Generate a new random secret key.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        Self(K256SecretKey::random(rng))
    }

    /// Load from raw bytes (32-byte scalar).
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        K256SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidSecretKey)
    }

    /// Serialize to raw bytes (32-byte scalar).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> SchnorrPublicKey {
        SchnorrPublicKey(self.0.public_key())
    }

    /// Sign `msg`.
    pub fn sign<R: CryptoRng + RngCore>(&self, msg: &[u8], rng: &mut R) -> SchnorrSignature {
        let sk: Scalar = *self.0.to_nonzero_scalar();
        let pubkey = self.public_key();
        loop {
            let k = Scalar::random(&mut *rng);
            if bool::from(k.is_zero()) {
                continue;
            }
            let q = ProjectivePoint::GENERATOR * k;
            let r = challenge(&q, &pubkey, msg);
            if bool::from(r.is_zero()) {
                continue;
            }
            let s = k - r * sk;
            if bool::from(s.is_zero()) {
                continue;
            }
            return SchnorrSignature {
                challenge: r,
                response: s,
            };
        }
    }
}

impl std::fmt::Debug for SchnorrSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchnorrSecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Schnorr public key (secp256k1 point).
#[derive(Clone, PartialEq, Eq)]
pub struct SchnorrPublicKey(K256PublicKey);

impl SchnorrPublicKey {
    /// Load from compressed SEC1 bytes (33 bytes).
    pub fn from_bytes(bytes: &[u8; 33]) -> Result<Self, CryptoError> {
        K256PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Load from wire-level [`PubKeyBytes`], validating the curve point.
    pub fn from_pubkey_bytes(bytes: &PubKeyBytes) -> Result<Self, CryptoError> {
        Self::from_bytes(bytes.as_bytes())
    }

    /// Serialize to compressed SEC1 bytes (33 bytes).
    pub fn to_bytes(&self) -> [u8; 33] {
        let encoded = self.0.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    /// Convert to the wire-level key representation.
    pub fn to_pubkey_bytes(&self) -> PubKeyBytes {
        PubKeyBytes::from_bytes(self.to_bytes())
    }

    /// Verify `sig` over `msg`.
    pub fn verify(&self, msg: &[u8], sig: &SchnorrSignature) -> bool {
        if bool::from(sig.challenge.is_zero()) || bool::from(sig.response.is_zero()) {
            return false;
        }
        let q = ProjectivePoint::GENERATOR * sig.response + self.0.to_projective() * sig.challenge;
        if bool::from(q.is_identity()) {
            return false;
        }
        challenge(&q, self, msg) == sig.challenge
    }
}

impl std::fmt::Debug for SchnorrPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.to_bytes();
        write!(f, "SchnorrPublicKey({})", hex::encode(&bytes[..8]))
    }
}

impl Serialize for SchnorrPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for SchnorrPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 33] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid public key length"))?;
        Self::from_bytes(&arr).map_err(serde::de::Error::custom)
    }
}

/// Schnorr signature: challenge scalar plus response scalar.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SchnorrSignature {
    challenge: Scalar,
    response: Scalar,
}

impl SchnorrSignature {
    /// Wire size in bytes (32-byte challenge + 32-byte response).
    pub const SIZE: usize = 64;

    /// Load from raw bytes (challenge || response).
    pub fn from_bytes(bytes: &[u8; 64]) -> Result<Self, CryptoError> {
        let mut challenge_bytes = [0u8; 32];
        challenge_bytes.copy_from_slice(&bytes[..32]);
        let mut response_bytes = [0u8; 32];
        response_bytes.copy_from_slice(&bytes[32..]);

        let challenge = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(challenge_bytes)))
            .ok_or(CryptoError::InvalidSignature)?;
        let response = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(response_bytes)))
            .ok_or(CryptoError::InvalidSignature)?;
        Ok(Self {
            challenge,
            response,
        })
    }

    /// Serialize to raw bytes (challenge || response).
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.challenge.to_repr());
        out[32..].copy_from_slice(&self.response.to_repr());
        out
    }
}

impl std::fmt::Debug for SchnorrSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.to_bytes();
        write!(f, "SchnorrSignature({})", hex::encode(&bytes[..8]))
    }
}

/// Convenience key pair.
#[derive(Debug, Clone)]
pub struct SchnorrKeyPair {
    /// Secret half.
    pub secret_key: SchnorrSecretKey,
    /// Public half.
    pub public_key: SchnorrPublicKey,
}

impl SchnorrKeyPair {
    /// Generate a new random key pair.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let secret_key = SchnorrSecretKey::generate(rng);
        let public_key = secret_key.public_key();
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create from a secret key.
    pub fn from_secret_key(secret_key: SchnorrSecretKey) -> Self {
        let public_key = secret_key.public_key();
        Self {
            secret_key,
            public_key,
        }
    }

    /// Sign `msg`.
    pub fn sign(&self, msg: &[u8]) -> SchnorrSignature {
        self.secret_key.sign(msg, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let msg = b"pow submission payload";
        let sig = keypair.sign(msg);
        assert!(keypair.public_key.verify(msg, &sig));
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let sig = keypair.sign(b"correct");
        assert!(!keypair.public_key.verify(b"tampered", &sig));
    }

    #[test]
    fn test_wrong_key_fails() {
        let signer = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let other = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let msg = b"message";
        let sig = signer.sign(msg);
        assert!(!other.public_key.verify(msg, &sig));
    }

    #[test]
    fn test_signature_bytes_roundtrip() {
        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let msg = b"roundtrip";
        let sig = keypair.sign(msg);
        let restored = SchnorrSignature::from_bytes(&sig.to_bytes()).unwrap();
        assert!(keypair.public_key.verify(msg, &restored));
    }

    #[test]
    fn test_tampered_signature_fails() {
        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let msg = b"message";
        let mut bytes = keypair.sign(msg).to_bytes();
        bytes[40] ^= 0x01;
        match SchnorrSignature::from_bytes(&bytes) {
            Ok(sig) => assert!(!keypair.public_key.verify(msg, &sig)),
            Err(err) => assert_eq!(err, CryptoError::InvalidSignature),
        }
    }

    #[test]
    fn test_secret_key_roundtrip() {
        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let restored = SchnorrSecretKey::from_bytes(&keypair.secret_key.to_bytes()).unwrap();
        assert_eq!(
            restored.public_key().to_bytes(),
            keypair.public_key.to_bytes()
        );
    }

    #[test]
    fn test_pubkey_bytes_conversion() {
        let keypair = SchnorrKeyPair::generate(&mut rand::thread_rng());
        let wire = keypair.public_key.to_pubkey_bytes();
        let restored = SchnorrPublicKey::from_pubkey_bytes(&wire).unwrap();
        assert_eq!(restored, keypair.public_key);
    }

    #[test]
    fn test_invalid_pubkey_bytes_rejected() {
        let garbage = PubKeyBytes::from_bytes([0xff; 33]);
        assert!(SchnorrPublicKey::from_pubkey_bytes(&garbage).is_err());
    }
}
