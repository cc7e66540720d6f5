//! Cryptography for the Kestrel directory service.
//!
//! Two concerns live here:
//!
//! - EC-Schnorr signatures over secp256k1 (33-byte compressed public keys,
//!   32-byte challenge + 32-byte response signatures), used to authenticate
//!   PoW submissions.
//! - The PoW verifier seam: the [`pow::PowVerifier`] trait invoked by the
//!   intake pipeline, plus a double-SHA-256 reference implementation.

pub mod error;
pub mod pow;
pub mod schnorr;

pub use error::CryptoError;
pub use pow::{PowVerifier, Sha2PowVerifier};
pub use schnorr::{SchnorrKeyPair, SchnorrPublicKey, SchnorrSecretKey, SchnorrSignature};
