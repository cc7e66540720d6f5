//! Crypto error types.

use thiserror::Error;

/// Errors from key or signature handling.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Secret key bytes are not a valid scalar.
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Public key bytes are not a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature bytes are not valid scalars.
    #[error("invalid signature encoding")]
    InvalidSignature,
}
