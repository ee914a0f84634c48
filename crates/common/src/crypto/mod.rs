//! Cryptographic primitives for Thorne
//!
//! This module provides the cryptographic foundation for Thorne's security model:
//!
//! - **Identity & Authentication**: P-521 keypairs sign every block and ledger request
//! - **Encryption**: AES-256-GCM protects ledger contents and the on-disk identity store
//! - **Key Agreement**: ephemeral P-521 ECDH stretched through HKDF-SHA256
//! - **Bootstrap**: RSA PKCS#1 v1.5 carries the short handshake fields before any
//!   shared secret exists
//!
//! # Security Model
//!
//! ## Identity
//! Each account has a long-lived P-521 keypair (`SecretKey`/`PublicKey`). Signatures
//! are ASN.1 DER encoded ECDSA over the SHA-256 digest of a canonical byte string.
//!
//! ## Content Encryption
//! Every encrypted ledger has its own 256-bit `Secret`. Payloads are sealed as
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)` with a fresh random nonce.
//! Never encrypt more than 2^32 messages under one `Secret`; random 96-bit nonces
//! start to collide beyond that. Rotation is not handled here.
//!
//! ## Key Agreement
//! Two parties exchange ephemeral public keys, compute the P-521 shared point and
//! run the raw x-coordinate through HKDF-SHA256 (no salt, no info) to obtain a
//! uniform 32-byte `Secret`.

mod bootstrap;
mod keys;
mod secret;
mod shared_secret;

pub use bootstrap::{RsaPublicKey, RsaSecretKey, RSA_KEY_BITS};
pub use keys::{PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{Secret, NONCE_SIZE, SECRET_SIZE};
pub use shared_secret::derive_shared_secret;

/// Errors raised by the cryptographic primitives
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The environment could not produce randomness or a signature.
    ///  Treated as unrecoverable by callers.
    #[error("crypto failure: {0}")]
    Failure(String),
    /// An AEAD tag did not verify: the data was tampered with
    ///  or the wrong key was used
    #[error("authentication failed: ciphertext rejected")]
    Authentication,
    /// Key material was absent, malformed or not on the curve
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// A value could not be decoded (base64, PEM, DER, UTF-8)
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Fill a buffer from the operating system RNG
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buff = [0u8; N];
    getrandom::getrandom(&mut buff)
        .map_err(|e| CryptoError::Failure(format!("failed to generate random bytes: {}", e)))?;
    Ok(buff)
}
