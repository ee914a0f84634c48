//! Content encryption using AES-256-GCM
//!
//! This module provides symmetric encryption for ledger contents and for the
//! identity store file. Each encrypted ledger has its own `Secret`, derived by
//! the key exchange or generated at ledger creation.

use std::ops::Deref;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{random_bytes, CryptoError};

/// Size of AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;
/// Size of AES-256 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;

/// A 256-bit symmetric encryption key
///
/// The sealed format is: `nonce (12 bytes) || ciphertext || auth_tag (16 bytes)`.
///  A fresh random nonce is drawn for every encryption.
///
/// # Examples
///
/// ```ignore
/// let secret = Secret::generate()?;
///
/// let sealed = secret.encrypt(b"sensitive data")?;
/// let recovered = secret.decrypt(&sealed)?;
/// assert_eq!(b"sensitive data", &recovered[..]);
/// ```
#[serde_as]
#[derive(PartialEq, Eq, Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(#[serde_as(as = "Base64")] [u8; SECRET_SIZE]);

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Secret").field(&"<redacted>").finish()
    }
}

impl Deref for Secret {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(random_bytes::<SECRET_SIZE>()?))
    }

    /// Derive a store key from a passphrase: the SHA-256 digest of its bytes
    pub fn from_passphrase(passphrase: &[u8]) -> Self {
        let digest = Sha256::digest(passphrase);
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(&digest);
        Self(buff)
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != SECRET_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )));
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Get a reference to the secret key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.bytes()))
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    ///
    /// Returns the ciphertext (with its tag) and the nonce separately. Callers
    ///  must never reuse a nonce with the same secret.
    pub fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_SIZE]), CryptoError> {
        let nonce_bytes = random_bytes::<NONCE_SIZE>()?;
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CryptoError::Failure("encrypt error".to_string()))?;
        Ok((ciphertext, nonce_bytes))
    }

    /// Encrypt data, producing `nonce || ciphertext || tag`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (ciphertext, nonce) = self.seal(plaintext)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt data produced by [`Secret::encrypt`]
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Authentication`] if the data is too short to hold a
    ///  nonce, was tampered with, or was sealed under a different secret.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::Authentication);
        }

        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Authentication)
    }
}
