//! RSA bootstrap encryption
//!
//! Before two accounts share any secret, the handshake needs to hide who is
//! asking and what they said. Those fields are short, so they are encrypted
//! directly under the recipient's long-term RSA key with PKCS#1 v1.5 padding.
//! Plaintexts are bounded by the modulus: at most `RSA_KEY_BITS / 8 - 11` bytes.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::Pkcs1v15Encrypt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::CryptoError;

/// Modulus size of generated bootstrap keys
pub const RSA_KEY_BITS: usize = 2048;

const PEM_TAG: &str = "PRIVATE KEY";

/// Public half of an account's bootstrap key
///
/// Published by the key directory as base64 PKCS#1 DER. PKIX
///  (`SubjectPublicKeyInfo`) DER is accepted as a fallback when parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey(rsa::RsaPublicKey);

impl RsaPublicKey {
    /// Parse a base64 encoded PKCS#1 (or PKIX) DER public key
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let der = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Encoding(format!("rsa public key base64: {}", e)))?;

        match rsa::RsaPublicKey::from_pkcs1_der(&der) {
            Ok(key) => Ok(Self(key)),
            Err(e) => {
                tracing::debug!("not a PKCS#1 public key ({}), trying PKIX", e);
                rsa::RsaPublicKey::from_public_key_der(&der)
                    .map(Self)
                    .map_err(|e| CryptoError::InvalidKey(format!("unable to parse RSA public key: {}", e)))
            }
        }
    }

    /// Base64 of the PKCS#1 DER encoding
    pub fn to_base64(&self) -> Result<String, CryptoError> {
        let der = self
            .0
            .to_pkcs1_der()
            .map_err(|e| CryptoError::Encoding(format!("failed to encode RSA public key: {}", e)))?;
        Ok(BASE64.encode(der.as_bytes()))
    }

    /// Encrypt a short string, returning base64 ciphertext
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let ciphertext = self
            .0
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext.as_bytes())
            .map_err(|e| CryptoError::Failure(format!("RSA encrypt failed: {}", e)))?;
        Ok(BASE64.encode(ciphertext))
    }
}

/// Private half of an account's bootstrap key
#[derive(Clone)]
pub struct RsaSecretKey(rsa::RsaPrivateKey);

impl fmt::Debug for RsaSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RsaSecretKey").field(&"<redacted>").finish()
    }
}

impl RsaSecretKey {
    /// Generate a new `RSA_KEY_BITS` key
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_bits(RSA_KEY_BITS)
    }

    /// Generate a key with an explicit modulus size
    pub fn generate_with_bits(bits: usize) -> Result<Self, CryptoError> {
        rsa::RsaPrivateKey::new(&mut OsRng, bits)
            .map(Self)
            .map_err(|e| CryptoError::Failure(format!("failed to create rsa key: {}", e)))
    }

    /// The public half of this key
    pub fn public(&self) -> RsaPublicKey {
        RsaPublicKey(self.0.to_public_key())
    }

    /// Decrypt base64 ciphertext produced by [`RsaPublicKey::encrypt`]
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let ciphertext = BASE64
            .decode(ciphertext)
            .map_err(|e| CryptoError::Encoding(format!("rsa ciphertext base64: {}", e)))?;
        let plaintext = self
            .0
            .decrypt(Pkcs1v15Encrypt, &ciphertext)
            .map_err(|_| CryptoError::Authentication)?;
        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Encoding(format!("rsa plaintext is not UTF-8: {}", e)))
    }

    /// Encode the key as PKCS#1 DER inside a PEM block tagged "PRIVATE KEY"
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        let der = self
            .0
            .to_pkcs1_der()
            .map_err(|e| CryptoError::Encoding(format!("failed to encode RSA key: {}", e)))?;
        Ok(pem::encode(&pem::Pem::new(PEM_TAG, der.as_bytes().to_vec())))
    }

    /// Parse a key written by [`RsaSecretKey::to_pem`]
    pub fn from_pem(pem_str: &str) -> Result<Self, CryptoError> {
        let pem = pem::parse(pem_str)
            .map_err(|e| CryptoError::Encoding(format!("failed to parse PEM: {}", e)))?;
        if pem.tag() != PEM_TAG {
            return Err(CryptoError::Encoding(format!(
                "invalid PEM tag, expected {}",
                PEM_TAG
            )));
        }
        rsa::RsaPrivateKey::from_pkcs1_der(pem.contents())
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid PKCS#1 private key: {}", e)))
    }
}

impl Serialize for RsaSecretKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let pem = self.to_pem().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&pem)
    }
}

impl<'de> Deserialize<'de> for RsaSecretKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pem = String::deserialize(deserializer)?;
        RsaSecretKey::from_pem(&pem).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Small modulus keeps the tests quick, the padding rules are identical
    const TEST_BITS: usize = 1024;

    #[test]
    fn test_encrypt_decrypt() {
        let key = RsaSecretKey::generate_with_bits(TEST_BITS).unwrap();
        let ciphertext = key.public().encrypt("alice-account-id").unwrap();
        assert_eq!(key.decrypt(&ciphertext).unwrap(), "alice-account-id");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let key = RsaSecretKey::generate_with_bits(TEST_BITS).unwrap();
        let other = RsaSecretKey::generate_with_bits(TEST_BITS).unwrap();
        let ciphertext = key.public().encrypt("hello").unwrap();
        assert!(other.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn test_public_key_base64_roundtrip() {
        let key = RsaSecretKey::generate_with_bits(TEST_BITS).unwrap();
        let encoded = key.public().to_base64().unwrap();
        let parsed = RsaPublicKey::from_base64(&encoded).unwrap();
        assert_eq!(parsed, key.public());
    }

    #[test]
    fn test_public_key_pkix_fallback() {
        use rsa::pkcs8::EncodePublicKey;

        let key = RsaSecretKey::generate_with_bits(TEST_BITS).unwrap();
        let der = key.0.to_public_key().to_public_key_der().unwrap();
        let parsed = RsaPublicKey::from_base64(&BASE64.encode(der.as_bytes())).unwrap();
        assert_eq!(parsed, key.public());
    }

    #[test]
    fn test_pem_roundtrip() {
        let key = RsaSecretKey::generate_with_bits(TEST_BITS).unwrap();
        let pem = key.to_pem().unwrap();
        let recovered = RsaSecretKey::from_pem(&pem).unwrap();
        assert_eq!(recovered.public(), key.public());

        let ciphertext = key.public().encrypt("roundtrip").unwrap();
        assert_eq!(recovered.decrypt(&ciphertext).unwrap(), "roundtrip");
    }
}
