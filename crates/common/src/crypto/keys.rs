use std::fmt;
use std::ops::Deref;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p521::ecdsa::{Signature, SigningKey, VerifyingKey};
use p521::elliptic_curve::sec1::ToEncodedPoint;
use p521::FieldBytes;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::CryptoError;

/// Size of a P-521 private scalar in bytes
pub const PRIVATE_KEY_SIZE: usize = 66;
/// Size of an uncompressed P-521 point in bytes (`0x04 || X || Y`)
pub const PUBLIC_KEY_SIZE: usize = 1 + 2 * PRIVATE_KEY_SIZE;

const PEM_TAG: &str = "PRIVATE KEY";

/// SHA-256 digest of `msg`, right-aligned in a P-521 field element.
///
/// The integer value is the digest itself, which is how other ECDSA
///  implementations treat a hash shorter than the group order.
fn prehash(msg: &[u8]) -> FieldBytes {
    let digest = Sha256::digest(msg);
    let mut field = FieldBytes::default();
    let offset = field.len() - digest.len();
    field[offset..].copy_from_slice(&digest);
    field
}

/// Public key for account identity, block authorship and key agreement
///
/// A thin wrapper around a P-521 point. On the wire it travels as the
///  uncompressed SEC1 encoding (`0x04 || X || Y`), base64 encoded.
///
/// # Examples
///
/// ```ignore
/// let secret_key = SecretKey::generate();
/// let public_key = secret_key.public();
///
/// let encoded = public_key.to_base64();
/// let recovered = PublicKey::from_base64(&encoded)?;
/// assert_eq!(public_key, recovered);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(p521::PublicKey);

impl Deref for PublicKey {
    type Target = p521::PublicKey;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<p521::PublicKey> for PublicKey {
    fn from(key: p521::PublicKey) -> Self {
        PublicKey(key)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = CryptoError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.is_empty() {
            return Err(CryptoError::InvalidKey("empty public key".to_string()));
        }
        let key = p521::PublicKey::from_sec1_bytes(bytes)
            .map_err(|_| CryptoError::InvalidKey("public key is not a P-521 point".to_string()))?;
        Ok(PublicKey(key))
    }
}

impl PublicKey {
    /// Parse a public key from its base64 encoded raw point
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Encoding(format!("public key base64: {}", e)))?;
        Self::try_from(bytes.as_slice())
    }

    /// Uncompressed SEC1 encoding of the point
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Base64 of the uncompressed SEC1 encoding
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Hex SHA-256 of the encoded point, for showing keys to people
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.to_bytes()))
    }

    /// Verify an ASN.1 DER ECDSA signature over the SHA-256 digest of `msg`.
    ///
    /// Malformed signatures simply fail verification.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        let signature = match Signature::from_der(signature) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        let verifying_key = match VerifyingKey::from_sec1_bytes(&self.to_bytes()) {
            Ok(key) => key,
            Err(_) => return false,
        };
        verifying_key
            .verify_prehash(&prehash(msg), &signature)
            .is_ok()
    }

    /// Verify a base64 encoded DER signature, see [`PublicKey::verify`]
    pub fn verify_base64(&self, msg: &[u8], signature: &str) -> bool {
        match BASE64.decode(signature) {
            Ok(der) => self.verify(msg, &der),
            Err(_) => false,
        }
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Secret key for account identity and key agreement
///
/// A thin wrapper around a P-521 private scalar. The same key type backs the
///  long-term identity, the public alias identity and the ephemeral keys of
///  a handshake.
///
/// # Security Considerations
///
/// - Never share this key over the network
/// - Only persist it inside the encrypted identity store
///
/// # Examples
///
/// ```ignore
/// let secret_key = SecretKey::generate();
///
/// let pem = secret_key.to_pem()?;
/// let recovered = SecretKey::from_pem(&pem)?;
/// assert_eq!(secret_key.public(), recovered.public());
/// ```
#[derive(Clone)]
pub struct SecretKey(p521::SecretKey);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&"<redacted>").finish()
    }
}

impl Deref for SecretKey {
    type Target = p521::SecretKey;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<p521::SecretKey> for SecretKey {
    fn from(key: p521::SecretKey) -> Self {
        SecretKey(key)
    }
}

impl SecretKey {
    /// Generate a new random secret key using the operating system RNG
    pub fn generate() -> Self {
        Self(p521::SecretKey::random(&mut OsRng))
    }

    /// Load a secret key from its big-endian scalar bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "invalid private key size, expected {}, got {}",
                PRIVATE_KEY_SIZE,
                bytes.len()
            )));
        }
        let key = p521::SecretKey::from_slice(bytes)
            .map_err(|_| CryptoError::InvalidKey("private key out of range".to_string()))?;
        Ok(Self(key))
    }

    /// Big-endian scalar bytes of this key
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    /// Derive the public key from this secret key
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Encode the key as SEC1 DER inside a PEM block tagged "PRIVATE KEY"
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        let der = self
            .0
            .to_sec1_der()
            .map_err(|e| CryptoError::Encoding(format!("failed to encode private key: {}", e)))?;
        let pem = pem::Pem::new(PEM_TAG, der.to_vec());
        Ok(pem::encode(&pem))
    }

    /// Parse a secret key from PEM format
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The PEM string is malformed
    /// - The PEM tag is not "PRIVATE KEY"
    /// - The contents are not a SEC1 encoded P-521 key
    pub fn from_pem(pem_str: &str) -> Result<Self, CryptoError> {
        let pem = pem::parse(pem_str)
            .map_err(|e| CryptoError::Encoding(format!("failed to parse PEM: {}", e)))?;

        if pem.tag() != PEM_TAG {
            return Err(CryptoError::Encoding(format!(
                "invalid PEM tag, expected {}",
                PEM_TAG
            )));
        }

        let key = p521::SecretKey::from_sec1_der(pem.contents())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid SEC1 private key: {}", e)))?;
        Ok(Self(key))
    }

    /// Sign the SHA-256 digest of `msg`, returning an ASN.1 DER signature
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signing_key = SigningKey::from_bytes(&self.0.to_bytes())
            .map_err(|e| CryptoError::InvalidKey(format!("unusable signing key: {}", e)))?;
        let signature: Signature = signing_key
            .sign_prehash(&prehash(msg))
            .map_err(|e| CryptoError::Failure(format!("failed to sign: {}", e)))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    /// Sign `msg` and base64 encode the DER signature
    pub fn sign_base64(&self, msg: &[u8]) -> Result<String, CryptoError> {
        Ok(BASE64.encode(self.sign(msg)?))
    }
}

impl Serialize for SecretKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let pem = self.to_pem().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&pem)
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pem = String::deserialize(deserializer)?;
        SecretKey::from_pem(&pem).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let private_key = SecretKey::generate();
        let public_key = private_key.public();

        let recovered_private = SecretKey::from_slice(&private_key.to_bytes()).unwrap();
        assert_eq!(private_key.to_bytes(), recovered_private.to_bytes());

        let encoded = public_key.to_base64();
        let recovered_public = PublicKey::from_base64(&encoded).unwrap();
        assert_eq!(public_key, recovered_public);
        assert_eq!(public_key.to_bytes().len(), PUBLIC_KEY_SIZE);
    }

    #[test]
    fn test_pem_serialization() {
        let private_key = SecretKey::generate();

        let pem = private_key.to_pem().unwrap();
        assert!(pem.contains("PRIVATE KEY"));
        let recovered_private = SecretKey::from_pem(&pem).unwrap();
        assert_eq!(private_key.to_bytes(), recovered_private.to_bytes());
        assert_eq!(private_key.public(), recovered_private.public());
    }

    #[test]
    fn test_pem_wrong_tag() {
        let pem = pem::encode(&pem::Pem::new("CERTIFICATE", vec![1, 2, 3]));
        assert!(SecretKey::from_pem(&pem).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let secret_key = SecretKey::generate();
        let public_key = secret_key.public();
        let message = b"hello, world!";

        let signature = secret_key.sign(message).unwrap();
        assert!(public_key.verify(message, &signature));

        // Verify fails with wrong message
        assert!(!public_key.verify(b"hello, world?", &signature));

        // Verify fails with wrong key
        let other_key = SecretKey::generate().public();
        assert!(!other_key.verify(message, &signature));
    }

    #[test]
    fn test_verify_malformed_signature() {
        let public_key = SecretKey::generate().public();
        assert!(!public_key.verify(b"data", &[]));
        assert!(!public_key.verify(b"data", &[0x30, 0x02, 0x01]));
        assert!(!public_key.verify_base64(b"data", "not base64!"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let key = SecretKey::generate().public();
        assert_eq!(key.fingerprint(), key.fingerprint());
        assert_eq!(key.fingerprint().len(), 64);
        assert_ne!(key.fingerprint(), SecretKey::generate().public().fingerprint());
    }

    #[test]
    fn test_empty_public_key_rejected() {
        assert!(PublicKey::try_from(&[][..]).is_err());
        assert!(PublicKey::from_base64("").is_err());
    }

    #[test]
    fn test_serde_json_roundtrip() {
        let secret_key = SecretKey::generate();
        let json = serde_json::to_string(&secret_key).unwrap();
        let recovered: SecretKey = serde_json::from_str(&json).unwrap();
        assert_eq!(secret_key.public(), recovered.public());

        let json = serde_json::to_string(&secret_key.public()).unwrap();
        let recovered: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(secret_key.public(), recovered);
    }
}
