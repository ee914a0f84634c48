//! Key agreement using P-521 ECDH + HKDF-SHA256
//!
//! Both sides of a handshake hold an ephemeral P-521 keypair. Combining a
//! local private key with the remote public key yields the same curve point on
//! both ends; its x-coordinate is stretched through HKDF-SHA256 (no salt, no
//! info) into a uniform 256-bit [`Secret`].
//!
//! ```text
//! derive(a.secret, b.public) == derive(b.secret, a.public)
//! ```

use hkdf::Hkdf;
use sha2::Sha256;

use super::keys::{PublicKey, SecretKey};
use super::secret::{Secret, SECRET_SIZE};
use super::CryptoError;

/// Derive the shared 32-byte secret between a local private key and a remote public key
///
/// # Errors
///
/// Returns an error if HKDF refuses the requested output length, which cannot
///  happen for a 32-byte output but is surfaced rather than assumed.
pub fn derive_shared_secret(local: &SecretKey, remote: &PublicKey) -> Result<Secret, CryptoError> {
    let shared = p521::ecdh::diffie_hellman(local.to_nonzero_scalar(), remote.as_affine());

    let kdf = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());
    let mut okm = [0u8; SECRET_SIZE];
    kdf.expand(&[], &mut okm)
        .map_err(|e| CryptoError::Failure(format!("HKDF expand failed: {}", e)))?;

    Ok(Secret::from(okm))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shared_secret_symmetry() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();

        let alice_view = derive_shared_secret(&alice, &bob.public()).unwrap();
        let bob_view = derive_shared_secret(&bob, &alice.public()).unwrap();
        assert_eq!(alice_view, bob_view);
    }

    #[test]
    fn test_shared_secret_differs_per_peer() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();
        let carol = SecretKey::generate();

        let with_bob = derive_shared_secret(&alice, &bob.public()).unwrap();
        let with_carol = derive_shared_secret(&alice, &carol.public()).unwrap();
        assert_ne!(with_bob, with_carol);
    }

    #[test]
    fn test_shared_secret_encrypts_across_parties() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();

        let alice_view = derive_shared_secret(&alice, &bob.public()).unwrap();
        let bob_view = derive_shared_secret(&bob, &alice.public()).unwrap();

        let sealed = alice_view.encrypt(b"All Set").unwrap();
        assert_eq!(bob_view.decrypt(&sealed).unwrap(), b"All Set");
    }
}
