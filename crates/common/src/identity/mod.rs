//! Local identity: account keys, ledger keys and handshake state
//!
//! Everything here lives inside the [`IdentityStore`], which is persisted as a
//!  single AES-GCM sealed file keyed by the SHA-256 of the user's passphrase.

mod store;

pub use store::{IdentityStore, StoreError};

use serde::{Deserialize, Serialize};

use crate::crypto::{CryptoError, PublicKey, RsaSecretKey, SecretKey};
use crate::ledger::AccountId;

/// The account's long-lived key material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Assigned by the remote service at signup; `None` until then
    pub account: Option<AccountId>,
    /// Public alias, also assigned at signup
    pub alias: Option<AccountId>,
    /// Signs blocks and requests as `account`
    pub identity_key: SecretKey,
    /// Signs as `alias`
    pub alias_key: SecretKey,
    /// Bootstrap key peers use to reach us before a shared secret exists
    pub rsa_key: RsaSecretKey,
}

impl Identity {
    /// Fresh keys with no account attached yet
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self {
            account: None,
            alias: None,
            identity_key: SecretKey::generate(),
            alias_key: SecretKey::generate(),
            rsa_key: RsaSecretKey::generate()?,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity_key.public()
    }

    pub fn alias_public_key(&self) -> PublicKey {
        self.alias_key.public()
    }
}

/// Where a pending handshake stands from our side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// We sent an Init and wait for the Response
    AwaitingResponse,
    /// We answered an Init and wait for the Ack
    AwaitingAck,
}

/// In-flight key exchange with one remote account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConnection {
    pub status: PendingStatus,
    /// Our ephemeral key for this exchange, discarded once it completes
    pub ephemeral_key: SecretKey,
    /// The peer's ephemeral public key, known once they have spoken
    #[serde(default)]
    pub remote_ephemeral: Option<PublicKey>,
    /// Introduction message received with an Init
    #[serde(default)]
    pub message: Option<String>,
}

impl PendingConnection {
    pub fn awaiting_response(ephemeral_key: SecretKey) -> Self {
        Self {
            status: PendingStatus::AwaitingResponse,
            ephemeral_key,
            remote_ephemeral: None,
            message: None,
        }
    }

    pub fn awaiting_ack(
        ephemeral_key: SecretKey,
        remote_ephemeral: PublicKey,
        message: Option<String>,
    ) -> Self {
        Self {
            status: PendingStatus::AwaitingAck,
            ephemeral_key,
            remote_ephemeral: Some(remote_ephemeral),
            message,
        }
    }
}

/// Contact card for an established connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub account: AccountId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub background: String,
    /// Reached through a one-on-one handshake rather than an introduction
    #[serde(default)]
    pub direct: bool,
}

impl Connection {
    /// A bare card for an account we completed a handshake with
    pub fn direct(account: AccountId) -> Self {
        Self {
            account,
            name: String::new(),
            headline: String::new(),
            email: String::new(),
            phone: String::new(),
            image: String::new(),
            background: String::new(),
            direct: true,
        }
    }
}
