//! Three-message key exchange establishing a one-on-one ledger
//!
//! ```text
//!  initiator (A)                                    responder (B)
//!  ----------------------------------------------------------------
//!  connect: pending[B] = awaiting-response
//!     ke0 Init {eph_A, rsa_B(A), rsa_B(msg)}  --->  inbox of B
//!                                                   handle_init: pending[A] = awaiting-ack
//!  inbox of A  <---  ke1 Response {eph_B, rsa_A(B)}
//!  handle_response: s = HKDF(ECDH(eph_A, eph_B))
//!     create ledger L, key s
//!     ke2 Ack seal_s({A, "All Set", L})       --->  inbox of B
//!                                                   handle_ack: s = HKDF(ECDH(eph_B, eph_A))
//!                                                   save ledger L, key s
//! ```
//!
//! Handlers run while syncing a request inbox. Local state changes only
//!  once a step's cryptography and remote writes have succeeded.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::{Peer, PeerError};
use crate::crypto::{derive_shared_secret, CryptoError, PublicKey, SecretKey};
use crate::identity::{Connection, PendingConnection, PendingStatus, StoreError};
use crate::ledger::{
    AccountId, BlockType, KeyExchangeAck, KeyExchangeInit, KeyExchangeResponse, LedgerId,
    LedgerType, ACK_CONFIRMATION,
};
use crate::remote::{KeyDirectory, LedgerService, RemoteError};

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// A message arrived that the local handshake state cannot accept
    #[error("handshake protocol error: {0}")]
    ProtocolState(String),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("remote service error: {0}")]
    Remote(#[from] RemoteError),
    #[error("malformed handshake message: {0}")]
    Decode(String),
    #[error("identity store error: {0}")]
    Store(#[from] StoreError),
}

impl From<PeerError> for HandshakeError {
    fn from(e: PeerError) -> Self {
        match e {
            PeerError::Store(e) => Self::Store(e),
            PeerError::Remote(e) => Self::Remote(e),
            PeerError::Crypto(e) => Self::Crypto(e),
            PeerError::MissingLedgerKey(id) => {
                Self::ProtocolState(format!("no key for ledger {}", id))
            }
            PeerError::Encode(e) => Self::Decode(e.to_string()),
            PeerError::MissingRemote => Self::ProtocolState(PeerError::MissingRemote.to_string()),
        }
    }
}

impl From<serde_json::Error> for HandshakeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// What a handled handshake message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// We answered an Init and now wait for the Ack
    Responded { remote: AccountId },
    /// The exchange completed; the one-on-one ledger is usable
    Established { remote: AccountId, ledger: LedgerId },
    /// A replay of a step already applied
    AlreadyHandled { remote: AccountId },
}

fn ephemeral_key(encoded: &str) -> Result<PublicKey, HandshakeError> {
    if encoded.is_empty() {
        return Err(HandshakeError::ProtocolState(
            "empty ephemeral public key".to_string(),
        ));
    }
    Ok(PublicKey::from_base64(encoded)?)
}

impl<S: LedgerService + KeyDirectory> Peer<S> {
    /// Ask `remote` for a connection by posting an Init to their request inbox
    ///
    /// Any exchange already pending with `remote` is replaced.
    pub async fn connect(&mut self, remote: &AccountId, message: &str) -> Result<(), HandshakeError> {
        let account = self.account_id()?;
        tracing::info!("starting key exchange with {}", remote);

        let rsa = self.remote.rsa_key(remote).await?;
        let ephemeral = SecretKey::generate();
        let init = KeyExchangeInit {
            ephemeral_public_key: ephemeral.public().to_base64(),
            uuid: rsa.encrypt(account.as_str())?,
            message: rsa.encrypt(message)?,
        };
        let body = serde_json::to_vec(&init)?;

        // Recorded before sending so a fast Response always finds it
        let previous = self
            .store
            .insert_pending(remote.clone(), PendingConnection::awaiting_response(ephemeral));

        let inbox = LedgerId::inbox_for(remote);
        if let Err(e) = self.write_block(&inbox, BlockType::HandshakeInit, &body).await {
            match previous {
                Some(previous) => {
                    self.store.insert_pending(remote.clone(), previous);
                }
                None => {
                    self.store.remove_pending(remote);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Answer an Init found in our inbox
    pub(super) async fn handle_init(
        &mut self,
        author: &AccountId,
        init: KeyExchangeInit,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let remote_ephemeral = ephemeral_key(&init.ephemeral_public_key)?;
        let rsa_key = &self.store.identity().rsa_key;
        let sender = AccountId::new(rsa_key.decrypt(&init.uuid)?);
        if &sender != author {
            return Err(HandshakeError::ProtocolState(format!(
                "init claims to be from {} but was signed by {}",
                sender, author
            )));
        }
        let message = if init.message.is_empty() {
            None
        } else {
            Some(rsa_key.decrypt(&init.message)?).filter(|m| !m.is_empty())
        };

        if let Some(pending) = self.store.pending(&sender) {
            if pending.status == PendingStatus::AwaitingAck
                && pending.remote_ephemeral.as_ref() == Some(&remote_ephemeral)
            {
                tracing::debug!("init from {} already answered", sender);
                return Ok(HandshakeOutcome::AlreadyHandled { remote: sender });
            }
        }
        tracing::info!(
            "connection request from {}: {}",
            sender,
            message.as_deref().unwrap_or("")
        );

        let account = self.account_id()?;
        let rsa = self.remote.rsa_key(&sender).await?;
        let ephemeral = SecretKey::generate();
        let response = KeyExchangeResponse {
            ephemeral_public_key: ephemeral.public().to_base64(),
            uuid: rsa.encrypt(account.as_str())?,
        };
        let body = serde_json::to_vec(&response)?;
        self.write_block(&LedgerId::inbox_for(&sender), BlockType::HandshakeResponse, &body)
            .await?;

        self.store.insert_pending(
            sender.clone(),
            PendingConnection::awaiting_ack(ephemeral, remote_ephemeral, message),
        );
        Ok(HandshakeOutcome::Responded { remote: sender })
    }

    /// Complete an exchange we started: derive the secret, create the
    ///  ledger and send the sealed Ack
    pub(super) async fn handle_response(
        &mut self,
        author: &AccountId,
        response: KeyExchangeResponse,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let responder = AccountId::new(self.store.identity().rsa_key.decrypt(&response.uuid)?);
        if &responder != author {
            return Err(HandshakeError::ProtocolState(format!(
                "response claims to be from {} but was signed by {}",
                responder, author
            )));
        }
        let remote_ephemeral = ephemeral_key(&response.ephemeral_public_key)?;

        let pending = match self.store.pending(&responder) {
            Some(pending) if pending.status == PendingStatus::AwaitingResponse => pending,
            _ => {
                return Err(HandshakeError::ProtocolState(format!(
                    "response from {} with no pending connection",
                    responder
                )))
            }
        };
        let secret = derive_shared_secret(&pending.ephemeral_key, &remote_ephemeral)?;

        let ledger = self
            .request_ledger(LedgerType::OneOnOne, vec![responder.clone()])
            .await?;

        let ack = KeyExchangeAck {
            uuid: self.account_id()?.to_string(),
            test: ACK_CONFIRMATION.to_string(),
            ledger_uuid: ledger.id.to_string(),
        };
        let sealed = secret.encrypt(&serde_json::to_vec(&ack)?)?;
        self.write_encoded(
            &LedgerId::inbox_for(&responder),
            BlockType::HandshakeAck,
            BASE64.encode(sealed),
        )
        .await?;

        let id = ledger.id.clone();
        self.store.add_ledger(ledger, Some(secret));
        self.store.remove_pending(&responder);
        self.store.add_connection(Connection::direct(responder.clone()));
        tracing::info!("connected to {} on ledger {}", responder, id);

        Ok(HandshakeOutcome::Established {
            remote: responder,
            ledger: id,
        })
    }

    /// Finish an exchange we answered: open the Ack and save the ledger
    pub(super) fn handle_ack(
        &mut self,
        author: &AccountId,
        sealed: &[u8],
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let pending = match self.store.pending(author) {
            Some(pending) if pending.status == PendingStatus::AwaitingAck => pending,
            _ => {
                if let Some(ledger) = self.held_ledger_for_ack(author, sealed) {
                    tracing::debug!("ack for ledger {} already applied", ledger);
                    return Ok(HandshakeOutcome::AlreadyHandled {
                        remote: author.clone(),
                    });
                }
                return Err(HandshakeError::ProtocolState(format!(
                    "ack from {} with no pending connection",
                    author
                )));
            }
        };
        let remote_ephemeral = pending.remote_ephemeral.as_ref().ok_or_else(|| {
            HandshakeError::ProtocolState(format!("no ephemeral key recorded for {}", author))
        })?;

        let secret = derive_shared_secret(&pending.ephemeral_key, remote_ephemeral)?;
        let ack: KeyExchangeAck = serde_json::from_slice(&secret.decrypt(sealed)?)?;
        if ack.test != ACK_CONFIRMATION || ack.uuid != author.as_str() {
            return Err(HandshakeError::ProtocolState(format!(
                "ack from {} failed confirmation",
                author
            )));
        }

        let ledger = LedgerId::new(ack.ledger_uuid);
        self.store.save_ledger(
            ledger.clone(),
            LedgerType::OneOnOne,
            Some(secret),
            vec![author.clone()],
        );
        self.store.remove_pending(author);
        self.store.add_connection(Connection::direct(author.clone()));
        tracing::info!("connected to {} on ledger {}", author, ledger);

        Ok(HandshakeOutcome::Established {
            remote: author.clone(),
            ledger,
        })
    }

    /// A one-on-one ledger with `author` whose key opens `sealed`
    ///  and which the Ack inside names
    fn held_ledger_for_ack(&self, author: &AccountId, sealed: &[u8]) -> Option<LedgerId> {
        self.store
            .ledgers()
            .iter()
            .filter(|ledger| ledger.ledger_type == LedgerType::OneOnOne)
            .filter(|ledger| ledger.participants().any(|p| p == author))
            .find_map(|ledger| {
                let secret = self.store.ledger_key(&ledger.id)?.secret.as_ref()?;
                let plaintext = secret.decrypt(sealed).ok()?;
                let ack: KeyExchangeAck = serde_json::from_slice(&plaintext).ok()?;
                (ack.ledger_uuid == ledger.id.as_str()).then(|| ledger.id.clone())
            })
    }
}
