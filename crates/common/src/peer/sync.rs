//! Ledger synchronization
//!
//! Syncing asks the service for a ledger's head and, when it differs from
//!  the local checkpoint, walks backwards along parent addresses until it
//!  reaches the checkpoint, the start of the ledger or a block the service
//!  no longer has. Every block on the way is verified, decrypted, decoded
//!  and dispatched: handshake messages to the key exchange, everything else
//!  to a [`PayloadHandler`]. Blocks are therefore delivered newest first.
//!
//! A block that fails verification or decryption is recorded in the
//!  [`SyncReport`] and skipped; it never aborts the walk. A failure to reach
//!  the service or the key directory does, including one hit while answering
//!  a handshake. The checkpoint then stays where it was and the next sync
//!  repeats the walk; handshake handlers recognise steps already applied.

use std::collections::{HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use super::{HandshakeError, HandshakeOutcome, Peer};
use crate::crypto::{CryptoError, PublicKey};
use crate::identity::StoreError;
use crate::ledger::{
    AccountId, BlockAddress, BlockPayload, Ledger, LedgerHeadQuery, LedgerId, LedgerType,
    SignedBlock,
};
use crate::remote::{KeyDirectory, LedgerService, RemoteError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote service error: {0}")]
    Remote(#[from] RemoteError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("identity store error: {0}")]
    Store(#[from] StoreError),
    #[error("unknown ledger: {0}")]
    UnknownLedger(LedgerId),
}

/// Sync behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Refuse to dispatch blocks whose signature does not verify.
    ///  When off, such blocks are logged and dispatched anyway.
    pub strict_signature_verification: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strict_signature_verification: true,
        }
    }
}

/// Why a block was not delivered (or was delivered with a caveat)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFailure {
    /// The author signature did not verify, or the author's key could not be found
    SignatureInvalid {
        address: BlockAddress,
        author: AccountId,
        reason: String,
    },
    /// The contents did not decrypt under the ledger key
    Authentication { address: BlockAddress },
    /// The ledger is encrypted but we hold no key for it
    MissingLedgerKey { address: BlockAddress },
    /// Contents were not valid base64 or not a valid payload
    Decode { address: BlockAddress, reason: String },
    /// A handshake message could not be applied
    Handshake { address: BlockAddress, reason: String },
}

impl BlockFailure {
    pub fn address(&self) -> &BlockAddress {
        match self {
            BlockFailure::SignatureInvalid { address, .. }
            | BlockFailure::Authentication { address }
            | BlockFailure::MissingLedgerKey { address }
            | BlockFailure::Decode { address, .. }
            | BlockFailure::Handshake { address, .. } => address,
        }
    }
}

impl std::fmt::Display for BlockFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockFailure::SignatureInvalid {
                address,
                author,
                reason,
            } => write!(f, "{}: bad signature from {} ({})", address, author, reason),
            BlockFailure::Authentication { address } => {
                write!(f, "{}: contents failed authentication", address)
            }
            BlockFailure::MissingLedgerKey { address } => write!(f, "{}: no ledger key", address),
            BlockFailure::Decode { address, reason } => write!(f, "{}: {}", address, reason),
            BlockFailure::Handshake { address, reason } => {
                write!(f, "{}: handshake failed: {}", address, reason)
            }
        }
    }
}

/// Result of syncing one ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub ledger: LedgerId,
    /// Checkpoint before the sync
    pub previous: BlockAddress,
    /// Checkpoint after the sync: the head reported when it began
    pub head: BlockAddress,
    /// Blocks dispatched, newest first
    pub delivered: Vec<BlockAddress>,
    pub handshakes: Vec<HandshakeOutcome>,
    pub failures: Vec<BlockFailure>,
}

impl SyncReport {
    fn new(ledger: LedgerId, previous: BlockAddress, head: BlockAddress) -> Self {
        Self {
            ledger,
            previous,
            head,
            delivered: Vec::new(),
            handshakes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.previous == self.head
    }
}

/// Receives application payloads found while syncing
pub trait PayloadHandler: Send {
    fn handle(&mut self, ledger: &Ledger, address: &BlockAddress, block: &SignedBlock, payload: BlockPayload);
}

/// Discards every payload
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl PayloadHandler for NoopHandler {
    fn handle(&mut self, _: &Ledger, _: &BlockAddress, _: &SignedBlock, _: BlockPayload) {}
}

impl<F> PayloadHandler for F
where
    F: FnMut(&Ledger, &BlockAddress, &SignedBlock, BlockPayload) + Send,
{
    fn handle(&mut self, ledger: &Ledger, address: &BlockAddress, block: &SignedBlock, payload: BlockPayload) {
        self(ledger, address, block, payload)
    }
}

impl<S: LedgerService + KeyDirectory> Peer<S> {
    /// Bring one ledger up to date with the service
    pub async fn sync_ledger<H: PayloadHandler>(
        &mut self,
        id: &LedgerId,
        handler: &mut H,
    ) -> Result<SyncReport, SyncError> {
        let ledger = self
            .store
            .ledger(id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownLedger(id.clone()))?;

        let query = LedgerHeadQuery::sign(
            self.account_id()?,
            id.clone(),
            &self.store.identity().identity_key,
        )?;
        let head = self.remote.ledger_head(query).await?;
        let previous = ledger.last_block.clone();
        let mut report = SyncReport::new(id.clone(), previous.clone(), head.clone());

        if head == previous {
            tracing::info!("ledger {} already up to date", id);
            return Ok(report);
        }

        let mut authors: HashMap<AccountId, Result<PublicKey, String>> = HashMap::new();
        let mut visited = HashSet::new();
        let mut address = head.clone();

        while !address.is_terminal() {
            if !visited.insert(address.clone()) {
                tracing::warn!("ledger {} loops back to {}, stopping", id, address);
                break;
            }

            tracing::debug!("fetching block {}", address);
            let Some(block) = self.remote.fetch_block(&address).await? else {
                tracing::info!("block {} not found, end of reachable history", address);
                break;
            };

            self.process_block(&ledger, &address, &block, handler, &mut authors, &mut report)
                .await?;

            let parent = block.parent_block;
            if parent.is_terminal() || parent == previous {
                break;
            }
            address = parent;
        }

        self.store.set_checkpoint(id, head)?;
        tracing::info!(
            "synced ledger {}: {} delivered, {} failed",
            id,
            report.delivered.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Sync every known ledger, collecting a result per ledger
    pub async fn sync_all<H: PayloadHandler>(
        &mut self,
        handler: &mut H,
    ) -> Vec<(LedgerId, Result<SyncReport, SyncError>)> {
        let ids: Vec<LedgerId> = self.store.ledgers().iter().map(|l| l.id.clone()).collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.sync_ledger(&id, handler).await;
            if let Err(e) = &result {
                tracing::error!("failed to sync ledger {}: {}", id, e);
            }
            results.push((id, result));
        }
        results
    }

    async fn process_block<H: PayloadHandler>(
        &mut self,
        ledger: &Ledger,
        address: &BlockAddress,
        block: &SignedBlock,
        handler: &mut H,
        authors: &mut HashMap<AccountId, Result<PublicKey, String>>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let author = block.author().clone();

        if !authors.contains_key(&author) {
            let key = match self.remote.identity_key(&author).await {
                Ok(key) => Ok(key),
                Err(e) if e.is_not_found() => Err(e.to_string()),
                Err(e) => return Err(e.into()),
            };
            authors.insert(author.clone(), key);
        }
        let verified = match authors.get(&author) {
            Some(Ok(key)) if block.verify(key) => Ok(()),
            Some(Ok(_)) => Err("signature does not verify".to_string()),
            Some(Err(e)) => Err(format!("author key unavailable: {}", e)),
            None => Err("author key unavailable".to_string()),
        };
        if let Err(reason) = verified {
            tracing::warn!("block {} from {}: {}", address, author, reason);
            report.failures.push(BlockFailure::SignatureInvalid {
                address: address.clone(),
                author: author.clone(),
                reason,
            });
            if self.config.strict_signature_verification {
                return Ok(());
            }
        }

        let plaintext = match self.open_contents(ledger, address, block) {
            Ok(plaintext) => plaintext,
            Err(failure) => {
                tracing::warn!("skipping block {}", failure);
                report.failures.push(failure);
                return Ok(());
            }
        };

        let payload = match BlockPayload::decode(&block.block.block_type, &plaintext) {
            Ok(payload) => payload,
            Err(e) => {
                report.failures.push(BlockFailure::Decode {
                    address: address.clone(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        if block.block.block_type.is_handshake() {
            if ledger.ledger_type != LedgerType::Requests {
                report.failures.push(BlockFailure::Handshake {
                    address: address.clone(),
                    reason: "handshake message outside a request inbox".to_string(),
                });
                return Ok(());
            }
            let outcome = match payload {
                BlockPayload::HandshakeInit(init) => self.handle_init(&author, init).await,
                BlockPayload::HandshakeResponse(response) => {
                    self.handle_response(&author, response).await
                }
                BlockPayload::HandshakeAck(sealed) => self.handle_ack(&author, &sealed),
                _ => return Ok(()),
            };
            match outcome {
                Ok(outcome) => {
                    report.handshakes.push(outcome);
                    report.delivered.push(address.clone());
                }
                // Retried by the next walk
                Err(HandshakeError::Remote(e)) if !e.is_not_found() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("handshake block {} from {}: {}", address, author, e);
                    report.failures.push(BlockFailure::Handshake {
                        address: address.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            return Ok(());
        }

        handler.handle(ledger, address, block, payload);
        report.delivered.push(address.clone());
        Ok(())
    }

    /// Base64-decode and, for encrypted ledgers, decrypt a block's contents
    fn open_contents(
        &self,
        ledger: &Ledger,
        address: &BlockAddress,
        block: &SignedBlock,
    ) -> Result<Vec<u8>, BlockFailure> {
        let bytes = BASE64
            .decode(block.block.contents.trim())
            .map_err(|e| BlockFailure::Decode {
                address: address.clone(),
                reason: format!("contents are not base64: {}", e),
            })?;

        if !ledger.is_encrypted() {
            return Ok(bytes);
        }

        let secret = self
            .store
            .ledger_key(&ledger.id)
            .and_then(|key| key.secret.as_ref())
            .ok_or_else(|| BlockFailure::MissingLedgerKey {
                address: address.clone(),
            })?;
        secret.decrypt(&bytes).map_err(|_| BlockFailure::Authentication {
            address: address.clone(),
        })
    }
}
