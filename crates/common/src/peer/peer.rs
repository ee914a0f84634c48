use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::{PeerError, SyncConfig};
use crate::crypto::Secret;
use crate::identity::{IdentityStore, StoreError};
use crate::ledger::{
    AccountId, Block, BlockAddress, BlockType, Ledger, LedgerCreateRequest, LedgerId,
    LedgerTemplate, LedgerType, Message, SignedBlock,
};
use crate::remote::{KeyDirectory, LedgerService};

pub struct PeerBuilder<S> {
    store: Option<IdentityStore>,
    remote: Option<S>,
    config: SyncConfig,
}

impl<S> Default for PeerBuilder<S> {
    fn default() -> Self {
        Self {
            store: None,
            remote: None,
            config: SyncConfig::default(),
        }
    }
}

impl<S: LedgerService + KeyDirectory> PeerBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: IdentityStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn remote(mut self, remote: S) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the peer, generating a fresh identity if no store was given
    pub fn build(self) -> Result<Peer<S>, PeerError> {
        let remote = self.remote.ok_or(PeerError::MissingRemote)?;
        let store = match self.store {
            Some(store) => store,
            None => IdentityStore::generate()?,
        };
        Ok(Peer {
            store,
            remote,
            config: self.config,
        })
    }
}

/// A client bound to one identity and one remote service
#[derive(Debug)]
pub struct Peer<S> {
    pub(super) store: IdentityStore,
    pub(super) remote: S,
    pub(super) config: SyncConfig,
}

impl<S: LedgerService + KeyDirectory> Peer<S> {
    pub fn new(store: IdentityStore, remote: S) -> Self {
        Self {
            store,
            remote,
            config: SyncConfig::default(),
        }
    }

    pub fn builder() -> PeerBuilder<S> {
        PeerBuilder::new()
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut IdentityStore {
        &mut self.store
    }

    pub fn into_store(self) -> IdentityStore {
        self.store
    }

    pub fn remote(&self) -> &S {
        &self.remote
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn account_id(&self) -> Result<AccountId, StoreError> {
        self.store.account_id().cloned()
    }

    /// Append `plaintext` to a ledger
    ///
    /// Encrypted ledgers seal the payload under their ledger key first.
    ///  Plaintext ledgers, and ledgers we hold no record of (such as
    ///  another account's request inbox), carry the payload as is.
    pub async fn write_block(
        &self,
        ledger: &LedgerId,
        block_type: BlockType,
        plaintext: &[u8],
    ) -> Result<BlockAddress, PeerError> {
        let contents = match self.store.ledger(ledger) {
            Some(record) if record.is_encrypted() => {
                let secret = self
                    .store
                    .ledger_key(ledger)
                    .and_then(|key| key.secret.as_ref())
                    .ok_or_else(|| PeerError::MissingLedgerKey(ledger.clone()))?;
                BASE64.encode(secret.encrypt(plaintext)?)
            }
            _ => BASE64.encode(plaintext),
        };
        self.write_encoded(ledger, block_type, contents).await
    }

    /// Sign and append a block whose contents are already base64 encoded
    pub(super) async fn write_encoded(
        &self,
        ledger: &LedgerId,
        block_type: BlockType,
        contents: String,
    ) -> Result<BlockAddress, PeerError> {
        let author = self.account_id()?;
        let block = Block::new(author, ledger.clone(), contents, block_type);
        let signed = SignedBlock::sign(block, &self.store.identity().identity_key)?;

        let address = self.remote.write_block(signed).await?;
        tracing::debug!("wrote block {} to ledger {}", address, ledger);
        Ok(address)
    }

    /// Post a chat message
    pub async fn send_message(&self, ledger: &LedgerId, text: &str) -> Result<BlockAddress, PeerError> {
        let message = Message {
            author: self.account_id()?.to_string(),
            message: text.to_string(),
        };
        let body = serde_json::to_vec(&message)?;
        self.write_block(ledger, BlockType::Message, &body).await
    }

    /// Create a ledger on the service and record it locally
    ///
    /// Encrypted kinds get a freshly generated key when none is supplied.
    pub async fn create_ledger(
        &mut self,
        kind: LedgerType,
        secret: Option<Secret>,
        participants: Vec<AccountId>,
    ) -> Result<LedgerId, PeerError> {
        let secret = match secret {
            Some(secret) => Some(secret),
            None if kind.is_encrypted() => Some(Secret::generate()?),
            None => None,
        };

        let ledger = self.request_ledger(kind, participants).await?;
        let id = ledger.id.clone();
        self.store.add_ledger(ledger, secret);
        tracing::info!("created {} ledger {}", kind, id);
        Ok(id)
    }

    /// Ask the service for a new ledger without touching local state
    pub(super) async fn request_ledger(
        &self,
        kind: LedgerType,
        participants: Vec<AccountId>,
    ) -> Result<Ledger, PeerError> {
        let template = LedgerTemplate::new(self.account_id()?, kind, participants);
        let request = LedgerCreateRequest::sign(template, &self.store.identity().identity_key)?;
        Ok(self.remote.create_ledger(request).await?)
    }
}
