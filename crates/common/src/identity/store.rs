use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Connection, Identity, PendingConnection};
use crate::crypto::{CryptoError, Secret};
use crate::ledger::{AccountId, BlockAddress, Ledger, LedgerId, LedgerKey, LedgerType};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("identity store io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrong passphrase, or the file was modified
    #[error("identity store could not be opened: wrong passphrase or corrupted file")]
    Corrupt,
    #[error("identity store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("identity has no account yet")]
    NotInitialized,
    #[error("unknown ledger: {0}")]
    UnknownLedger(LedgerId),
}

/// The whole of a client's local state
///
/// On disk the store is `nonce || AES-GCM(JSON)` under
///  `SHA-256(passphrase)`. Writes go through a temporary file in the same
///  directory and are renamed into place, so a crash leaves either the old
///  or the new store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityStore {
    identity: Identity,
    #[serde(default)]
    ledgers: Vec<Ledger>,
    #[serde(default)]
    ledger_keys: BTreeMap<LedgerId, LedgerKey>,
    #[serde(default)]
    pending: BTreeMap<AccountId, PendingConnection>,
    #[serde(default)]
    connections: Vec<Connection>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl IdentityStore {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            ledgers: Vec::new(),
            ledger_keys: BTreeMap::new(),
            pending: BTreeMap::new(),
            connections: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// A store around freshly generated keys
    pub fn generate() -> Result<Self, StoreError> {
        Ok(Self::new(Identity::generate()?))
    }

    /// Load the store at `path`, or generate a new uninitialized one if
    ///  nothing exists there yet. A new store is not written until
    ///  [`IdentityStore::persist`] is called.
    pub fn open(passphrase: &str, path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            tracing::info!("no identity store at {}, generating keys", path.display());
            return Self::generate();
        }

        let sealed = fs::read(path)?;
        Self::unseal(passphrase, &sealed)
    }

    /// Write the store to `path`, replacing any previous version atomically
    pub fn persist(&self, passphrase: &str, path: &Path) -> Result<(), StoreError> {
        let sealed = self.seal(passphrase)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&sealed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        tracing::debug!("persisted identity store to {}", path.display());
        Ok(())
    }

    /// Serialize and encrypt under the passphrase
    pub fn seal(&self, passphrase: &str) -> Result<Vec<u8>, StoreError> {
        let json = serde_json::to_vec(self)?;
        Ok(Secret::from_passphrase(passphrase.as_bytes()).encrypt(&json)?)
    }

    /// Decrypt and deserialize bytes produced by [`IdentityStore::seal`]
    pub fn unseal(passphrase: &str, sealed: &[u8]) -> Result<Self, StoreError> {
        let json = Secret::from_passphrase(passphrase.as_bytes())
            .decrypt(sealed)
            .map_err(|_| StoreError::Corrupt)?;
        serde_json::from_slice(&json).map_err(|e| {
            tracing::warn!("identity store decrypted but did not parse: {}", e);
            StoreError::Corrupt
        })
    }

    /// Attach the identifiers allocated at signup and record the
    ///  account's request-inbox ledger
    pub fn initialize(&mut self, account: AccountId, alias: Option<AccountId>) {
        let inbox = LedgerId::inbox_for(&account);
        self.identity.account = Some(account.clone());
        self.identity.alias = alias;
        if self.ledger(&inbox).is_none() {
            self.save_ledger(inbox, LedgerType::Requests, None, vec![account]);
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn account_id(&self) -> Result<&AccountId, StoreError> {
        self.identity.account.as_ref().ok_or(StoreError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.account.is_some()
    }

    pub fn ledgers(&self) -> &[Ledger] {
        &self.ledgers
    }

    pub fn ledger(&self, id: &LedgerId) -> Option<&Ledger> {
        self.ledgers.iter().find(|ledger| &ledger.id == id)
    }

    pub fn ledger_key(&self, id: &LedgerId) -> Option<&LedgerKey> {
        self.ledger_keys.get(id)
    }

    /// Record a ledger together with its key. A ledger already known keeps
    ///  its checkpoint; only its key is replaced. Returns whether the ledger is new.
    pub fn add_ledger(&mut self, ledger: Ledger, secret: Option<Secret>) -> bool {
        let id = ledger.id.clone();
        let is_new = self.ledger(&id).is_none();
        if is_new {
            self.ledgers.push(ledger);
        }
        self.ledger_keys.insert(id, LedgerKey::ready(secret));
        is_new
    }

    /// Record a ledger created by someone else
    pub fn save_ledger(
        &mut self,
        id: LedgerId,
        ledger_type: LedgerType,
        secret: Option<Secret>,
        users: Vec<AccountId>,
    ) -> bool {
        self.add_ledger(Ledger::new(id, ledger_type, users), secret)
    }

    /// Advance a ledger's checkpoint
    pub fn set_checkpoint(&mut self, id: &LedgerId, head: BlockAddress) -> Result<(), StoreError> {
        let ledger = self
            .ledgers
            .iter_mut()
            .find(|ledger| &ledger.id == id)
            .ok_or_else(|| StoreError::UnknownLedger(id.clone()))?;
        ledger.last_block = head;
        Ok(())
    }

    pub fn pending(&self, remote: &AccountId) -> Option<&PendingConnection> {
        self.pending.get(remote)
    }

    pub fn pending_connections(&self) -> impl Iterator<Item = (&AccountId, &PendingConnection)> {
        self.pending.iter()
    }

    /// Replace any pending exchange with `remote`, returning the previous one
    pub fn insert_pending(
        &mut self,
        remote: AccountId,
        pending: PendingConnection,
    ) -> Option<PendingConnection> {
        self.pending.insert(remote, pending)
    }

    pub fn remove_pending(&mut self, remote: &AccountId) -> Option<PendingConnection> {
        self.pending.remove(remote)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Add a contact card unless the account already has one
    pub fn add_connection(&mut self, connection: Connection) -> bool {
        if self
            .connections
            .iter()
            .any(|existing| existing.account == connection.account)
        {
            return false;
        }
        self.connections.push(connection);
        true
    }

    /// Add or update the contact card for `connection.account`
    pub fn upsert_connection(&mut self, connection: Connection) {
        match self
            .connections
            .iter_mut()
            .find(|existing| existing.account == connection.account)
        {
            Some(existing) => *existing = connection,
            None => self.connections.push(connection),
        }
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }
}
