use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use super::{KeyDirectory, LedgerService, RemoteError};
use crate::crypto::{PublicKey, RsaPublicKey};
use crate::ledger::{
    AccountId, BlockAddress, Ledger, LedgerCreateRequest, LedgerHeadQuery, LedgerId, LedgerType,
    SignedBlock,
};

/// In-memory ledger service and key directory
///
/// Behaves like the hosted service: it checks signatures against the
///  published keys, links every write to the current head and creates
///  request inboxes on first use. Clones share state, so one instance can
///  stand in for the service seen by several peers.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerService {
    inner: Arc<RwLock<MemoryLedgerServiceInner>>,
}

#[derive(Debug, Default)]
struct MemoryLedgerServiceInner {
    /// Published keys: account -> (identity key, rsa key)
    accounts: HashMap<AccountId, (PublicKey, RsaPublicKey)>,
    /// Ledger records, `last_block` tracking the head
    ledgers: HashMap<LedgerId, Ledger>,
    /// Every stored block by address
    blocks: HashMap<BlockAddress, SignedBlock>,
    /// Number of block fetches served
    fetches: usize,
}

fn lock_error<E: std::fmt::Display>(e: E) -> RemoteError {
    RemoteError::Rejected(format!("memory service lock poisoned: {}", e))
}

impl MemoryLedgerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an account's keys
    pub fn register(&self, account: AccountId, identity_key: PublicKey, rsa_key: RsaPublicKey) {
        if let Ok(mut inner) = self.inner.write() {
            inner.accounts.insert(account, (identity_key, rsa_key));
        }
    }

    /// Current head of a ledger, if the ledger exists
    pub fn head(&self, ledger: &LedgerId) -> Option<BlockAddress> {
        let inner = self.inner.read().ok()?;
        inner.ledgers.get(ledger).map(|l| l.last_block.clone())
    }

    pub fn ledger(&self, ledger: &LedgerId) -> Option<Ledger> {
        let inner = self.inner.read().ok()?;
        inner.ledgers.get(ledger).cloned()
    }

    /// Blocks of a ledger, newest first
    pub fn chain(&self, ledger: &LedgerId) -> Vec<(BlockAddress, SignedBlock)> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut chain = Vec::new();
        let mut address = match inner.ledgers.get(ledger) {
            Some(l) => l.last_block.clone(),
            None => return chain,
        };
        while let Some(block) = inner.blocks.get(&address) {
            chain.push((address.clone(), block.clone()));
            if block.parent_block.is_terminal() {
                break;
            }
            address = block.parent_block.clone();
        }
        chain
    }

    /// Swap the block stored at `address`, bypassing all checks
    pub fn replace_block(&self, address: &BlockAddress, block: SignedBlock) {
        if let Ok(mut inner) = self.inner.write() {
            inner.blocks.insert(address.clone(), block);
        }
    }

    /// Forget the block at `address`, making it unreachable
    pub fn remove_block(&self, address: &BlockAddress) -> Option<SignedBlock> {
        self.inner.write().ok()?.blocks.remove(address)
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.read().map(|inner| inner.fetches).unwrap_or_default()
    }
}

impl MemoryLedgerServiceInner {
    fn identity_key(&self, account: &AccountId) -> Result<&PublicKey, RemoteError> {
        self.accounts
            .get(account)
            .map(|(key, _)| key)
            .ok_or_else(|| RemoteError::NotFound(format!("no keys published for {}", account)))
    }

    /// Look up a ledger, creating the request inbox of a known account on demand
    fn ledger_mut(&mut self, id: &LedgerId) -> Result<&mut Ledger, RemoteError> {
        if !self.ledgers.contains_key(id) {
            let owner = id
                .as_str()
                .strip_prefix(crate::ledger::INBOX_PREFIX)
                .map(AccountId::new)
                .filter(|account| self.accounts.contains_key(account))
                .ok_or_else(|| RemoteError::NotFound(format!("ledger {}", id)))?;
            let mut inbox = Ledger::new(id.clone(), LedgerType::Requests, vec![]);
            inbox.moderators = vec![owner];
            inbox.root_url = format!("memory://{}/", id);
            self.ledgers.insert(id.clone(), inbox);
        }
        self.ledgers
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(format!("ledger {}", id)))
    }
}

#[async_trait]
impl LedgerService for MemoryLedgerService {
    async fn create_ledger(&self, request: LedgerCreateRequest) -> Result<Ledger, RemoteError> {
        let mut inner = self.inner.write().map_err(lock_error)?;

        let template = &request.ledger_block;
        let key = inner.identity_key(&template.creator)?;
        if !request.verify(key) {
            return Err(RemoteError::Rejected(format!(
                "bad signature on ledger request from {}",
                template.creator
            )));
        }

        let id = LedgerId::new(Uuid::new_v4().to_string());
        let mut ledger = Ledger::new(
            id.clone(),
            template.ledger_type,
            template.additional_users.clone(),
        );
        ledger.moderators = vec![template.creator.clone()];
        ledger.root_url = format!("memory://{}/", id);
        if !template.name.is_empty() {
            ledger.name = Some(template.name.clone());
        }
        if !template.description.is_empty() {
            ledger.description = Some(template.description.clone());
        }

        inner.ledgers.insert(id, ledger.clone());
        Ok(ledger)
    }

    async fn write_block(&self, mut block: SignedBlock) -> Result<BlockAddress, RemoteError> {
        let mut inner = self.inner.write().map_err(lock_error)?;

        let key = inner.identity_key(block.author())?;
        if !block.verify(key) {
            return Err(RemoteError::Rejected(format!(
                "bad signature on block from {}",
                block.author()
            )));
        }

        let ledger = inner.ledger_mut(&block.block.ledger)?;
        let uid = Uuid::new_v4().to_string();
        let address = BlockAddress::new(format!("{}{}", ledger.root_url, uid));
        block.parent_block = ledger.last_block.clone();
        block.uid = uid;
        ledger.last_block = address.clone();

        inner.blocks.insert(address.clone(), block);
        Ok(address)
    }

    async fn ledger_head(&self, query: LedgerHeadQuery) -> Result<BlockAddress, RemoteError> {
        let mut inner = self.inner.write().map_err(lock_error)?;

        let target = &query.ledger_last_block;
        let key = inner.identity_key(&target.account)?;
        if !key.verify_base64(&target.signing_bytes(), &query.signature) {
            return Err(RemoteError::Rejected(format!(
                "bad signature on head query from {}",
                target.account
            )));
        }

        Ok(inner.ledger_mut(&target.ledger)?.last_block.clone())
    }

    async fn fetch_block(&self, address: &BlockAddress) -> Result<Option<SignedBlock>, RemoteError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        inner.fetches += 1;
        Ok(inner.blocks.get(address).cloned())
    }
}

#[async_trait]
impl KeyDirectory for MemoryLedgerService {
    async fn identity_key(&self, account: &AccountId) -> Result<PublicKey, RemoteError> {
        let inner = self.inner.read().map_err(lock_error)?;
        inner.identity_key(account).cloned()
    }

    async fn rsa_key(&self, account: &AccountId) -> Result<RsaPublicKey, RemoteError> {
        let inner = self.inner.read().map_err(lock_error)?;
        inner
            .accounts
            .get(account)
            .map(|(_, key)| key.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("no keys published for {}", account)))
    }
}
