//! Shared test utilities for peer integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use common::crypto::{PublicKey, RsaPublicKey, RsaSecretKey, SecretKey};
use common::identity::{Identity, IdentityStore};
use common::ledger::{
    AccountId, BlockAddress, BlockPayload, Ledger, LedgerCreateRequest, LedgerHeadQuery,
    LedgerId, SignedBlock,
};
use common::peer::{PayloadHandler, Peer, SyncConfig, SyncReport};
use common::remote::{KeyDirectory, LedgerService, MemoryLedgerService, RemoteError};

pub type TestPeer = Peer<MemoryLedgerService>;
pub type FlakyPeer = Peer<FlakyService>;

/// Keys for a test identity. RSA is kept short so tests stay quick.
pub fn identity() -> Identity {
    Identity {
        account: None,
        alias: None,
        identity_key: SecretKey::generate(),
        alias_key: SecretKey::generate(),
        rsa_key: RsaSecretKey::generate_with_bits(1024).unwrap(),
    }
}

/// An initialized peer whose keys are published on `service`
pub fn setup_peer(service: &MemoryLedgerService, name: &str) -> TestPeer {
    setup_peer_with(service, name, SyncConfig::default())
}

pub fn setup_peer_with(service: &MemoryLedgerService, name: &str, config: SyncConfig) -> TestPeer {
    Peer::builder()
        .store(registered_store(service, name))
        .remote(service.clone())
        .config(config)
        .build()
        .unwrap()
}

/// An initialized peer talking to the service through `flaky`
pub fn setup_flaky_peer(flaky: &FlakyService, name: &str) -> FlakyPeer {
    Peer::builder()
        .store(registered_store(&flaky.inner, name))
        .remote(flaky.clone())
        .build()
        .unwrap()
}

/// A fresh initialized store whose keys are published on `service`
fn registered_store(service: &MemoryLedgerService, name: &str) -> IdentityStore {
    let mut store = IdentityStore::new(identity());
    let account = AccountId::new(name);
    store.initialize(account.clone(), None);
    service.register(
        account,
        store.identity().public_key(),
        store.identity().rsa_key.public(),
    );
    store
}

pub fn inbox(peer: &TestPeer) -> LedgerId {
    LedgerId::inbox_for(&peer.account_id().unwrap())
}

pub async fn sync_inbox(peer: &mut TestPeer) -> SyncReport {
    let inbox = inbox(peer);
    peer.sync_ledger(&inbox, &mut Recorder::default())
        .await
        .unwrap()
}

/// Run a full key exchange from `initiator` to `responder`,
///  returning the one-on-one ledger both end up holding
pub async fn handshake(initiator: &mut TestPeer, responder: &mut TestPeer) -> LedgerId {
    let responder_id = responder.account_id().unwrap();
    initiator.connect(&responder_id, "hello there").await.unwrap();
    sync_inbox(responder).await;
    sync_inbox(initiator).await;
    sync_inbox(responder).await;

    let initiator_id = initiator.account_id().unwrap();
    responder
        .store()
        .ledgers()
        .iter()
        .find(|l| l.users.contains(&initiator_id))
        .map(|l| l.id.clone())
        .expect("responder holds no ledger with the initiator")
}

/// Records every payload handed to it
#[derive(Debug, Default)]
pub struct Recorder {
    pub seen: Vec<(BlockAddress, BlockPayload)>,
}

impl PayloadHandler for Recorder {
    fn handle(
        &mut self,
        _ledger: &Ledger,
        address: &BlockAddress,
        _block: &SignedBlock,
        payload: BlockPayload,
    ) {
        self.seen.push((address.clone(), payload));
    }
}

impl Recorder {
    pub fn addresses(&self) -> Vec<BlockAddress> {
        self.seen.iter().map(|(address, _)| address.clone()).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.seen
            .iter()
            .filter_map(|(_, payload)| match payload {
                BlockPayload::Message(m) => Some(m.message.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Block writes still to fail
    writes: usize,
    /// Identity key lookups still to fail
    key_lookups: usize,
    /// Block fetches to serve before failing one
    fetches_before_failure: Option<usize>,
}

/// Wraps the in-memory service and fails chosen calls with a 503
#[derive(Debug, Clone, Default)]
pub struct FlakyService {
    pub inner: MemoryLedgerService,
    faults: Arc<Mutex<Faults>>,
}

fn unavailable() -> RemoteError {
    RemoteError::Status(StatusCode::SERVICE_UNAVAILABLE, "try again later".to_string())
}

impl FlakyService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, count: usize) {
        self.faults.lock().unwrap().writes = count;
    }

    pub fn fail_key_lookups(&self, count: usize) {
        self.faults.lock().unwrap().key_lookups = count;
    }

    /// Serve `served` more fetches, then fail the next one
    pub fn fail_fetch_after(&self, served: usize) {
        self.faults.lock().unwrap().fetches_before_failure = Some(served);
    }

    fn take(counter: &mut usize) -> bool {
        if *counter == 0 {
            return false;
        }
        *counter -= 1;
        true
    }
}

#[async_trait]
impl LedgerService for FlakyService {
    async fn create_ledger(&self, request: LedgerCreateRequest) -> Result<Ledger, RemoteError> {
        self.inner.create_ledger(request).await
    }

    async fn write_block(&self, block: SignedBlock) -> Result<BlockAddress, RemoteError> {
        if Self::take(&mut self.faults.lock().unwrap().writes) {
            return Err(unavailable());
        }
        self.inner.write_block(block).await
    }

    async fn ledger_head(&self, query: LedgerHeadQuery) -> Result<BlockAddress, RemoteError> {
        self.inner.ledger_head(query).await
    }

    async fn fetch_block(&self, address: &BlockAddress) -> Result<Option<SignedBlock>, RemoteError> {
        let fail = {
            let mut faults = self.faults.lock().unwrap();
            match faults.fetches_before_failure {
                Some(0) => {
                    faults.fetches_before_failure = None;
                    true
                }
                Some(served) => {
                    faults.fetches_before_failure = Some(served - 1);
                    false
                }
                None => false,
            }
        };
        if fail {
            return Err(unavailable());
        }
        self.inner.fetch_block(address).await
    }
}

#[async_trait]
impl KeyDirectory for FlakyService {
    async fn identity_key(&self, account: &AccountId) -> Result<PublicKey, RemoteError> {
        if Self::take(&mut self.faults.lock().unwrap().key_lookups) {
            return Err(unavailable());
        }
        self.inner.identity_key(account).await
    }

    async fn rsa_key(&self, account: &AccountId) -> Result<RsaPublicKey, RemoteError> {
        self.inner.rsa_key(account).await
    }
}
