//! Contracts with the remote ledger service and key directory
//!
//! The service stores ledgers and their blocks and assigns block addresses;
//!  the key directory publishes each account's public keys. Both are traits
//!  so the peer can run against the HTTP service or an in-memory stand-in.

mod http;
mod memory;

pub use http::{
    HttpLedgerService, RemoteConfig, DEFAULT_PUBLIC_USERS_URL, DEFAULT_SERVICE_URL, DEFAULT_USERS_URL,
};
pub use memory::MemoryLedgerService;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::crypto::{PublicKey, RsaPublicKey};
use crate::ledger::{
    AccountId, BlockAddress, Ledger, LedgerCreateRequest, LedgerHeadQuery, SignedBlock,
};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}: {1}")]
    Status(StatusCode, String),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The service refused the request (bad signature, unknown ledger)
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// The service answered, but has nothing at the requested location
    pub fn is_not_found(&self) -> bool {
        match self {
            RemoteError::NotFound(_) => true,
            RemoteError::Status(status, _) => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }
}

/// Remote ledger storage
#[async_trait]
pub trait LedgerService: Send + Sync + std::fmt::Debug {
    /// Create a ledger from a signed template, returning the service's record of it
    async fn create_ledger(&self, request: LedgerCreateRequest) -> Result<Ledger, RemoteError>;

    /// Append a signed block to the ledger it names. The service links it to
    ///  the current head and returns the new block's address.
    async fn write_block(&self, block: SignedBlock) -> Result<BlockAddress, RemoteError>;

    /// Address of the newest block in a ledger, the terminal sentinel if empty
    async fn ledger_head(&self, query: LedgerHeadQuery) -> Result<BlockAddress, RemoteError>;

    /// Fetch a block by address
    ///
    /// # Returns
    /// * `Ok(Some(block))` - The block
    /// * `Ok(None)` - Nothing is stored at the address
    /// * `Err(RemoteError)` - The service could not be reached or answered garbage
    async fn fetch_block(&self, address: &BlockAddress) -> Result<Option<SignedBlock>, RemoteError>;
}

/// Published account keys
#[async_trait]
pub trait KeyDirectory: Send + Sync + std::fmt::Debug {
    /// Long-term EC key blocks and requests from `account` are signed with
    async fn identity_key(&self, account: &AccountId) -> Result<PublicKey, RemoteError>;

    /// RSA bootstrap key used to address handshake fields to `account`
    async fn rsa_key(&self, account: &AccountId) -> Result<RsaPublicKey, RemoteError>;
}
