//! The client peer: an identity store bound to a remote service
//!
//! All protocol operations go through [`Peer`], which owns the
//!  [`IdentityStore`](crate::identity::IdentityStore) it mutates. Callers
//!  persist the store when an operation returns.

mod handshake;
mod peer;
mod sync;

pub use handshake::{HandshakeError, HandshakeOutcome};
pub use peer::{Peer, PeerBuilder};
pub use sync::{BlockFailure, NoopHandler, PayloadHandler, SyncConfig, SyncError, SyncReport};

use crate::crypto::CryptoError;
use crate::identity::StoreError;
use crate::ledger::LedgerId;
use crate::remote::RemoteError;

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("identity store error: {0}")]
    Store(#[from] StoreError),
    #[error("remote service error: {0}")]
    Remote(#[from] RemoteError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("no key for encrypted ledger {0}")]
    MissingLedgerKey(LedgerId),
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("peer built without a remote service")]
    MissingRemote,
}
