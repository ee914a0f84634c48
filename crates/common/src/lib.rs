/**
 * Cryptographic types and operations.
 *  - P-521 identity keys, signatures and key agreement
 *  - AES-256-GCM content encryption
 *  - RSA bootstrap encryption for handshakes
 */
pub mod crypto;
/**
 * Local state of a client: account keys, ledger
 *  keys, pending handshakes and contacts, kept in
 *  a single passphrase-encrypted file.
 */
pub mod identity;
/**
 * Ledgers, blocks and the payloads they carry,
 *  including the exact byte strings that get signed.
 */
pub mod ledger;
/**
 * The peer ties an identity to a remote service
 *  and runs the key exchange and ledger sync.
 */
pub mod peer;
/**
 * Remote ledger service and key directory, over
 *  HTTP or in memory.
 */
pub mod remote;

pub mod prelude {
    pub use crate::crypto::{PublicKey, Secret, SecretKey};
    pub use crate::identity::{IdentityStore, StoreError};
    pub use crate::ledger::{AccountId, BlockAddress, BlockPayload, BlockType, Ledger, LedgerId, LedgerType};
    pub use crate::peer::{NoopHandler, PayloadHandler, Peer, SyncConfig, SyncReport};
    pub use crate::remote::{HttpLedgerService, KeyDirectory, LedgerService, MemoryLedgerService, RemoteConfig};
}
