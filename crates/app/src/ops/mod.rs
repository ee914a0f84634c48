pub mod connect;
pub mod create_ledger;
pub mod identity;
pub mod init;
pub mod ledgers;
pub mod pending;
pub mod send;
pub mod sync;
pub mod version;

pub use connect::Connect;
pub use create_ledger::CreateLedger;
pub use identity::Identity;
pub use init::Init;
pub use ledgers::Ledgers;
pub use pending::Pending;
pub use send::SendMessage;
pub use sync::SyncLedgers;
pub use version::Version;
