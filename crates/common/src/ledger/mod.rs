//! Ledger and block data model
//!
//! A ledger is an append-only chain of signed blocks held by the remote
//!  service. Each block names its parent by address; the first block of a
//!  ledger has the [`TERMINAL`] sentinel as its parent. Clients keep a local
//!  [`Ledger`] record whose `last_block` is the checkpoint up to which
//!  contents have been processed.

mod address;
mod block;
mod payload;

pub use address::{AccountId, BlockAddress, LedgerId, ALIAS_PREFIX, INBOX_PREFIX, TERMINAL};
pub use block::{
    timestamp, Attachment, Block, BlockAttachment, LedgerCreateRequest, LedgerHeadQuery,
    LedgerHeadTarget, LedgerTemplate, OrgSignature, SignedBlock,
};
pub use payload::{
    Article, BlockPayload, BlockType, Element, Health, Html, KeyExchangeAck, KeyExchangeInit,
    KeyExchangeResponse, Message, NewLedgerNotice, PayloadError, Profile, ACK_CONFIRMATION,
};

use serde::{Deserialize, Serialize};

use crate::crypto::Secret;

/// Kind of ledger. Travels on the wire as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LedgerType {
    Private,
    Public,
    Requests,
    OneOnOne,
    Group,
    Photos,
    Health,
}

impl LedgerType {
    /// Public and request-inbox ledgers carry plaintext contents;
    ///  every other kind is sealed under its ledger key
    pub fn is_encrypted(self) -> bool {
        !matches!(self, LedgerType::Public | LedgerType::Requests)
    }

    pub fn code(self) -> u8 {
        match self {
            LedgerType::Private => 0,
            LedgerType::Public => 1,
            LedgerType::Requests => 2,
            LedgerType::OneOnOne => 3,
            LedgerType::Group => 4,
            LedgerType::Photos => 5,
            LedgerType::Health => 6,
        }
    }
}

impl From<LedgerType> for u8 {
    fn from(kind: LedgerType) -> Self {
        kind.code()
    }
}

impl TryFrom<u8> for LedgerType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => LedgerType::Private,
            1 => LedgerType::Public,
            2 => LedgerType::Requests,
            3 => LedgerType::OneOnOne,
            4 => LedgerType::Group,
            5 => LedgerType::Photos,
            6 => LedgerType::Health,
            other => return Err(format!("unknown ledger type code {}", other)),
        })
    }
}

impl std::fmt::Display for LedgerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LedgerType::Private => "private",
            LedgerType::Public => "public",
            LedgerType::Requests => "requests",
            LedgerType::OneOnOne => "one-on-one",
            LedgerType::Group => "group",
            LedgerType::Photos => "photos",
            LedgerType::Health => "health",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for LedgerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "private" => LedgerType::Private,
            "public" => LedgerType::Public,
            "requests" => LedgerType::Requests,
            "one-on-one" => LedgerType::OneOnOne,
            "group" => LedgerType::Group,
            "photos" => LedgerType::Photos,
            "health" => LedgerType::Health,
            other => return Err(format!("unknown ledger type {}", other)),
        })
    }
}

/// Local record of a ledger. Also the shape the remote service
///  answers ledger creation and head queries with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ledger {
    #[serde(rename = "UUID")]
    pub id: LedgerId,
    pub ledger_type: LedgerType,
    #[serde(default)]
    pub moderators: Vec<AccountId>,
    #[serde(default)]
    pub users: Vec<AccountId>,
    #[serde(rename = "RootURL", default)]
    pub root_url: String,
    /// Checkpoint: address of the newest block already processed
    #[serde(default)]
    pub last_block: BlockAddress,
    #[serde(default)]
    pub allow_replies: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Ledger {
    /// A fresh local record with no blocks processed yet
    pub fn new(id: LedgerId, ledger_type: LedgerType, users: Vec<AccountId>) -> Self {
        Self {
            id,
            ledger_type,
            moderators: Vec::new(),
            users,
            root_url: String::new(),
            last_block: BlockAddress::terminal(),
            allow_replies: false,
            name: None,
            description: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.ledger_type.is_encrypted()
    }

    /// Accounts taking part in this ledger
    pub fn participants(&self) -> impl Iterator<Item = &AccountId> {
        self.moderators.iter().chain(self.users.iter())
    }
}

/// Whether a ledger key is usable yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Pending,
    Ready,
}

/// Symmetric key material for one ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerKey {
    pub status: KeyStatus,
    /// Absent for ledgers whose contents travel in the clear
    pub secret: Option<Secret>,
}

impl LedgerKey {
    pub fn ready(secret: Option<Secret>) -> Self {
        Self {
            status: KeyStatus::Ready,
            secret,
        }
    }
}
