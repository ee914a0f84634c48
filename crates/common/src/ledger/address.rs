use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel meaning "no parent block" / "nothing processed yet"
pub const TERMINAL: &str = "-";

/// Prefix of every account's request-inbox ledger
pub const INBOX_PREFIX: &str = "ul";

/// Prefix the remote service gives to public alias accounts
pub const ALIAS_PREFIX: &str = "p";

/// Opaque account identifier allocated by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a public alias identifier rather than a private account
    pub fn is_alias(&self) -> bool {
        self.0.starts_with(ALIAS_PREFIX)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Ledger identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(String);

impl LedgerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The request-inbox ledger of `account`: an unencrypted mailbox anyone may append to
    pub fn inbox_for(account: &AccountId) -> Self {
        Self(format!("{}{}", INBOX_PREFIX, account))
    }

    pub fn is_inbox(&self) -> bool {
        self.0.starts_with(INBOX_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LedgerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for LedgerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Remote address of a block (a URL the service can serve it from),
///  or the [`TERMINAL`] sentinel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockAddress(String);

impl Default for BlockAddress {
    fn default() -> Self {
        Self::terminal()
    }
}

impl BlockAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn terminal() -> Self {
        Self(TERMINAL.to_string())
    }

    /// True for the sentinel and for degenerate addresses too short to name a block
    pub fn is_terminal(&self) -> bool {
        self.0 == TERMINAL || self.0.len() <= 1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_inbox_ledger_id() {
        let account = AccountId::new("3f2a");
        let inbox = LedgerId::inbox_for(&account);
        assert_eq!(inbox.as_str(), "ul3f2a");
        assert!(inbox.is_inbox());
        assert!(!LedgerId::new("3f2a").is_inbox());
    }

    #[test]
    fn test_terminal_address() {
        assert!(BlockAddress::terminal().is_terminal());
        assert!(BlockAddress::default().is_terminal());
        assert!(BlockAddress::new("").is_terminal());
        assert!(!BlockAddress::new("https://storage.example/blocks/1").is_terminal());
    }

    #[test]
    fn test_alias_account() {
        assert!(AccountId::new("p123").is_alias());
        assert!(!AccountId::new("a123").is_alias());
    }

    #[test]
    fn test_transparent_serde() {
        let address = BlockAddress::new("https://storage.example/blocks/1");
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"https://storage.example/blocks/1\"");
    }
}
