//! Block envelopes and the signed requests sent to the ledger service
//!
//! Every request carries a base64 DER signature over a canonical byte
//!  string. The canonical forms are fixed by the service and must be
//!  reproduced exactly:
//!
//! | request        | signed bytes                                   |
//! |----------------|------------------------------------------------|
//! | block write    | `UUID ‖ Ledger ‖ Contents ‖ Date ‖ BlockType`  |
//! | head query     | `UUID ‖ Date ‖ LedgerUUID`                     |
//! | ledger create  | JSON of the [`LedgerTemplate`], field order as declared |

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::address::{AccountId, BlockAddress, LedgerId};
use super::payload::BlockType;
use super::LedgerType;
use crate::crypto::{CryptoError, PublicKey, SecretKey};

/// Current UTC time as RFC 3339 with second precision (`2024-01-02T03:04:05Z`)
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// File attached to a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attachment {
    #[serde(rename = "UUID")]
    pub id: String,
    pub name: String,
    #[serde(rename = "SHA256")]
    pub sha256: String,
    pub size: u64,
    pub content_type: String,
    #[serde(rename = "URL")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockAttachment {
    pub signature: String,
    pub attachment: Attachment,
}

/// Additional signature vouching for a block on behalf of an organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrgSignature {
    #[serde(rename = "UUID")]
    pub id: String,
    pub signature: String,
}

/// A block as authored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    #[serde(rename = "UUID")]
    pub author: AccountId,
    pub ledger: LedgerId,
    /// Base64 of the (possibly sealed) payload bytes
    pub contents: String,
    pub date: String,
    #[serde(default)]
    pub attachments: Vec<BlockAttachment>,
    pub block_type: BlockType,
}

impl Block {
    /// New block stamped with the current time
    pub fn new(
        author: AccountId,
        ledger: LedgerId,
        contents: String,
        block_type: BlockType,
    ) -> Self {
        Self {
            author,
            ledger,
            contents,
            date: timestamp(),
            attachments: Vec::new(),
            block_type,
        }
    }

    /// The byte string the author signs
    pub fn signing_bytes(&self) -> Vec<u8> {
        [
            self.author.as_str(),
            self.ledger.as_str(),
            &self.contents,
            &self.date,
            self.block_type.tag(),
        ]
        .concat()
        .into_bytes()
    }
}

/// Signed block as written to and read back from the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignedBlock {
    /// Address of the previous block in the ledger, assigned by the service
    #[serde(default)]
    pub parent_block: BlockAddress,
    /// Identifier assigned by the service
    #[serde(rename = "UID", default)]
    pub uid: String,
    pub block: Block,
    pub signature: String,
    #[serde(default)]
    pub org_signatures: Vec<OrgSignature>,
}

impl SignedBlock {
    pub fn sign(block: Block, key: &SecretKey) -> Result<Self, CryptoError> {
        let signature = key.sign_base64(&block.signing_bytes())?;
        Ok(Self {
            parent_block: BlockAddress::default(),
            uid: String::new(),
            block,
            signature,
            org_signatures: Vec::new(),
        })
    }

    pub fn author(&self) -> &AccountId {
        &self.block.author
    }

    /// Check the author signature. Malformed signatures verify as false.
    pub fn verify(&self, key: &PublicKey) -> bool {
        key.verify_base64(&self.block.signing_bytes(), &self.signature)
    }
}

/// Body of a head query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeadTarget {
    #[serde(rename = "UUID")]
    pub account: AccountId,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "LedgerUUID")]
    pub ledger: LedgerId,
}

/// Signed request for the newest block address of a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LedgerHeadQuery {
    pub signature: String,
    pub ledger_last_block: LedgerHeadTarget,
}

impl LedgerHeadQuery {
    pub fn sign(account: AccountId, ledger: LedgerId, key: &SecretKey) -> Result<Self, CryptoError> {
        let target = LedgerHeadTarget {
            account,
            date: timestamp(),
            ledger,
        };
        let signature = key.sign_base64(&target.signing_bytes())?;
        Ok(Self {
            signature,
            ledger_last_block: target,
        })
    }
}

impl LedgerHeadTarget {
    pub fn signing_bytes(&self) -> Vec<u8> {
        [self.account.as_str(), &self.date, self.ledger.as_str()]
            .concat()
            .into_bytes()
    }
}

/// Description of a ledger to create
///
/// Serialized field order is part of the signature; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LedgerTemplate {
    pub additional_users: Vec<AccountId>,
    pub date: String,
    pub ledger_type: LedgerType,
    #[serde(rename = "UUID")]
    pub creator: AccountId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub has_icon: bool,
}

impl LedgerTemplate {
    pub fn new(creator: AccountId, ledger_type: LedgerType, additional_users: Vec<AccountId>) -> Self {
        Self {
            additional_users,
            date: timestamp(),
            ledger_type,
            creator,
            name: String::new(),
            site: String::new(),
            description: String::new(),
            has_icon: false,
        }
    }

    pub fn signing_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        serde_json::to_vec(self).map_err(|e| CryptoError::Encoding(e.to_string()))
    }
}

/// Signed request to create a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LedgerCreateRequest {
    pub signature: String,
    pub ledger_block: LedgerTemplate,
}

impl LedgerCreateRequest {
    pub fn sign(template: LedgerTemplate, key: &SecretKey) -> Result<Self, CryptoError> {
        let signature = key.sign_base64(&template.signing_bytes()?)?;
        Ok(Self {
            signature,
            ledger_block: template,
        })
    }

    /// Verify the creator's signature against `key`
    pub fn verify(&self, key: &PublicKey) -> bool {
        match self.ledger_block.signing_bytes() {
            Ok(bytes) => key.verify_base64(&bytes, &self.signature),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_block() -> Block {
        Block {
            author: AccountId::new("alice"),
            ledger: LedgerId::new("ledger1"),
            contents: "aGVsbG8=".to_string(),
            date: "2024-05-01T12:00:00Z".to_string(),
            attachments: Vec::new(),
            block_type: BlockType::Message,
        }
    }

    #[test]
    fn test_block_signing_bytes_layout() {
        let block = sample_block();
        assert_eq!(
            block.signing_bytes(),
            b"aliceledger1aGVsbG8=2024-05-01T12:00:00Zmsg".to_vec()
        );
    }

    #[test]
    fn test_signed_block_verifies() {
        let key = SecretKey::generate();
        let signed = SignedBlock::sign(sample_block(), &key).unwrap();
        assert!(signed.verify(&key.public()));
        assert!(signed.parent_block.is_terminal());

        let other = SecretKey::generate();
        assert!(!signed.verify(&other.public()));
    }

    #[test]
    fn test_tampered_block_fails_verification() {
        let key = SecretKey::generate();
        let mut signed = SignedBlock::sign(sample_block(), &key).unwrap();
        signed.block.contents = "Z29vZGJ5ZQ==".to_string();
        assert!(!signed.verify(&key.public()));
    }

    #[test]
    fn test_signed_block_wire_shape() {
        let key = SecretKey::generate();
        let signed = SignedBlock::sign(sample_block(), &key).unwrap();
        let value = serde_json::to_value(&signed).unwrap();
        assert_eq!(value["ParentBlock"], "-");
        assert_eq!(value["Block"]["UUID"], "alice");
        assert_eq!(value["Block"]["BlockType"], "msg");
        assert!(value["Signature"].is_string());
    }

    #[test]
    fn test_head_query_signature() {
        let key = SecretKey::generate();
        let query =
            LedgerHeadQuery::sign(AccountId::new("alice"), LedgerId::new("l1"), &key).unwrap();
        let target = &query.ledger_last_block;
        let expected = format!("alice{}l1", target.date);
        assert_eq!(target.signing_bytes(), expected.into_bytes());
        assert!(key
            .public()
            .verify_base64(&target.signing_bytes(), &query.signature));
    }

    #[test]
    fn test_ledger_template_field_order() {
        let mut template = LedgerTemplate::new(
            AccountId::new("alice"),
            LedgerType::OneOnOne,
            vec![AccountId::new("bob")],
        );
        template.date = "2024-05-01T12:00:00Z".to_string();
        let json = String::from_utf8(template.signing_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"AdditionalUsers":["bob"],"Date":"2024-05-01T12:00:00Z","LedgerType":3,"UUID":"alice","Name":"","Site":"","Description":"","HasIcon":false}"#
        );
    }

    #[test]
    fn test_create_request_verifies() {
        let key = SecretKey::generate();
        let template = LedgerTemplate::new(AccountId::new("alice"), LedgerType::Private, vec![]);
        let request = LedgerCreateRequest::sign(template, &key).unwrap();
        assert!(request.verify(&key.public()));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-05-01T12:00:00Z".len());
    }
}
