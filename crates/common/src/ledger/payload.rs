//! Typed block payloads
//!
//! A block's `BlockType` tag selects how its decrypted contents are read.
//!  Handshake payloads drive the key exchange; the rest are handed to the
//!  application untouched apart from decoding. Unrecognised tags are kept
//!  as raw bytes rather than rejected.

use serde::{Deserialize, Serialize};

/// Confirmation string carried inside a sealed handshake Ack
pub const ACK_CONFIRMATION: &str = "All Set";

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed {tag} payload: {source}")]
    Json {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Block type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockType {
    HandshakeInit,
    HandshakeResponse,
    HandshakeAck,
    Message,
    Article,
    Html,
    Profile,
    Json,
    Health,
    NewLedgerNotice,
    Other(String),
}

impl BlockType {
    pub fn tag(&self) -> &str {
        match self {
            BlockType::HandshakeInit => "ke0",
            BlockType::HandshakeResponse => "ke1",
            BlockType::HandshakeAck => "ke2",
            BlockType::Message => "msg",
            BlockType::Article => "article",
            BlockType::Html => "html",
            BlockType::Profile => "profile",
            BlockType::Json => "json",
            BlockType::Health => "health",
            BlockType::NewLedgerNotice => "not-newledger",
            BlockType::Other(tag) => tag,
        }
    }

    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            BlockType::HandshakeInit | BlockType::HandshakeResponse | BlockType::HandshakeAck
        )
    }
}

impl From<&str> for BlockType {
    fn from(tag: &str) -> Self {
        match tag {
            "ke0" => BlockType::HandshakeInit,
            "ke1" => BlockType::HandshakeResponse,
            "ke2" => BlockType::HandshakeAck,
            "msg" => BlockType::Message,
            "article" => BlockType::Article,
            "html" => BlockType::Html,
            "profile" => BlockType::Profile,
            "json" => BlockType::Json,
            "health" => BlockType::Health,
            "not-newledger" => BlockType::NewLedgerNotice,
            other => BlockType::Other(other.to_string()),
        }
    }
}

impl From<String> for BlockType {
    fn from(tag: String) -> Self {
        BlockType::from(tag.as_str())
    }
}

impl From<BlockType> for String {
    fn from(kind: BlockType) -> Self {
        kind.tag().to_string()
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// First handshake message, appended to the responder's inbox
///
/// `uuid` and `message` are RSA-encrypted to the responder's bootstrap key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeInit {
    #[serde(rename = "EphemeralPublicKey", alias = "EphemerealPublicKey")]
    pub ephemeral_public_key: String,
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

/// Second handshake message, appended to the initiator's inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeResponse {
    #[serde(rename = "EphemeralPublicKey", alias = "EphemerealPublicKey", default)]
    pub ephemeral_public_key: String,
    #[serde(rename = "UUID")]
    pub uuid: String,
}

/// Final handshake message. Travels sealed under the new shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyExchangeAck {
    #[serde(rename = "UUID")]
    pub uuid: String,
    pub test: String,
    #[serde(rename = "LedgerUUID")]
    pub ledger_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    pub author: String,
    pub message: String,
}

/// One presentable element of an [`Article`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Element {
    pub content_type: String,
    /// Base64 encoded
    pub data: String,
    pub padding: Vec<i32>,
    pub margin: Vec<i32>,
    /// RGBA
    pub background_color: [u8; 4],
    /// RGBA
    pub text_color: [u8; 4],
    pub max_width: u32,
    pub max_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Article {
    #[serde(default)]
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Html {
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "CSS", default)]
    pub css: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Profile {
    pub author: String,
    pub name: String,
    pub description: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Health {
    pub author: String,
    pub date: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Notice that the author shared a ledger (and possibly its key) with the reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewLedgerNotice {
    #[serde(default)]
    pub name: String,
    pub from: String,
    #[serde(rename = "UUID")]
    pub uuid: String,
    /// Base64 ledger key, empty for plaintext ledgers
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub user: Vec<String>,
    pub ledger_type: u8,
}

/// Decoded contents of a block
#[derive(Debug, Clone, PartialEq)]
pub enum BlockPayload {
    HandshakeInit(KeyExchangeInit),
    HandshakeResponse(KeyExchangeResponse),
    /// Still sealed: only the handshake state can open it
    HandshakeAck(Vec<u8>),
    Message(Message),
    Article(Article),
    Html(Html),
    Profile(Profile),
    Json(serde_json::Value),
    Health(Health),
    NewLedgerNotice(NewLedgerNotice),
    Unknown { tag: String, bytes: Vec<u8> },
}

fn parse<T: serde::de::DeserializeOwned>(kind: &BlockType, bytes: &[u8]) -> Result<T, PayloadError> {
    serde_json::from_slice(bytes).map_err(|source| PayloadError::Json {
        tag: kind.tag().to_string(),
        source,
    })
}

impl BlockPayload {
    /// Interpret plaintext block contents according to `kind`
    pub fn decode(kind: &BlockType, bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(match kind {
            BlockType::HandshakeInit => Self::HandshakeInit(parse(kind, bytes)?),
            BlockType::HandshakeResponse => Self::HandshakeResponse(parse(kind, bytes)?),
            BlockType::HandshakeAck => Self::HandshakeAck(bytes.to_vec()),
            BlockType::Message => Self::Message(parse(kind, bytes)?),
            BlockType::Article => Self::Article(parse(kind, bytes)?),
            BlockType::Html => Self::Html(parse(kind, bytes)?),
            BlockType::Profile => Self::Profile(parse(kind, bytes)?),
            BlockType::Json => Self::Json(parse(kind, bytes)?),
            BlockType::Health => Self::Health(parse(kind, bytes)?),
            BlockType::NewLedgerNotice => Self::NewLedgerNotice(parse(kind, bytes)?),
            BlockType::Other(tag) => Self::Unknown {
                tag: tag.clone(),
                bytes: bytes.to_vec(),
            },
        })
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Self::HandshakeInit(_) => BlockType::HandshakeInit,
            Self::HandshakeResponse(_) => BlockType::HandshakeResponse,
            Self::HandshakeAck(_) => BlockType::HandshakeAck,
            Self::Message(_) => BlockType::Message,
            Self::Article(_) => BlockType::Article,
            Self::Html(_) => BlockType::Html,
            Self::Profile(_) => BlockType::Profile,
            Self::Json(_) => BlockType::Json,
            Self::Health(_) => BlockType::Health,
            Self::NewLedgerNotice(_) => BlockType::NewLedgerNotice,
            Self::Unknown { tag, .. } => BlockType::Other(tag.clone()),
        }
    }

    /// Plaintext bytes for this payload, before any ledger encryption
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::HandshakeInit(m) => serde_json::to_vec(m),
            Self::HandshakeResponse(m) => serde_json::to_vec(m),
            Self::HandshakeAck(sealed) => Ok(sealed.clone()),
            Self::Message(m) => serde_json::to_vec(m),
            Self::Article(m) => serde_json::to_vec(m),
            Self::Html(m) => serde_json::to_vec(m),
            Self::Profile(m) => serde_json::to_vec(m),
            Self::Json(v) => serde_json::to_vec(v),
            Self::Health(m) => serde_json::to_vec(m),
            Self::NewLedgerNotice(m) => serde_json::to_vec(m),
            Self::Unknown { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_known_tags() {
        for tag in [
            "ke0",
            "ke1",
            "ke2",
            "msg",
            "article",
            "html",
            "profile",
            "json",
            "health",
            "not-newledger",
        ] {
            let kind = BlockType::from(tag);
            assert!(!matches!(kind, BlockType::Other(_)), "{} unrecognised", tag);
            assert_eq!(kind.tag(), tag);
        }
    }

    #[test]
    fn test_unknown_tag_is_preserved() {
        let kind = BlockType::from("kr");
        assert_eq!(kind, BlockType::Other("kr".to_string()));
        let payload = BlockPayload::decode(&kind, b"opaque").unwrap();
        assert_eq!(
            payload,
            BlockPayload::Unknown {
                tag: "kr".to_string(),
                bytes: b"opaque".to_vec()
            }
        );
        assert_eq!(payload.block_type(), kind);
    }

    #[test]
    fn test_init_accepts_legacy_field_name() {
        let json = br#"{"EphemerealPublicKey":"BAAB","UUID":"enc-id","Message":"enc-msg"}"#;
        let payload = BlockPayload::decode(&BlockType::HandshakeInit, json).unwrap();
        match payload {
            BlockPayload::HandshakeInit(init) => {
                assert_eq!(init.ephemeral_public_key, "BAAB");
                assert_eq!(init.uuid, "enc-id");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_message_decode() {
        let json = br#"{"Author":"alice","Message":"hi bob"}"#;
        let payload = BlockPayload::decode(&BlockType::Message, json).unwrap();
        assert_eq!(
            payload,
            BlockPayload::Message(Message {
                author: "alice".to_string(),
                message: "hi bob".to_string()
            })
        );
        let encoded = payload.encode().unwrap();
        assert_eq!(BlockPayload::decode(&BlockType::Message, &encoded).unwrap(), payload);
    }

    #[test]
    fn test_malformed_payload_names_tag() {
        let err = BlockPayload::decode(&BlockType::Html, b"not json").unwrap_err();
        assert!(err.to_string().contains("html"));
    }

    #[test]
    fn test_ack_stays_sealed() {
        let payload = BlockPayload::decode(&BlockType::HandshakeAck, &[1, 2, 3]).unwrap();
        assert_eq!(payload, BlockPayload::HandshakeAck(vec![1, 2, 3]));
    }

    #[test]
    fn test_block_type_serde_as_tag() {
        let json = serde_json::to_string(&BlockType::NewLedgerNotice).unwrap();
        assert_eq!(json, "\"not-newledger\"");
        let back: BlockType = serde_json::from_str("\"ke1\"").unwrap();
        assert_eq!(back, BlockType::HandshakeResponse);
    }
}
