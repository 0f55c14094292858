//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Addressing**: `BlockId`, `MessageId`, `NodeId`
//! - **Blocks**: `BlockSize` classes
//! - **Messages**: `MessagePriority`, `EncryptionScheme`, `RecipientId`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::IdParseError;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Identifier of a message recipient (user or mailbox id).
pub type RecipientId = String;

fn parse_hash(s: &str) -> Result<Hash, IdParseError> {
    let bytes = hex::decode(s).map_err(|e| IdParseError::InvalidHex {
        input: s.to_string(),
        reason: e.to_string(),
    })?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| IdParseError::InvalidLength {
            expected: 32,
            actual: len,
        })
}

// =============================================================================
// CLUSTER A: ADDRESSING
// =============================================================================

/// Content address of a stored block (SHA-256 of its padded bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BlockId(pub Hash);

impl BlockId {
    /// Creates a block id from a raw digest.
    pub fn new(hash: Hash) -> Self {
        Self(hash)
    }

    /// Creates a block id from a byte slice.
    ///
    /// Returns `None` if the slice is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let hash: Hash = bytes.try_into().ok()?;
        Some(Self(hash))
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Lowercase hex rendering (64 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({}..)", &self.to_hex()[..12])
    }
}

impl FromStr for BlockId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hash(s).map(Self)
    }
}

impl From<BlockId> for String {
    fn from(id: BlockId) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for BlockId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Identifier of a message: the content address of its CBL header block.
///
/// This is also the retrieval key handed back to callers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MessageId(pub BlockId);

impl MessageId {
    pub fn new(header_block: BlockId) -> Self {
        Self(header_block)
    }

    /// Address of the header block this message id points at.
    pub fn block_id(&self) -> BlockId {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({}..)", &self.to_hex()[..12])
    }
}

impl FromStr for MessageId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for MessageId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Unique identifier for a node in the gossip network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub fn new(id: [u8; 32]) -> Self {
        Self(id)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}..)", &self.to_hex()[..8])
    }
}

impl FromStr for NodeId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hash(s).map(Self)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for NodeId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// =============================================================================
// CLUSTER B: BLOCKS
// =============================================================================

/// Fixed block size classes supported by the block store.
///
/// The class byte is what the CBL header records; the byte size is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSize {
    /// 512 bytes.
    Message,
    /// 1 KiB.
    Tiny,
    /// 4 KiB.
    #[default]
    Small,
    /// 1 MiB.
    Medium,
    /// 64 MiB.
    Large,
}

impl BlockSize {
    /// All classes, smallest first.
    pub const ALL: [BlockSize; 5] = [
        BlockSize::Message,
        BlockSize::Tiny,
        BlockSize::Small,
        BlockSize::Medium,
        BlockSize::Large,
    ];

    /// Size of a block of this class in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            BlockSize::Message => 512,
            BlockSize::Tiny => 1024,
            BlockSize::Small => 4 * 1024,
            BlockSize::Medium => 1024 * 1024,
            BlockSize::Large => 64 * 1024 * 1024,
        }
    }

    /// Class byte as written into CBL headers.
    pub const fn class_byte(self) -> u8 {
        match self {
            BlockSize::Message => 1,
            BlockSize::Tiny => 2,
            BlockSize::Small => 3,
            BlockSize::Medium => 4,
            BlockSize::Large => 5,
        }
    }

    pub fn from_class_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.class_byte() == byte)
    }

    /// Exact match on a byte length.
    pub fn from_bytes(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.bytes() == len)
    }
}

// =============================================================================
// CLUSTER C: MESSAGES
// =============================================================================

/// Delivery priority of a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
}

impl MessagePriority {
    pub const fn to_byte(self) -> u8 {
        match self {
            MessagePriority::Low => 0,
            MessagePriority::Normal => 1,
            MessagePriority::High => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MessagePriority::Low),
            1 => Some(MessagePriority::Normal),
            2 => Some(MessagePriority::High),
            _ => None,
        }
    }
}

/// Encryption applied to message content. Carried, never interpreted here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionScheme {
    #[default]
    None,
    SharedKey,
    RecipientKeys,
    SMime,
}

impl EncryptionScheme {
    pub const fn to_byte(self) -> u8 {
        match self {
            EncryptionScheme::None => 0,
            EncryptionScheme::SharedKey => 1,
            EncryptionScheme::RecipientKeys => 2,
            EncryptionScheme::SMime => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(EncryptionScheme::None),
            1 => Some(EncryptionScheme::SharedKey),
            2 => Some(EncryptionScheme::RecipientKeys),
            3 => Some(EncryptionScheme::SMime),
            _ => None,
        }
    }

    /// Whether content is encrypted at all.
    pub fn is_encrypted(self) -> bool {
        self != EncryptionScheme::None
    }
}
