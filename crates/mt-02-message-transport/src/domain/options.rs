//! Message creation inputs and outputs.

use mt_01_block_chunking::MessageHeaderFields;
use serde::{Deserialize, Serialize};
use shared_types::{BlockId, EncryptionScheme, MessageId, MessagePriority, RecipientId};

/// Caller-supplied message attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOptions {
    pub message_type: String,
    pub sender_id: String,
    /// Ordered recipients. Empty means broadcast; duplicates are allowed.
    #[serde(default)]
    pub recipients: Vec<RecipientId>,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default)]
    pub encryption_scheme: EncryptionScheme,
}

impl MessageOptions {
    pub fn new(message_type: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            sender_id: sender_id.into(),
            ..Default::default()
        }
    }

    pub fn with_recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RecipientId>,
    {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_encryption(mut self, scheme: EncryptionScheme) -> Self {
        self.encryption_scheme = scheme;
        self
    }

    pub(crate) fn header_fields(&self) -> MessageHeaderFields {
        MessageHeaderFields {
            message_type: self.message_type.clone(),
            sender_id: self.sender_id.clone(),
            recipients: self.recipients.clone(),
            priority: self.priority,
            encryption_scheme: self.encryption_scheme,
        }
    }
}

/// Result of a successful `create_message`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedMessage {
    /// Address of the header block.
    pub message_id: MessageId,
    /// Content block addresses in payload order.
    pub content_block_ids: Vec<BlockId>,
    /// Opaque locator, `<prefix><hex id>`.
    pub retrieval_url: String,
}
