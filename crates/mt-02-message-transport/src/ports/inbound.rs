//! Inbound ports (API) for the message transport subsystem.

use async_trait::async_trait;
use shared_types::{MessageFilter, MessageId, MessageRecord};

use crate::domain::{CreatedMessage, MessageOptions, TransportError};

/// Message creation and retrieval.
#[async_trait]
pub trait MessageTransportApi: Send + Sync {
    /// Chunk, store and index `content`.
    ///
    /// On a storage failure every block written by this call is deleted on a
    /// best-effort basis before the error is returned.
    async fn create_message(
        &self,
        content: &[u8],
        options: &MessageOptions,
    ) -> Result<CreatedMessage, TransportError>;

    /// Reassemble the content of `message_id`, padding stripped.
    async fn get_message_content(&self, message_id: &MessageId) -> Result<Vec<u8>, TransportError>;

    /// Stored record, `None` when absent or no metadata store is configured.
    async fn get_message_metadata(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<MessageRecord>, TransportError>;

    async fn query_messages(&self, filter: &MessageFilter)
        -> Result<Vec<MessageRecord>, TransportError>;
}
