//! In-memory `MessageMetadataStore` for tests and single-process embedding.
//!
//! Fault injection hooks let callers simulate slow or failing backends per
//! recipient, which is how routing timeouts and partial failures are
//! exercised without a real database.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::entities::{MessageId, Timestamp};
use crate::errors::MetadataError;
use crate::metadata::{DeliveryStatus, MessageFilter, MessageMetadataStore, MessageRecord};

#[derive(Default)]
struct Faults {
    fail_stores: bool,
    /// Recipient -> target status that fails (`None` fails every update).
    failing_recipients: HashMap<String, Option<DeliveryStatus>>,
    slow_recipients: HashMap<String, Duration>,
}

/// HashMap-backed metadata store.
#[derive(Default)]
pub struct InMemoryMessageMetadataStore {
    records: RwLock<HashMap<MessageId, MessageRecord>>,
    faults: RwLock<Faults>,
}

impl InMemoryMessageMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Make `store_message_metadata` fail until reset.
    pub fn fail_stores(&self, fail: bool) {
        self.faults.write().fail_stores = fail;
    }

    /// Make status updates for `recipient_id` fail with a backend error.
    pub fn fail_status_updates_for(&self, recipient_id: &str) {
        self.faults
            .write()
            .failing_recipients
            .insert(recipient_id.to_string(), None);
    }

    /// Make only updates of `recipient_id` to `status` fail.
    pub fn fail_status_update_to(&self, recipient_id: &str, status: DeliveryStatus) {
        self.faults
            .write()
            .failing_recipients
            .insert(recipient_id.to_string(), Some(status));
    }

    /// Delay status updates for `recipient_id` by `delay` before applying them.
    pub fn delay_status_updates_for(&self, recipient_id: &str, delay: Duration) {
        self.faults
            .write()
            .slow_recipients
            .insert(recipient_id.to_string(), delay);
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        *self.faults.write() = Faults::default();
    }

    fn with_record<T>(
        &self,
        message_id: &MessageId,
        f: impl FnOnce(&mut MessageRecord) -> Result<T, MetadataError>,
    ) -> Result<T, MetadataError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(message_id)
            .ok_or(MetadataError::MessageNotFound {
                message_id: *message_id,
            })?;
        f(record)
    }
}

#[async_trait]
impl MessageMetadataStore for InMemoryMessageMetadataStore {
    async fn store_message_metadata(&self, record: MessageRecord) -> Result<(), MetadataError> {
        if self.faults.read().fail_stores {
            return Err(MetadataError::Backend {
                operation: "store_message_metadata",
                message: "injected store failure".to_string(),
            });
        }
        debug!(message_id = %record.id, recipients = record.delivery_status.len(), "Storing message metadata");
        self.records.write().insert(record.id, record);
        Ok(())
    }

    async fn get(&self, message_id: &MessageId) -> Result<Option<MessageRecord>, MetadataError> {
        Ok(self.records.read().get(message_id).cloned())
    }

    async fn update_delivery_status(
        &self,
        message_id: &MessageId,
        recipient_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), MetadataError> {
        let (fail, delay) = {
            let faults = self.faults.read();
            (
                match faults.failing_recipients.get(recipient_id) {
                    Some(None) => true,
                    Some(Some(target)) => *target == status,
                    None => false,
                },
                faults.slow_recipients.get(recipient_id).copied(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(MetadataError::Backend {
                operation: "update_delivery_status",
                message: format!("injected failure for recipient {recipient_id}"),
            });
        }

        self.with_record(message_id, |record| {
            let slot = record.delivery_status.get_mut(recipient_id).ok_or_else(|| {
                MetadataError::UnknownRecipient {
                    message_id: *message_id,
                    recipient_id: recipient_id.to_string(),
                }
            })?;
            *slot = status;
            Ok(())
        })
    }

    async fn record_acknowledgment(
        &self,
        message_id: &MessageId,
        recipient_id: &str,
        timestamp: Timestamp,
    ) -> Result<(), MetadataError> {
        self.with_record(message_id, |record| {
            if !record.delivery_status.contains_key(recipient_id) {
                return Err(MetadataError::UnknownRecipient {
                    message_id: *message_id,
                    recipient_id: recipient_id.to_string(),
                });
            }
            record
                .acknowledgments
                .insert(recipient_id.to_string(), timestamp);
            Ok(())
        })
    }

    async fn query_messages(
        &self,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, MetadataError> {
        let mut matches: Vec<MessageRecord> = self
            .records
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }
}
