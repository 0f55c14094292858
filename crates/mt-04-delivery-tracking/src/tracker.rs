//! # Delivery Tracker
//!
//! Awaits per-recipient acknowledgments for announced messages, re-announces
//! on timeout with exponential backoff, and fails the unacknowledged
//! remainder once retries are exhausted.
//!
//! ## Concurrency
//!
//! All pending state sits behind one mutex. Each operation decides its state
//! changes under the lock, releases it, and only then awaits the metadata
//! store or the announcer. Entries are removed inside the critical section,
//! so `Delivered` and `Failed` are emitted at most once per message.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use shared_types::{
    BlockId, DeliveryStatus, MessageId, MessageMetadataStore, RecipientId, SystemTimeSource,
    TimeSource,
};

use crate::config::DeliveryTrackerConfig;
use crate::domain::{
    backoff_delay_ms, AckStatus, DeliveryAck, MessageDeliveryMetadata, PendingDelivery,
    RecipientStatus,
};
use crate::events::DeliveryEvent;
use crate::ports::inbound::AckHandler;
use crate::ports::outbound::DeliveryAnnouncer;
use crate::timer::RecurringTask;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What `handle_ack` did with an acknowledgment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// Unknown message or recipient, or an illegal transition.
    Ignored,
    /// Status changed, recipients still outstanding.
    Applied,
    /// Last outstanding recipient acknowledged; `Delivered` emitted.
    Completed,
}

/// Result of one `check_retries` pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub reannounced: Vec<MessageId>,
    pub failed: Vec<MessageId>,
}

struct TrackerInner {
    config: DeliveryTrackerConfig,
    pending: Mutex<HashMap<MessageId, PendingDelivery>>,
    announcer: Arc<dyn DeliveryAnnouncer>,
    metadata: Option<Arc<dyn MessageMetadataStore>>,
    clock: Arc<dyn TimeSource>,
    events: broadcast::Sender<DeliveryEvent>,
}

pub struct DeliveryTracker {
    inner: Arc<TrackerInner>,
    timer: RecurringTask,
}

impl DeliveryTracker {
    pub fn new(config: DeliveryTrackerConfig, announcer: Arc<dyn DeliveryAnnouncer>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(TrackerInner {
                config,
                pending: Mutex::new(HashMap::new()),
                announcer,
                metadata: None,
                clock: Arc::new(SystemTimeSource),
                events,
            }),
            timer: RecurringTask::new("delivery-retry-check"),
        }
    }

    /// Push status changes to `metadata`. Call before `start`.
    pub fn with_metadata_store(mut self, metadata: Arc<dyn MessageMetadataStore>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.metadata = Some(metadata),
            None => warn!("Tracker already running, metadata store not attached"),
        }
        self
    }

    /// Call before `start`.
    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.clock = clock,
            None => warn!("Tracker already running, time source not replaced"),
        }
        self
    }

    pub fn config(&self) -> &DeliveryTrackerConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.inner.events.subscribe()
    }

    /// Register an announced message. Recipients start `Announced` and the
    /// first check is due after `initial_timeout_ms`.
    ///
    /// A message without recipients has nothing to acknowledge and is not
    /// tracked. Tracking an already tracked message restarts it.
    pub fn track_delivery(
        &self,
        message_id: MessageId,
        block_ids: Vec<BlockId>,
        metadata: MessageDeliveryMetadata,
    ) -> bool {
        if metadata.recipient_ids.is_empty() {
            debug!(message_id = %message_id, "No recipients, delivery not tracked");
            return false;
        }
        let next_retry_at = self
            .inner
            .clock
            .now_ms()
            .saturating_add(self.inner.config.initial_timeout_ms);
        let entry = PendingDelivery::new(message_id, block_ids, metadata, next_retry_at);
        let recipients = entry.recipient_statuses.len();
        if self.inner.pending.lock().insert(message_id, entry).is_some() {
            debug!(message_id = %message_id, "Restarted tracking of message");
        }
        info!(message_id = %message_id, recipients, next_retry_at, "Tracking delivery");
        true
    }

    pub async fn handle_ack(&self, ack: &DeliveryAck) -> AckOutcome {
        self.inner.handle_ack(ack).await
    }

    pub async fn check_retries(&self) -> RetrySummary {
        self.inner.check_retries().await
    }

    /// Start the periodic retry check. `false` if already running.
    pub fn start(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        self.timer
            .start(self.inner.config.retry_check_interval(), move || {
                let inner = Arc::clone(&inner);
                async move {
                    inner.check_retries().await;
                }
            })
    }

    /// Stop the periodic check. A check already running completes, so its
    /// status updates and events are not lost.
    pub fn stop(&self) -> bool {
        self.timer.stop()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn pending_delivery(&self, message_id: &MessageId) -> Option<PendingDelivery> {
        self.inner.pending.lock().get(message_id).cloned()
    }
}

impl TrackerInner {
    async fn handle_ack(&self, ack: &DeliveryAck) -> AckOutcome {
        if ack.status == AckStatus::Failed {
            // Failure is decided locally by retry exhaustion.
            debug!(message_id = %ack.message_id, recipient = %ack.recipient_id, "Ignoring failed ack");
            return AckOutcome::Ignored;
        }

        let (new_status, completed) = {
            let mut pending = self.pending.lock();
            let Some(entry) = pending.get_mut(&ack.message_id) else {
                debug!(message_id = %ack.message_id, "Ack for untracked message ignored");
                return AckOutcome::Ignored;
            };
            let Some(new_status) = entry.apply(&ack.recipient_id, RecipientStatus::from(ack.status))
            else {
                debug!(
                    message_id = %ack.message_id,
                    recipient = %ack.recipient_id,
                    status = ?ack.status,
                    "Ack ignored: unknown recipient or illegal transition"
                );
                return AckOutcome::Ignored;
            };
            let completed = if entry.all_acknowledged() {
                pending.remove(&ack.message_id)
            } else {
                None
            };
            (new_status, completed)
        };

        self.push_status(&ack.message_id, &ack.recipient_id, new_status)
            .await;

        match completed {
            Some(entry) => {
                info!(message_id = %ack.message_id, retries = entry.retry_count, "Message delivered to all recipients");
                let _ = self.events.send(DeliveryEvent::Delivered {
                    message_id: ack.message_id,
                    recipients: entry.recipients(),
                });
                AckOutcome::Completed
            }
            None => AckOutcome::Applied,
        }
    }

    async fn check_retries(&self) -> RetrySummary {
        let now = self.clock.now_ms();
        let mut reannounce = Vec::new();
        let mut exhausted = Vec::new();
        {
            let mut pending = self.pending.lock();
            let mut due_exhausted = Vec::new();
            for (message_id, entry) in pending.iter_mut() {
                if !entry.is_due(now) {
                    continue;
                }
                if entry.retry_count < self.config.max_retries {
                    entry.retry_count += 1;
                    entry.next_retry_at =
                        now.saturating_add(backoff_delay_ms(&self.config, entry.retry_count));
                    reannounce.push((
                        *message_id,
                        entry.block_ids.clone(),
                        entry.metadata.clone(),
                        entry.retry_count,
                    ));
                } else {
                    due_exhausted.push(*message_id);
                }
            }
            for message_id in due_exhausted {
                if let Some(mut entry) = pending.remove(&message_id) {
                    let failed = entry.fail_unacknowledged();
                    exhausted.push((message_id, failed));
                }
            }
        }

        let mut summary = RetrySummary::default();
        for (message_id, block_ids, metadata, retry_count) in reannounce {
            debug!(message_id = %message_id, retry_count, "Re-announcing unacknowledged message");
            if let Err(e) = self.announcer.announce_message(&block_ids, &metadata).await {
                warn!(message_id = %message_id, error = %e, "Re-announcement failed");
            }
            summary.reannounced.push(message_id);
        }

        for (message_id, failed) in exhausted {
            for recipient in &failed {
                self.push_status(&message_id, recipient, RecipientStatus::Failed)
                    .await;
            }
            summary.failed.push(message_id);
            if failed.is_empty() {
                debug!(message_id = %message_id, "Retries exhausted with no outstanding recipients");
                continue;
            }
            warn!(message_id = %message_id, failed = failed.len(), "Delivery failed after retries");
            let _ = self.events.send(DeliveryEvent::Failed {
                message_id,
                failed_recipients: failed,
            });
        }
        summary
    }

    /// Best-effort status (and receipt time) update.
    async fn push_status(&self, message_id: &MessageId, recipient: &RecipientId, status: RecipientStatus) {
        let Some(metadata) = &self.metadata else {
            return;
        };
        let delivery_status: DeliveryStatus = status.to_delivery_status();
        if let Err(e) = metadata
            .update_delivery_status(message_id, recipient, delivery_status)
            .await
        {
            warn!(message_id = %message_id, recipient = %recipient, error = %e, "Status update failed");
        }
        if delivery_status.is_acknowledged() {
            if let Err(e) = metadata
                .record_acknowledgment(message_id, recipient, self.clock.now_ms())
                .await
            {
                warn!(message_id = %message_id, recipient = %recipient, error = %e, "Recording acknowledgment failed");
            }
        }
    }
}

#[async_trait]
impl AckHandler for DeliveryTracker {
    async fn on_delivery_ack(&self, ack: DeliveryAck) {
        self.handle_ack(&ack).await;
    }
}
