//! Per-recipient delivery state machine.
//!
//! ```text
//! ANNOUNCED ──→ DELIVERED ──→ READ
//!     ├──────→ BOUNCED
//!     └──────→ FAILED   (retry exhaustion only)
//! ```

use serde::{Deserialize, Serialize};
use shared_types::DeliveryStatus;

use super::announcement::AckStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientStatus {
    Announced,
    Delivered,
    Read,
    Bounced,
    Failed,
}

impl RecipientStatus {
    /// Target state if `self → to` is legal.
    pub fn transition(self, to: RecipientStatus) -> Option<RecipientStatus> {
        use RecipientStatus::*;
        match (self, to) {
            (Announced, Delivered | Bounced | Failed) | (Delivered, Read) => Some(to),
            _ => None,
        }
    }

    /// Receipt confirmed.
    pub fn is_success(self) -> bool {
        matches!(self, RecipientStatus::Delivered | RecipientStatus::Read)
    }

    /// No further transition except `Delivered → Read`.
    pub fn is_terminal(self) -> bool {
        self != RecipientStatus::Announced
    }

    pub fn to_delivery_status(self) -> DeliveryStatus {
        match self {
            RecipientStatus::Announced => DeliveryStatus::InTransit,
            RecipientStatus::Delivered => DeliveryStatus::Delivered,
            RecipientStatus::Read => DeliveryStatus::Read,
            RecipientStatus::Bounced => DeliveryStatus::Bounced,
            RecipientStatus::Failed => DeliveryStatus::Failed,
        }
    }
}

impl From<AckStatus> for RecipientStatus {
    fn from(status: AckStatus) -> Self {
        match status {
            AckStatus::Delivered => RecipientStatus::Delivered,
            AckStatus::Read => RecipientStatus::Read,
            AckStatus::Bounced => RecipientStatus::Bounced,
            AckStatus::Failed => RecipientStatus::Failed,
        }
    }
}
