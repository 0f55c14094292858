//! Delivery tracking domain: wire types, recipient state machine, backoff,
//! duplicate suppression and peer selection.

pub mod announcement;
pub mod backoff;
pub mod peers;
pub mod pending;
pub mod seen;
pub mod status;

pub use announcement::{
    AckStatus, Announcement, AnnouncementKind, AnnouncementPayload, DeliveryAck,
    MessageDeliveryMetadata,
};
pub use backoff::backoff_delay_ms;
pub use peers::{select_peers, PeerInfo};
pub use pending::PendingDelivery;
pub use seen::SeenCache;
pub use status::RecipientStatus;
