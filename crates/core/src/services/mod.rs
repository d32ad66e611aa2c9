//! Core services.

pub mod delivery;
pub mod notification;
pub mod relationship;

pub use delivery::{DeliveryService, EntityDelivery, NoOpDelivery};
pub use notification::NotificationService;
pub use relationship::{FollowResult, RelationshipService, RelationshipView};
