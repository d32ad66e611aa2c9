//! Database repositories.

pub mod instance;
pub mod notification;
pub mod relationship;
pub mod user;

pub use instance::InstanceRepository;
pub use notification::NotificationRepository;
pub use relationship::RelationshipRepository;
pub use user::UserRepository;
