//! Database entities.

pub mod instance;
pub mod notification;
pub mod relationship;
pub mod user;

pub use instance::Entity as Instance;
pub use notification::Entity as Notification;
pub use relationship::Entity as Relationship;
pub use user::Entity as User;
