//! User entity (local and remote actors).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub username: String,

    pub username_lower: String,

    /// NULL = local user, Some(host) = remote user
    #[sea_orm(nullable)]
    pub host: Option<String>,

    /// Canonical Versia URI (remote users; local users derive it from config)
    #[sea_orm(unique, nullable)]
    pub uri: Option<String>,

    /// Inbox URL for delivering entities (remote users)
    #[sea_orm(nullable)]
    pub inbox: Option<String>,

    /// Instance-wide shared inbox URL (remote users)
    #[sea_orm(nullable)]
    pub shared_inbox: Option<String>,

    /// Ed25519 public key, base64-encoded raw bytes
    pub public_key: String,

    /// Ed25519 private key (local users only)
    #[sea_orm(nullable)]
    pub private_key: Option<String>,

    /// Display name
    #[sea_orm(nullable)]
    pub name: Option<String>,

    /// Profile description
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Avatar URL
    #[sea_orm(nullable)]
    pub avatar_url: Option<String>,

    /// Banner URL
    #[sea_orm(nullable)]
    pub banner_url: Option<String>,

    /// Is this account locked (requires follow approval)?
    #[sea_orm(default_value = false)]
    pub is_locked: bool,

    /// Is this account suspended?
    #[sea_orm(default_value = false)]
    pub is_suspended: bool,

    /// Followers count (denormalized)
    #[sea_orm(default_value = 0)]
    pub followers_count: i32,

    /// Following count (denormalized)
    #[sea_orm(default_value = 0)]
    pub following_count: i32,

    /// Last time this remote user was fetched
    #[sea_orm(nullable)]
    pub last_fetched_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::relationship::Entity")]
    Relationships,

    #[sea_orm(has_many = "super::notification::Entity")]
    Notifications,
}

impl Related<super::relationship::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Relationships.def()
    }
}

impl Related<super::notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether this user belongs to this instance.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.host.is_none()
    }

    /// Whether this user lives on a remote instance.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        self.host.is_some()
    }
}
