//! Relationship entity.
//!
//! One row per ordered `(owner, subject)` pair, holding every facet of the
//! owner's stance toward the subject: follow state, pending request, block,
//! mute. The inverse direction lives in its own row; `followed_by` is always
//! computed from the inverse row, never stored.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "relationship")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user whose stance this row records
    pub owner_id: String,

    /// The user the stance is toward
    pub subject_id: String,

    /// Owner follows subject (accepted)
    #[sea_orm(default_value = false)]
    pub following: bool,

    /// Owner has a pending follow request toward subject
    #[sea_orm(default_value = false)]
    pub requested: bool,

    /// Owner blocks subject
    #[sea_orm(default_value = false)]
    pub blocking: bool,

    /// Owner mutes subject's posts
    #[sea_orm(default_value = false)]
    pub muting: bool,

    /// Owner also mutes notifications from subject
    #[sea_orm(default_value = false)]
    pub muting_notifications: bool,

    /// When a timed mute lapses; NULL = indefinite or not muting
    #[sea_orm(nullable)]
    pub mute_expires_at: Option<DateTimeWithTimeZone>,

    /// Owner features subject on their profile
    #[sea_orm(default_value = false)]
    pub endorsed: bool,

    /// Private note the owner keeps about the subject
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,

    /// Languages the owner wants from the subject; NULL = all
    #[sea_orm(nullable)]
    pub languages: Option<Json>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Owner,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::SubjectId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Subject,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether every facet is at its default and the row could be deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.following
            && !self.requested
            && !self.blocking
            && !self.muting
            && !self.muting_notifications
            && !self.endorsed
            && self.note.is_none()
            && self.languages.is_none()
    }
}
