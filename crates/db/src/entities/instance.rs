//! Instance entity (known remote servers).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "instance")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub host: String,

    /// Instance-level Ed25519 public key, base64-encoded
    #[sea_orm(nullable)]
    pub public_key: Option<String>,

    /// Instance-wide shared inbox URL
    #[sea_orm(nullable)]
    pub shared_inbox: Option<String>,

    #[sea_orm(nullable)]
    pub software_name: Option<String>,

    #[sea_orm(nullable)]
    pub software_version: Option<String>,

    #[sea_orm(nullable)]
    pub name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Deliveries to and from blocked instances are dropped
    #[sea_orm(default_value = false)]
    pub is_blocked: bool,

    /// Last successful metadata fetch
    #[sea_orm(nullable)]
    pub last_fetched_at: Option<DateTimeWithTimeZone>,

    /// Last successful inbound or outbound exchange
    #[sea_orm(nullable)]
    pub last_communicated_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
