//! Create relationship table.
//!
//! One row per ordered (owner, subject) pair holding all relationship facets.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_user_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Relationship::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Relationship::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Relationship::OwnerId).string().not_null())
                    .col(ColumnDef::new(Relationship::SubjectId).string().not_null())
                    .col(
                        ColumnDef::new(Relationship::Following)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Relationship::Requested)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Relationship::Blocking)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Relationship::Muting)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Relationship::MutingNotifications)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Relationship::MuteExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Relationship::Endorsed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Relationship::Note).text().null())
                    .col(ColumnDef::new(Relationship::Languages).json_binary().null())
                    .col(
                        ColumnDef::new(Relationship::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Relationship::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relationship_owner")
                            .from(Relationship::Table, Relationship::OwnerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relationship_subject")
                            .from(Relationship::Table, Relationship::SubjectId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one row per direction
        manager
            .create_index(
                Index::create()
                    .name("idx_relationship_owner_subject")
                    .table(Relationship::Table)
                    .col(Relationship::OwnerId)
                    .col(Relationship::SubjectId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Follower fan-out scans by subject
        manager
            .create_index(
                Index::create()
                    .name("idx_relationship_subject_following")
                    .table(Relationship::Table)
                    .col(Relationship::SubjectId)
                    .col(Relationship::Following)
                    .to_owned(),
            )
            .await?;

        // Timed-unmute sweep scans by expiry
        manager
            .create_index(
                Index::create()
                    .name("idx_relationship_mute_expires_at")
                    .table(Relationship::Table)
                    .col(Relationship::MuteExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Relationship::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Relationship {
    Table,
    Id,
    OwnerId,
    SubjectId,
    Following,
    Requested,
    Blocking,
    Muting,
    MutingNotifications,
    MuteExpiresAt,
    Endorsed,
    Note,
    Languages,
    CreatedAt,
    UpdatedAt,
}
