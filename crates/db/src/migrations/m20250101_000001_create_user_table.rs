//! Create user table for local and remote actors.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(User::Username).string().not_null())
                    .col(ColumnDef::new(User::UsernameLower).string().not_null())
                    .col(ColumnDef::new(User::Host).string().null())
                    .col(ColumnDef::new(User::Uri).string().null().unique_key())
                    .col(ColumnDef::new(User::Inbox).string().null())
                    .col(ColumnDef::new(User::SharedInbox).string().null())
                    .col(ColumnDef::new(User::PublicKey).string().not_null())
                    .col(ColumnDef::new(User::PrivateKey).string().null())
                    .col(ColumnDef::new(User::Name).string().null())
                    .col(ColumnDef::new(User::Description).text().null())
                    .col(ColumnDef::new(User::AvatarUrl).string().null())
                    .col(ColumnDef::new(User::BannerUrl).string().null())
                    .col(
                        ColumnDef::new(User::IsLocked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(User::IsSuspended)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(User::FollowersCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(User::FollowingCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(User::LastFetchedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(User::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Local lookups go through (username_lower, host)
        manager
            .create_index(
                Index::create()
                    .name("idx_user_username_lower_host")
                    .table(User::Table)
                    .col(User::UsernameLower)
                    .col(User::Host)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_host")
                    .table(User::Table)
                    .col(User::Host)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum User {
    Table,
    Id,
    Username,
    UsernameLower,
    Host,
    Uri,
    Inbox,
    SharedInbox,
    PublicKey,
    PrivateKey,
    Name,
    Description,
    AvatarUrl,
    BannerUrl,
    IsLocked,
    IsSuspended,
    FollowersCount,
    FollowingCount,
    LastFetchedAt,
    CreatedAt,
    UpdatedAt,
}
