//! Create instance table for federation peers.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Instance::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Instance::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Instance::Host)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Instance::PublicKey).string().null())
                    .col(ColumnDef::new(Instance::SharedInbox).string().null())
                    .col(ColumnDef::new(Instance::SoftwareName).string().null())
                    .col(ColumnDef::new(Instance::SoftwareVersion).string().null())
                    .col(ColumnDef::new(Instance::Name).string().null())
                    .col(ColumnDef::new(Instance::Description).text().null())
                    .col(
                        ColumnDef::new(Instance::IsBlocked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Instance::LastFetchedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Instance::LastCommunicatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Instance::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Instance::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_instance_is_blocked")
                    .table(Instance::Table)
                    .col(Instance::IsBlocked)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Instance::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Instance {
    Table,
    Id,
    Host,
    PublicKey,
    SharedInbox,
    SoftwareName,
    SoftwareVersion,
    Name,
    Description,
    IsBlocked,
    LastFetchedAt,
    LastCommunicatedAt,
    CreatedAt,
    UpdatedAt,
}
