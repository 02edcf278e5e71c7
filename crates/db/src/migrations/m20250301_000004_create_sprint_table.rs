//! Create sprint table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sprint::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sprint::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sprint::ProjectId).string_len(32).not_null())
                    .col(ColumnDef::new(Sprint::Name).string_len(128).not_null())
                    .col(ColumnDef::new(Sprint::Goal).text())
                    .col(ColumnDef::new(Sprint::HostId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Sprint::Status)
                            .string_len(16)
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(Sprint::StartDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sprint::EndDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sprint::Stories)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Sprint::Retrospective).text())
                    .col(ColumnDef::new(Sprint::Metrics).json_binary())
                    .col(ColumnDef::new(Sprint::PasswordHash).string_len(256))
                    .col(
                        ColumnDef::new(Sprint::AllowGuestAccess)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Sprint::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Sprint::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Sprint::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Sprint::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sprint_project_status")
                    .table(Sprint::Table)
                    .col(Sprint::ProjectId)
                    .col(Sprint::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sprint::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Sprint {
    Table,
    Id,
    ProjectId,
    Name,
    Goal,
    HostId,
    Status,
    StartDate,
    EndDate,
    Stories,
    Retrospective,
    Metrics,
    PasswordHash,
    AllowGuestAccess,
    Version,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}
