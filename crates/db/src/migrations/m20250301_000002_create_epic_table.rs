//! Create epic table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Epic::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Epic::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Epic::ProjectId).string_len(32).not_null())
                    .col(ColumnDef::new(Epic::Name).string_len(256).not_null())
                    .col(ColumnDef::new(Epic::Description).text())
                    .col(
                        ColumnDef::new(Epic::StoryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Epic::CompletedStoryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Epic::Status)
                            .string_len(16)
                            .not_null()
                            .default("planning"),
                    )
                    .col(
                        ColumnDef::new(Epic::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Epic::UpdatedAt)
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
                    .name("idx_epic_project_id")
                    .table(Epic::Table)
                    .col(Epic::ProjectId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Epic::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Epic {
    Table,
    Id,
    ProjectId,
    Name,
    Description,
    StoryCount,
    CompletedStoryCount,
    Status,
    CreatedAt,
    UpdatedAt,
}
