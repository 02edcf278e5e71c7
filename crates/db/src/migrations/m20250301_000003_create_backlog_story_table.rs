//! Create backlog_story table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BacklogStory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BacklogStory::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BacklogStory::ProjectId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BacklogStory::EpicId).string_len(32))
                    .col(
                        ColumnDef::new(BacklogStory::Title)
                            .string_len(512)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BacklogStory::Description).text())
                    .col(
                        ColumnDef::new(BacklogStory::Status)
                            .string_len(16)
                            .not_null()
                            .default("backlog"),
                    )
                    .col(ColumnDef::new(BacklogStory::Estimate).string_len(32))
                    .col(
                        ColumnDef::new(BacklogStory::SprintAttempts)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(BacklogStory::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(BacklogStory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BacklogStory::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_backlog_story_epic")
                            .from(BacklogStory::Table, BacklogStory::EpicId)
                            .to(Epic::Table, Epic::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Composite index for sprint planning queries (project + status)
        manager
            .create_index(
                Index::create()
                    .name("idx_backlog_story_project_status")
                    .table(BacklogStory::Table)
                    .col(BacklogStory::ProjectId)
                    .col(BacklogStory::Status)
                    .to_owned(),
            )
            .await?;

        // Index on epic_id for epic count recomputation
        manager
            .create_index(
                Index::create()
                    .name("idx_backlog_story_epic_id")
                    .table(BacklogStory::Table)
                    .col(BacklogStory::EpicId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BacklogStory::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum BacklogStory {
    Table,
    Id,
    ProjectId,
    EpicId,
    Title,
    Description,
    Status,
    Estimate,
    SprintAttempts,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Epic {
    Table,
    Id,
}
