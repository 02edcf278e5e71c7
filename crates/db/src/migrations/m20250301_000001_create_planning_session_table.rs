//! Create planning_session table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlanningSession::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlanningSession::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::Name)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::HostId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::Participants)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::Stories)
                            .json_binary()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(PlanningSession::CurrentStoryId).string_len(32))
                    .col(
                        ColumnDef::new(PlanningSession::VotingInProgress)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::VotesRevealed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::DeckType)
                            .string_len(16)
                            .not_null()
                            .default("fibonacci"),
                    )
                    .col(ColumnDef::new(PlanningSession::CustomDeck).json_binary())
                    .col(
                        ColumnDef::new(PlanningSession::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PlanningSession::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index on host_id for "my sessions"
        manager
            .create_index(
                Index::create()
                    .name("idx_planning_session_host_id")
                    .table(PlanningSession::Table)
                    .col(PlanningSession::HostId)
                    .to_owned(),
            )
            .await?;

        // Index on is_active for the stale-participant sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_planning_session_is_active")
                    .table(PlanningSession::Table)
                    .col(PlanningSession::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlanningSession::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PlanningSession {
    Table,
    Id,
    Name,
    HostId,
    Participants,
    Stories,
    CurrentStoryId,
    VotingInProgress,
    VotesRevealed,
    DeckType,
    CustomDeck,
    IsActive,
    Version,
    CreatedAt,
    UpdatedAt,
}
