//! Sprint entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sprint lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl Default for SprintStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl SprintStatus {
    /// Completed and cancelled sprints accept no further mutation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sprint")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub project_id: String,

    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub goal: Option<String>,

    pub host_id: String,

    #[sea_orm(indexed)]
    pub status: SprintStatus,

    pub start_date: DateTimeWithTimeZone,

    pub end_date: DateTimeWithTimeZone,

    /// Sprint stories (JSON array).
    #[sea_orm(column_type = "JsonBinary")]
    pub stories: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub retrospective: Option<String>,

    /// Metrics computed at completion (JSON object).
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metrics: Option<Json>,

    /// Argon2 PHC string; `None` when the sprint has no password.
    #[sea_orm(nullable)]
    pub password_hash: Option<String>,

    pub allow_guest_access: bool,

    pub version: i64,

    #[sea_orm(nullable)]
    pub completed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
