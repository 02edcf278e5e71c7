//! Backlog story entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Where a backlog story currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum BacklogStatus {
    /// Available for sprint planning.
    #[sea_orm(string_value = "backlog")]
    Backlog,
    /// Pulled into a draft or active sprint.
    #[sea_orm(string_value = "in_sprint")]
    InSprint,
    /// Finished in some sprint.
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl Default for BacklogStatus {
    fn default() -> Self {
        Self::Backlog
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "backlog_story")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub project_id: String,

    #[sea_orm(indexed, nullable)]
    pub epic_id: Option<String>,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(indexed)]
    pub status: BacklogStatus,

    #[sea_orm(nullable)]
    pub estimate: Option<String>,

    /// Append-only sprint attempt records (JSON array).
    #[sea_orm(column_type = "JsonBinary")]
    pub sprint_attempts: Json,

    #[sea_orm(nullable)]
    pub completed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::epic::Entity",
        from = "Column::EpicId",
        to = "super::epic::Column::Id",
        on_delete = "SetNull"
    )]
    Epic,
}

impl Related<super::epic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Epic.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
