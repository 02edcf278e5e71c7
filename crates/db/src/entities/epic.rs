//! Epic entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Epic status, derived from the statuses of its stories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum EpicStatus {
    #[sea_orm(string_value = "planning")]
    Planning,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl Default for EpicStatus {
    fn default() -> Self {
        Self::Planning
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "epic")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub project_id: String,

    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub story_count: i32,

    pub completed_story_count: i32,

    pub status: EpicStatus,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::backlog_story::Entity")]
    BacklogStory,
}

impl Related<super::backlog_story::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BacklogStory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
