//! Planning session entity (a live estimation room).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Card deck a session votes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DeckType {
    /// 0, 1, 2, 3, 5, 8, 13, ...
    #[sea_orm(string_value = "fibonacci")]
    Fibonacci,
    /// XS, S, M, L, XL, ...
    #[sea_orm(string_value = "tshirt")]
    #[serde(rename = "tshirt")]
    TShirt,
    /// 0, 1, 2, 4, 8, 16, ...
    #[sea_orm(string_value = "powers")]
    Powers,
    /// Host-defined cards stored in `custom_deck`.
    #[sea_orm(string_value = "custom")]
    Custom,
}

impl Default for DeckType {
    fn default() -> Self {
        Self::Fibonacci
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "planning_session")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,

    /// Participant who created the session.
    #[sea_orm(indexed)]
    pub host_id: String,

    /// Participants (JSON array).
    #[sea_orm(column_type = "JsonBinary")]
    pub participants: Json,

    /// Session stories with their voting history (JSON array).
    #[sea_orm(column_type = "JsonBinary")]
    pub stories: Json,

    /// Story the open round is about, if any.
    #[sea_orm(nullable)]
    pub current_story_id: Option<String>,

    pub voting_in_progress: bool,

    pub votes_revealed: bool,

    pub deck_type: DeckType,

    /// Cards of a custom deck (JSON array of strings).
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub custom_deck: Option<Json>,

    #[sea_orm(indexed)]
    pub is_active: bool,

    /// Incremented on every write; guards compare-and-swap updates.
    pub version: i64,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
