//! Per-user recommended-resources cache entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_resources_cache")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub user_id: Uuid,

    #[sea_orm(column_type = "JsonBinary")]
    pub resources: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub recommended_topics: serde_json::Value,

    #[sea_orm(column_type = "Text")]
    pub learning_path: String,

    pub total_weak_topics: i32,

    pub cached_at: DateTimeWithTimeZone,

    /// Timestamp of the newest activity the cached payload was computed from.
    /// Activity newer than this makes the entry stale.
    pub data_timestamp: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
