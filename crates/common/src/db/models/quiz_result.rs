//! Quiz result entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quiz_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    /// Text, not a foreign key: quizzes generated while persistence was
    /// degraded carry temporary ids that never hit the quizzes table.
    #[sea_orm(column_type = "Text")]
    pub quiz_id: String,

    pub score: f64,

    #[sea_orm(column_type = "JsonBinary")]
    pub answers: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub weak_topics: serde_json::Value,

    /// Seconds spent on the quiz
    pub time_spent: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub quiz_title: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub quiz_topics: Option<serde_json::Value>,

    pub correct_count: Option<i32>,

    pub wrong_count: Option<i32>,

    pub total_questions: Option<i32>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub weak_areas: Option<serde_json::Value>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub recommended_resources: Option<serde_json::Value>,

    pub completed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
