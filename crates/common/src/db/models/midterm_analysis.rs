//! Midterm analysis entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "midterm_analyses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub filename: String,

    #[sea_orm(column_type = "Text")]
    pub course_name: String,

    /// Questions the student got wrong or partially wrong, for display
    #[sea_orm(column_type = "JsonBinary")]
    pub errors: serde_json::Value,

    /// OCR output, capped at 5000 chars
    #[sea_orm(column_type = "Text")]
    pub extracted_text: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub recommended_resources: serde_json::Value,

    #[sea_orm(column_type = "JsonBinary")]
    pub error_topics: serde_json::Value,

    pub total_errors: i32,

    pub correct_count: i32,

    pub wrong_count: i32,

    pub partially_correct_count: i32,

    /// Null when no marks were detected on the paper
    pub total_marks_received: Option<f64>,

    pub total_marks_possible: Option<f64>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
