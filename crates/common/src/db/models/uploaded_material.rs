//! Uploaded material entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "uploaded_materials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub filename: String,

    /// Lowercased file extension
    #[sea_orm(column_type = "Text")]
    pub file_type: String,

    pub file_size: i64,

    /// First 1000 chars of the OCR output
    #[sea_orm(column_type = "Text")]
    pub extracted_text: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub topics: serde_json::Value,

    #[sea_orm(column_type = "Text", nullable)]
    pub subject: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
