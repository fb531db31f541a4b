//! SeaORM entity models
//!
//! Database entities for the StudyBuddy study tables

mod midterm_analysis;
mod quiz;
mod quiz_result;
mod recommended_resource;
mod resources_cache;
mod uploaded_material;

pub use quiz::{
    ActiveModel as QuizActiveModel, Column as QuizColumn, Entity as QuizEntity, Model as Quiz,
};

pub use quiz_result::{
    ActiveModel as QuizResultActiveModel, Column as QuizResultColumn, Entity as QuizResultEntity,
    Model as QuizResult,
};

pub use midterm_analysis::{
    ActiveModel as MidtermAnalysisActiveModel, Column as MidtermAnalysisColumn,
    Entity as MidtermAnalysisEntity, Model as MidtermAnalysis,
};

pub use uploaded_material::{
    ActiveModel as UploadedMaterialActiveModel, Column as UploadedMaterialColumn,
    Entity as UploadedMaterialEntity, Model as UploadedMaterial,
};

pub use recommended_resource::{
    ActiveModel as RecommendedResourceActiveModel, Column as RecommendedResourceColumn,
    Entity as RecommendedResourceEntity, Model as RecommendedResource,
};

pub use resources_cache::{
    ActiveModel as ResourcesCacheActiveModel, Column as ResourcesCacheColumn,
    Entity as ResourcesCacheEntity, Model as ResourcesCache,
};
