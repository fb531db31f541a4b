//! HTTP clients for external services
//!
//! Each client is a trait seam with a reqwest-backed implementation and a
//! mock for tests:
//! - LLM chat completions (quiz generation, grading analysis, insights)
//! - OCR text extraction for uploaded documents
//! - Web resource search (study material recommendations)
//! - Vector-store weakness tracking

pub mod llm;
pub mod ocr;
pub mod search;
pub mod weakness;

pub use llm::{create_completion_model, CompletionModel, MockCompletionModel};
pub use ocr::{create_text_extractor, validate_extension, MockTextExtractor, TextExtractor};
pub use search::{
    build_personalized_query, create_resource_search, MockResourceSearch, ResourceSearch,
    StudyMaterial, FREE_RESOURCES_CLAUSE,
};
pub use weakness::{create_weakness_store, MockWeaknessStore, UserWeaknesses, WeaknessStore};
