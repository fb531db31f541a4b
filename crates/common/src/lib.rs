//! StudyBuddy Common Library
//!
//! Shared code for the StudyBuddy services including:
//! - Database models and repository patterns
//! - External service clients (completion, OCR, search, weakness store)
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use clients::{CompletionModel, ResourceSearch, StudyMaterial, TextExtractor, WeaknessStore};
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
