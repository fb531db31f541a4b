//! Text extraction client
//!
//! Sends uploaded files to the OCR sidecar and returns the recognized
//! text. Extension checks live here so every upload endpoint rejects
//! unsupported formats the same way.

use crate::config::OcrConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// File extensions the extractor accepts
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "gif", "bmp"];

/// Lowercased extension of a filename (the whole name when it has no dot)
pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or(filename)
        .to_lowercase()
}

/// Check a filename against the supported formats
pub fn validate_extension(filename: &str) -> Result<String> {
    let extension = file_extension(filename);
    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(AppError::UnsupportedFileType { extension })
    }
}

/// Trait for extracting text from uploaded files
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from a file, rejecting unsupported extensions
    async fn extract_text(&self, filename: &str, content: Vec<u8>) -> Result<String>;
}

/// HTTP client for the OCR sidecar
pub struct OcrClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

impl OcrClient {
    /// Create a new OCR client from config
    pub fn new(config: &OcrConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl TextExtractor for OcrClient {
    async fn extract_text(&self, filename: &str, content: Vec<u8>) -> Result<String> {
        validate_extension(filename)?;

        let url = format!("{}/ocr", self.api_base);
        let part = reqwest::multipart::Part::bytes(content).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| AppError::OcrError {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::OcrError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: OcrResponse = response.json().await.map_err(|e| AppError::OcrError {
            message: format!("Failed to parse response: {}", e),
        })?;

        require_text(result.text)
    }
}

fn require_text(text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(AppError::InvalidFormat {
            message: "No text could be extracted from the file".to_string(),
        });
    }
    Ok(text)
}

/// Mock extractor for testing
pub struct MockTextExtractor {
    text: Option<String>,
}

impl MockTextExtractor {
    /// Mock that returns the given text for any supported file
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    /// Mock whose extractions always fail
    pub fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl TextExtractor for MockTextExtractor {
    async fn extract_text(&self, filename: &str, _content: Vec<u8>) -> Result<String> {
        validate_extension(filename)?;
        match &self.text {
            Some(text) => Ok(text.clone()),
            None => Err(AppError::OcrError {
                message: "Mock extraction failure".to_string(),
            }),
        }
    }
}

/// Create a text extractor based on configuration
pub fn create_text_extractor(config: &OcrConfig) -> Arc<dyn TextExtractor> {
    if config.api_base.is_empty() {
        tracing::warn!("OCR service URL not configured, text extraction will fail");
        return Arc::new(MockTextExtractor::failing());
    }
    Arc::new(OcrClient::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_parsing() {
        assert_eq!(file_extension("Notes.PDF"), "pdf");
        assert_eq!(file_extension("scan.final.jpeg"), "jpeg");
        assert_eq!(file_extension("README"), "readme");
    }

    #[test]
    fn test_supported_extensions_accepted() {
        assert_eq!(validate_extension("midterm.pdf").unwrap(), "pdf");
        assert_eq!(validate_extension("photo.PNG").unwrap(), "png");
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let err = validate_extension("paper.docx").unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFileType { extension } if extension == "docx"));
    }

    #[tokio::test]
    async fn test_mock_returns_text() {
        let extractor = MockTextExtractor::new("Chapter 1: Sorting");
        let text = extractor
            .extract_text("notes.pdf", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(text, "Chapter 1: Sorting");
    }

    #[tokio::test]
    async fn test_mock_still_validates_extension() {
        let extractor = MockTextExtractor::new("text");
        let err = extractor.extract_text("report.docx", vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFileType { .. }));
    }

    #[test]
    fn test_blank_text_rejected() {
        let err = require_text("  \n ".to_string()).unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));
        assert_eq!(require_text("hello".to_string()).unwrap(), "hello");
    }
}
