//! API handlers module

use std::time::Instant;

use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use studybuddy_common::clients::{CompletionModel, TextExtractor};
use studybuddy_common::errors::{AppError, Result};
use studybuddy_common::metrics::record_ai_request;

pub mod health;
pub mod materials;
pub mod midterm;
pub mod progress;
pub mod quiz;
pub mod rag;
pub mod resources;
pub mod results;
pub mod weaknesses;

/// Query string carrying the acting user for scoped reads
#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// Run a completion call and record its latency metric.
pub(crate) async fn timed_completion(
    model: &dyn CompletionModel,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    let started = Instant::now();
    let outcome = model.complete(prompt, None, temperature, max_tokens).await;
    record_ai_request("completion", started.elapsed().as_secs_f64(), outcome.is_ok());
    outcome
}

/// Run OCR text extraction and record its latency metric.
pub(crate) async fn timed_extraction(
    extractor: &dyn TextExtractor,
    filename: &str,
    content: Vec<u8>,
) -> Result<String> {
    let started = Instant::now();
    let outcome = extractor.extract_text(filename, content).await;
    record_ai_request("ocr", started.elapsed().as_secs_f64(), outcome.is_ok());
    outcome
}

/// Strings out of a stored JSON array, skipping anything else
pub(crate) fn string_values(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Parsed multipart upload: the file plus its form fields
pub(crate) struct UploadForm {
    pub filename: String,
    pub content: Vec<u8>,
    pub user_id: Uuid,
    pub course_name: Option<String>,
}

/// Read a `file` + `user_id` (+ optional `course_name`) multipart form
pub(crate) async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut user_id: Option<Uuid> = None;
    let mut course_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, bytes.to_vec()));
            }
            "user_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                let parsed = Uuid::parse_str(text.trim()).map_err(|_| AppError::InvalidFormat {
                    message: "user_id must be a valid UUID".to_string(),
                })?;
                user_id = Some(parsed);
            }
            "course_name" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    course_name = Some(text);
                }
            }
            _ => {}
        }
    }

    let (filename, content) = file.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;
    let user_id = user_id.ok_or_else(|| AppError::MissingField {
        field: "user_id".to_string(),
    })?;

    Ok(UploadForm {
        filename,
        content,
        user_id,
        course_name,
    })
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::InvalidFormat {
        message: format!("Invalid multipart payload: {err}"),
    }
}
