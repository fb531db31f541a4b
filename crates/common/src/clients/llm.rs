//! Chat-completion client
//!
//! Talks to an OpenAI-compatible completions endpoint (NVIDIA NIM by
//! default). All quiz generation, grading analysis, and insight text flows
//! through the [`CompletionModel`] trait.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Lower bound applied to requested completion budgets
pub const MIN_COMPLETION_TOKENS: u32 = 2048;

/// Upper bound applied to requested completion budgets
pub const MAX_COMPLETION_TOKENS: u32 = 8192;

const TOP_P: f64 = 0.95;

/// Trait for chat-completion generation
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Run a completion and return the raw model text
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// NVIDIA NIM chat-completion client (OpenAI-compatible wire format)
pub struct NimCompletionClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f64,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl NimCompletionClient {
    /// Create a new completion client from config
    pub fn new(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl CompletionModel for NimCompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: max_tokens.clamp(MIN_COMPLETION_TOKENS, MAX_COMPLETION_TOKENS),
            top_p: TOP_P,
        };

        tracing::debug!(
            model = %self.model,
            max_tokens = request.max_tokens,
            temperature = temperature,
            "Requesting completion"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::CompletionError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CompletionError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::CompletionError {
                    message: format!("Failed to parse response: {}", e),
                })?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::CompletionError {
                message: "Response contained no choices".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock completion model for testing
pub struct MockCompletionModel {
    response: Option<String>,
}

impl MockCompletionModel {
    /// Mock that always returns the given text
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
        }
    }

    /// Mock that always fails, for exercising degradation paths
    pub fn failing() -> Self {
        Self { response: None }
    }
}

#[async_trait]
impl CompletionModel for MockCompletionModel {
    async fn complete(
        &self,
        _prompt: &str,
        _system: Option<&str>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(AppError::CompletionError {
                message: "No completion model configured".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

/// Create a completion model based on configuration
///
/// Without an API key every completion fails, which drives callers onto
/// their fallback content instead of returning misleading canned text.
pub fn create_completion_model(config: &LlmConfig) -> Arc<dyn CompletionModel> {
    match config.api_key.as_deref() {
        Some(key) if !key.is_empty() => Arc::new(NimCompletionClient::new(config)),
        _ => {
            tracing::warn!("LLM API key not configured, completions will fail over to fallbacks");
            Arc::new(MockCompletionModel::failing())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_canned_response() {
        let model = MockCompletionModel::new("[]");
        let text = model.complete("prompt", None, 0.7, 4096).await.unwrap();
        assert_eq!(text, "[]");
    }

    #[tokio::test]
    async fn test_failing_mock_errors() {
        let model = MockCompletionModel::failing();
        let err = model.complete("prompt", None, 0.7, 4096).await.unwrap_err();
        assert!(matches!(err, AppError::CompletionError { .. }));
    }

    #[test]
    fn test_token_clamp_bounds() {
        assert_eq!(100u32.clamp(MIN_COMPLETION_TOKENS, MAX_COMPLETION_TOKENS), 2048);
        assert_eq!(4096u32.clamp(MIN_COMPLETION_TOKENS, MAX_COMPLETION_TOKENS), 4096);
        assert_eq!(20_000u32.clamp(MIN_COMPLETION_TOKENS, MAX_COMPLETION_TOKENS), 8192);
    }

    #[test]
    fn test_factory_without_key_uses_mock() {
        let config = LlmConfig {
            api_base: "https://example.test/v1".into(),
            api_key: None,
            model: "test-model".into(),
            timeout_secs: 5,
        };
        let model = create_completion_model(&config);
        assert_eq!(model.model_name(), "mock-completion");
    }
}
