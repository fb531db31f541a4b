//! Study-material search client
//!
//! Wraps the Perplexity search API. Lookups degrade to an empty result
//! list so a search outage never fails the endpoint that asked for
//! recommendations.

use crate::config::SearchConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const MAX_TOKENS_PER_PAGE: u32 = 1024;
const DESCRIPTION_CHARS: usize = 200;

/// Appended to every search query so paid or gated resources are filtered out
pub const FREE_RESOURCES_CLAUSE: &str = "IMPORTANT: Only return resources that are completely free to access, no paywalls, no subscriptions required. Include free videos (YouTube, educational platforms), free articles, free research papers, open-access journals, free tutorials, and free practice problems. Exclude any resources that require payment, subscription, or registration fees.";

/// A recommended study resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMaterial {
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Trait for study-material lookup
#[async_trait]
pub trait ResourceSearch: Send + Sync {
    /// Search for study materials, returning an empty list on failure
    async fn search_materials(&self, query: &str, max_results: u32) -> Vec<StudyMaterial>;
}

/// Compose a search query from the user's topics and known weaknesses
pub fn build_personalized_query(
    topics: &[String],
    user_weaknesses: &[String],
    context: &str,
    difficulty_level: &str,
) -> String {
    let mut parts = Vec::new();

    if !user_weaknesses.is_empty() {
        parts.push(format!(
            "User struggles with: {}",
            user_weaknesses.join(", ")
        ));
    }

    parts.push(format!("Find study materials for: {}", topics.join(", ")));
    parts.push(format!("Difficulty level: {}", difficulty_level));

    if !context.is_empty() {
        parts.push(format!("Context: {}", context));
    }

    parts.push(
        "Include: tutorials, practice problems, video explanations, and written guides"
            .to_string(),
    );
    parts.push(FREE_RESOURCES_CLAUSE.to_string());

    parts.join(". ")
}

/// Perplexity search API client
pub struct PerplexityClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: u32,
    max_tokens_per_page: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SearchResult {
    title: Option<String>,
    name: Option<String>,
    url: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    content: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn into_material(result: SearchResult) -> StudyMaterial {
    let title = non_empty(result.title)
        .or(non_empty(result.name))
        .unwrap_or_else(|| "Untitled Resource".to_string());
    let url = non_empty(result.url)
        .or(non_empty(result.link))
        .unwrap_or_else(|| "#".to_string());
    let description = non_empty(result.snippet)
        .or(non_empty(result.content))
        .map(|text| truncate_chars(&text, DESCRIPTION_CHARS))
        .unwrap_or_else(|| "Study material from Perplexity search".to_string());

    StudyMaterial {
        title,
        description,
        url,
        source: Some("Perplexity Search".to_string()),
    }
}

impl PerplexityClient {
    /// Create a new search client from config
    pub fn new(config: &SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
        }
    }

    async fn try_search(&self, query: &str, max_results: u32) -> Result<Vec<StudyMaterial>> {
        let url = format!("{}/search", self.api_base);

        let request = SearchRequest {
            query,
            max_results,
            max_tokens_per_page: MAX_TOKENS_PER_PAGE,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::SearchError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SearchError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: SearchResponse = response.json().await.map_err(|e| AppError::SearchError {
            message: format!("Failed to parse response: {}", e),
        })?;

        Ok(result.results.into_iter().map(into_material).collect())
    }
}

#[async_trait]
impl ResourceSearch for PerplexityClient {
    async fn search_materials(&self, query: &str, max_results: u32) -> Vec<StudyMaterial> {
        match self.try_search(query, max_results).await {
            Ok(materials) => materials,
            Err(e) => {
                tracing::error!(error = %e, "Study material search failed");
                Vec::new()
            }
        }
    }
}

/// Mock search for testing
pub struct MockResourceSearch {
    materials: Vec<StudyMaterial>,
}

impl MockResourceSearch {
    /// Mock that returns the given materials for any query
    pub fn new(materials: Vec<StudyMaterial>) -> Self {
        Self { materials }
    }

    /// Mock that finds nothing
    pub fn empty() -> Self {
        Self {
            materials: Vec::new(),
        }
    }
}

#[async_trait]
impl ResourceSearch for MockResourceSearch {
    async fn search_materials(&self, _query: &str, max_results: u32) -> Vec<StudyMaterial> {
        self.materials
            .iter()
            .take(max_results as usize)
            .cloned()
            .collect()
    }
}

/// Create a resource search client based on configuration
pub fn create_resource_search(config: &SearchConfig) -> Arc<dyn ResourceSearch> {
    match config.api_key.as_deref() {
        Some(key) if !key.is_empty() => Arc::new(PerplexityClient::new(config)),
        _ => {
            tracing::warn!("Search API key not configured, material lookups will return nothing");
            Arc::new(MockResourceSearch::empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(title: &str) -> StudyMaterial {
        StudyMaterial {
            title: title.to_string(),
            description: "desc".to_string(),
            url: "https://example.test".to_string(),
            source: Some("Perplexity Search".to_string()),
        }
    }

    #[test]
    fn test_personalized_query_with_weaknesses() {
        let topics = vec!["Recursion".to_string()];
        let weaknesses = vec!["Dynamic Programming".to_string()];
        let query = build_personalized_query(&topics, &weaknesses, "", "intermediate");

        assert!(query.starts_with(
            "User struggles with: Dynamic Programming. Find study materials for: Recursion. Difficulty level: intermediate"
        ));
        assert!(query.contains("completely free to access"));
        assert!(!query.contains("Context:"));
    }

    #[test]
    fn test_personalized_query_with_context() {
        let topics = vec!["Graphs".to_string(), "Trees".to_string()];
        let query = build_personalized_query(&topics, &[], "exam next week", "beginner");

        assert!(query.starts_with("Find study materials for: Graphs, Trees"));
        assert!(query.contains("Context: exam next week"));
        assert!(query.contains("Difficulty level: beginner"));
    }

    #[test]
    fn test_result_mapping_defaults() {
        let material = into_material(SearchResult::default());
        assert_eq!(material.title, "Untitled Resource");
        assert_eq!(material.url, "#");
        assert_eq!(material.description, "Study material from Perplexity search");
        assert_eq!(material.source.as_deref(), Some("Perplexity Search"));
    }

    #[test]
    fn test_result_mapping_alternate_keys() {
        let material = into_material(SearchResult {
            name: Some("Sorting Guide".to_string()),
            link: Some("https://example.test/sorting".to_string()),
            content: Some("A walkthrough of sorting algorithms".to_string()),
            ..Default::default()
        });
        assert_eq!(material.title, "Sorting Guide");
        assert_eq!(material.url, "https://example.test/sorting");
        assert_eq!(material.description, "A walkthrough of sorting algorithms");
    }

    #[test]
    fn test_description_truncated() {
        let material = into_material(SearchResult {
            snippet: Some("x".repeat(300)),
            ..Default::default()
        });
        assert_eq!(material.description.chars().count(), 200);
    }

    #[tokio::test]
    async fn test_mock_honors_max_results() {
        let search = MockResourceSearch::new(vec![material("a"), material("b"), material("c")]);
        let found = search.search_materials("anything", 2).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].title, "a");
    }

    #[tokio::test]
    async fn test_empty_mock_finds_nothing() {
        let search = MockResourceSearch::empty();
        assert!(search.search_materials("anything", 5).await.is_empty());
    }
}
