//! Per-user weakness store client
//!
//! Persists the topics a user keeps getting wrong in a vector-store
//! sidecar so quiz and resource generation can read them back later.
//! Reads degrade to an empty profile when the store is unreachable.

use crate::config::WeaknessStoreConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const CONTEXT_CHARS: usize = 500;
const READ_LIMIT: u32 = 10;

/// Aggregated weakness profile for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserWeaknesses {
    pub topics: Vec<String>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<String>,
}

/// Trait for recording and reading user weaknesses
#[async_trait]
pub trait WeaknessStore: Send + Sync {
    /// Record topics a user struggled with, plus the surrounding context
    async fn record_weakness(
        &self,
        user_id: &str,
        topics: &[String],
        context: &str,
        error_details: Option<&Value>,
    ) -> Result<()>;

    /// Read a user's aggregated weaknesses, empty when none are stored
    async fn get_weaknesses(&self, user_id: &str) -> UserWeaknesses;

    /// Record quiz performance against the given topics
    async fn record_quiz_performance(
        &self,
        user_id: &str,
        topics: &[String],
        performance: Option<&Value>,
    ) -> Result<()> {
        let context = match performance {
            Some(data) => format!("Quiz performance: {}", data),
            None => "Quiz performance: N/A".to_string(),
        };
        self.record_weakness(user_id, topics, &context, None).await
    }
}

fn weakness_document(
    user_id: &str,
    topics: &[String],
    context: &str,
    error_details: Option<&Value>,
) -> String {
    let mut doc = format!(
        "User {} struggles with topics: {}. ",
        user_id,
        topics.join(", ")
    );
    if let Some(details) = error_details {
        doc.push_str(&format!("Error details: {}. ", details));
    }
    let context: String = context.chars().take(CONTEXT_CHARS).collect();
    doc.push_str(&format!("Context: {}", context));
    doc
}

/// HTTP client for the Chroma-compatible vector store
pub struct ChromaWeaknessStore {
    client: reqwest::Client,
    api_base: String,
    collection: String,
}

#[derive(Serialize)]
struct AddRequest {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<DocumentMetadata>,
}

#[derive(Serialize)]
struct DocumentMetadata {
    user_id: String,
    topics: String,
    timestamp: String,
}

#[derive(Serialize)]
struct GetRequest {
    #[serde(rename = "where")]
    filter: Value,
    limit: u32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GetResponse {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<StoredMetadata>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct StoredMetadata {
    topics: Option<String>,
}

impl ChromaWeaknessStore {
    /// Create a new store client from config
    pub fn new(config: &WeaknessStoreConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
        }
    }

    fn collection_url(&self, action: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.api_base, self.collection, action
        )
    }

    async fn try_record(
        &self,
        user_id: &str,
        topics: &[String],
        context: &str,
        error_details: Option<&Value>,
    ) -> Result<()> {
        let now = Utc::now();
        let request = AddRequest {
            ids: vec![format!("{}_{}", user_id, now.timestamp_millis())],
            documents: vec![weakness_document(user_id, topics, context, error_details)],
            metadatas: vec![DocumentMetadata {
                user_id: user_id.to_string(),
                topics: serde_json::to_string(topics)?,
                timestamp: now.to_rfc3339(),
            }],
        };

        let response = self
            .client
            .post(self.collection_url("add"))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::WeaknessStoreError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::WeaknessStoreError {
                message: format!("API error {}: {}", status, body),
            });
        }

        Ok(())
    }

    async fn try_get(&self, user_id: &str) -> Result<UserWeaknesses> {
        let request = GetRequest {
            filter: serde_json::json!({ "user_id": user_id }),
            limit: READ_LIMIT,
        };

        let response = self
            .client
            .post(self.collection_url("get"))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::WeaknessStoreError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::WeaknessStoreError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: GetResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::WeaknessStoreError {
                    message: format!("Failed to parse response: {}", e),
                })?;

        if result.ids.is_empty() {
            return Ok(UserWeaknesses::default());
        }

        let mut topics: Vec<String> = Vec::new();
        for metadata in &result.metadatas {
            if let Some(encoded) = &metadata.topics {
                if let Ok(stored) = serde_json::from_str::<Vec<String>>(encoded) {
                    for topic in stored {
                        if !topics.contains(&topic) {
                            topics.push(topic);
                        }
                    }
                }
            }
        }

        Ok(UserWeaknesses {
            count: topics.len(),
            topics,
            documents: result.documents,
        })
    }
}

#[async_trait]
impl WeaknessStore for ChromaWeaknessStore {
    async fn record_weakness(
        &self,
        user_id: &str,
        topics: &[String],
        context: &str,
        error_details: Option<&Value>,
    ) -> Result<()> {
        self.try_record(user_id, topics, context, error_details)
            .await?;
        tracing::info!(user_id = %user_id, topics = topics.len(), "Stored weakness data");
        Ok(())
    }

    async fn get_weaknesses(&self, user_id: &str) -> UserWeaknesses {
        match self.try_get(user_id).await {
            Ok(weaknesses) => weaknesses,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read user weaknesses");
                UserWeaknesses::default()
            }
        }
    }
}

/// In-memory store for tests and keyless local runs
pub struct MockWeaknessStore {
    records: Mutex<HashMap<String, UserWeaknesses>>,
}

impl MockWeaknessStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MockWeaknessStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeaknessStore for MockWeaknessStore {
    async fn record_weakness(
        &self,
        user_id: &str,
        topics: &[String],
        context: &str,
        error_details: Option<&Value>,
    ) -> Result<()> {
        let document = weakness_document(user_id, topics, context, error_details);
        let mut records = self.records.lock().await;
        let entry = records.entry(user_id.to_string()).or_default();
        for topic in topics {
            if !entry.topics.contains(topic) {
                entry.topics.push(topic.clone());
            }
        }
        entry.count = entry.topics.len();
        entry.documents.push(document);
        Ok(())
    }

    async fn get_weaknesses(&self, user_id: &str) -> UserWeaknesses {
        self.records
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Create a weakness store based on configuration
pub fn create_weakness_store(config: &WeaknessStoreConfig) -> Arc<dyn WeaknessStore> {
    if config.api_base.is_empty() {
        tracing::warn!("Weakness store URL not configured, using in-memory store");
        return Arc::new(MockWeaknessStore::new());
    }
    Arc::new(ChromaWeaknessStore::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_format() {
        let topics = vec!["Recursion".to_string(), "Graphs".to_string()];
        let doc = weakness_document("user-1", &topics, "midterm content", None);
        assert_eq!(
            doc,
            "User user-1 struggles with topics: Recursion, Graphs. Context: midterm content"
        );
    }

    #[test]
    fn test_document_includes_error_details() {
        let topics = vec!["Trees".to_string()];
        let details = json!([{"question": 1, "topic": "Trees"}]);
        let doc = weakness_document("user-1", &topics, "ctx", Some(&details));
        assert!(doc.starts_with("User user-1 struggles with topics: Trees. Error details: "));
        assert!(doc.ends_with("Context: ctx"));
    }

    #[test]
    fn test_document_truncates_context() {
        let topics = vec!["Sorting".to_string()];
        let long_context = "y".repeat(800);
        let doc = weakness_document("user-1", &topics, &long_context, None);
        let context_part = doc.split("Context: ").nth(1).unwrap();
        assert_eq!(context_part.chars().count(), 500);
    }

    #[tokio::test]
    async fn test_mock_record_and_get() {
        let store = MockWeaknessStore::new();
        let topics = vec!["Recursion".to_string(), "Graphs".to_string()];
        store
            .record_weakness("user-1", &topics, "first pass", None)
            .await
            .unwrap();
        store
            .record_weakness("user-1", &["Recursion".to_string()], "second pass", None)
            .await
            .unwrap();

        let weaknesses = store.get_weaknesses("user-1").await;
        assert_eq!(weaknesses.topics, vec!["Recursion", "Graphs"]);
        assert_eq!(weaknesses.count, 2);
        assert_eq!(weaknesses.documents.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_user_is_empty() {
        let store = MockWeaknessStore::new();
        let weaknesses = store.get_weaknesses("nobody").await;
        assert!(weaknesses.topics.is_empty());
        assert_eq!(weaknesses.count, 0);
    }

    #[tokio::test]
    async fn test_quiz_performance_context() {
        let store = MockWeaknessStore::new();
        let topics = vec!["Hashing".to_string()];
        store
            .record_quiz_performance("user-1", &topics, Some(&json!({"score": 40.0})))
            .await
            .unwrap();
        store
            .record_quiz_performance("user-1", &topics, None)
            .await
            .unwrap();

        let weaknesses = store.get_weaknesses("user-1").await;
        assert!(weaknesses.documents[0].contains("Quiz performance: {\"score\":40.0}"));
        assert!(weaknesses.documents[1].contains("Quiz performance: N/A"));
    }

    #[test]
    fn test_empty_profile_serializes_without_documents() {
        let weaknesses = UserWeaknesses::default();
        let value = serde_json::to_value(&weaknesses).unwrap();
        assert_eq!(value, json!({"topics": [], "count": 0}));
    }
}
