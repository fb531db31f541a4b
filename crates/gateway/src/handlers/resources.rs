//! Study material search handler

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use studybuddy_common::auth::AuthContext;
use studybuddy_common::clients::FREE_RESOURCES_CLAUSE;
use studybuddy_common::db::Repository;
use studybuddy_common::errors::{AppError, Result};

/// Request to search for study materials on specific topics
#[derive(Debug, Deserialize, Validate)]
pub struct StudyMaterialRequest {
    pub user_id: Option<Uuid>,

    #[validate(length(min = 1))]
    pub topics: Vec<String>,

    pub context: Option<String>,

    pub difficulty_level: Option<String>,

    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 20))]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

/// Search for free study materials on the requested topics. Stored
/// weaknesses are deliberately left out here; weakness-driven resources
/// have their own endpoint.
pub async fn search_study_materials(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<StudyMaterialRequest>,
) -> Result<Json<Value>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;
    if let Some(user_id) = request.user_id {
        auth.ensure_user(user_id)?;
    }

    let query = topic_search_query(
        &request.topics,
        request.context.as_deref(),
        request.difficulty_level.as_deref(),
    );
    let materials = state
        .search
        .search_materials(&query, request.max_results)
        .await;
    tracing::info!(
        topics = ?request.topics,
        found = materials.len(),
        "Study material search complete"
    );

    if let Some(user_id) = request.user_id {
        let repo = Repository::new(state.db.clone());
        if let Err(err) = repo
            .save_recommended_resources(user_id, &request.topics, &materials)
            .await
        {
            tracing::warn!(error = %err, "Failed to save recommended resources");
        }
    }

    Ok(Json(json!({ "materials": materials })))
}

/// Search query scoped strictly to the given topics
fn topic_search_query(topics: &[String], context: Option<&str>, difficulty: Option<&str>) -> String {
    let topics_str = topics.join(", ");
    let context_str = context
        .filter(|value| !value.is_empty())
        .unwrap_or("general understanding");
    let difficulty_str = difficulty
        .filter(|value| !value.is_empty())
        .unwrap_or("intermediate");

    format!(
        "Find high-quality study materials (articles, videos, tutorials, practice problems)
for learning about these specific topics: {topics_str}

CRITICAL: Focus ONLY on materials related to these topics: {topics_str}
Do NOT include materials from other subjects or unrelated topics.

Context: {context_str}

Return materials suitable for: {difficulty_str} level

Include: tutorials, practice problems, video explanations, and written guides specifically about {topics_str}

{FREE_RESOURCES_CLAUSE}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_search_query_mentions_every_topic() {
        let topics = vec!["Recursion".to_string(), "Graphs".to_string()];
        let query = topic_search_query(&topics, Some("midterm prep"), Some("advanced"));

        assert!(query.contains("these specific topics: Recursion, Graphs"));
        assert!(query.contains("Context: midterm prep"));
        assert!(query.contains("advanced level"));
        assert!(query.contains(FREE_RESOURCES_CLAUSE));
    }

    #[test]
    fn test_topic_search_query_defaults() {
        let topics = vec!["Calculus".to_string()];
        let query = topic_search_query(&topics, None, None);

        assert!(query.contains("Context: general understanding"));
        assert!(query.contains("intermediate level"));
    }
}
