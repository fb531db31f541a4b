//! User weakness read and update handlers

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::AppState;
use studybuddy_common::auth::AuthContext;
use studybuddy_common::clients::UserWeaknesses;
use studybuddy_common::errors::Result;

/// Request to merge fresh quiz performance into stored weaknesses
#[derive(Debug, Deserialize)]
pub struct WeaknessUpdateRequest {
    pub topics: Vec<String>,
    pub performance_data: Option<Value>,
}

/// Get the user's identified weaknesses from the weakness store
pub async fn get_user_weaknesses(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserWeaknesses>> {
    auth.ensure_user(user_id)?;
    let weaknesses = state.weaknesses.get_weaknesses(&user_id.to_string()).await;
    Ok(Json(weaknesses))
}

/// Update stored weaknesses from quiz performance
pub async fn update_user_weaknesses(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(request): Json<WeaknessUpdateRequest>,
) -> Result<Json<Value>> {
    auth.ensure_user(user_id)?;
    state
        .weaknesses
        .record_quiz_performance(
            &user_id.to_string(),
            &request.topics,
            request.performance_data.as_ref(),
        )
        .await?;

    tracing::info!(user_id = %user_id, topics = request.topics.len(), "Weaknesses updated");
    Ok(Json(json!({"message": "Weaknesses updated successfully"})))
}
