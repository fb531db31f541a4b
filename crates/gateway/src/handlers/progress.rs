//! User progress dashboard handler

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::AppState;
use studybuddy_common::auth::AuthContext;
use studybuddy_common::db::Repository;
use studybuddy_common::errors::Result;
use studybuddy_insights::{build_progress, ProgressReport};

/// Get a user's dashboard progress: weekly goals, recent activities,
/// and the latest quiz and midterm summaries.
pub async fn get_user_progress(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ProgressReport>> {
    auth.ensure_user(user_id)?;
    tracing::info!(user_id = %user_id, "Fetching progress");

    let repo = Repository::new(state.db.clone());
    let quizzes = repo.list_quizzes(user_id).await?;
    let results = repo.list_quiz_results(user_id).await?;
    let analyses = repo.list_midterm_analyses(user_id).await?;
    let weaknesses = state.weaknesses.get_weaknesses(&user_id.to_string()).await;

    let report = build_progress(
        &quizzes,
        &results,
        &analyses,
        &weaknesses.topics,
        Utc::now(),
    );
    Ok(Json(report))
}
