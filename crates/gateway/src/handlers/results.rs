//! Quiz result persistence and lookup handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::handlers::UserIdQuery;
use crate::AppState;
use studybuddy_common::auth::AuthContext;
use studybuddy_common::db::{NewQuizResult, QuizSummaryUpdate, Repository};
use studybuddy_common::errors::{AppError, Result};

/// Request to persist a completed quiz's result
#[derive(Debug, Deserialize)]
pub struct SaveResultRequest {
    pub user_id: Uuid,
    pub quiz_id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub answers: Vec<Value>,
    #[serde(default)]
    pub weak_topics: Vec<String>,
    pub time_spent: Option<i32>,
    pub quiz_title: Option<String>,
    #[serde(default)]
    pub quiz_topics: Vec<String>,
    pub correct_count: Option<i32>,
    pub wrong_count: Option<i32>,
    pub total_questions: Option<i32>,
}

/// Request to fill in a result's summary after quiz completion
#[derive(Debug, Deserialize)]
pub struct SaveSummaryRequest {
    pub user_id: Uuid,
    pub quiz_id: String,
    pub score: Option<f64>,
    pub correct_count: Option<i32>,
    pub wrong_count: Option<i32>,
    pub total_questions: Option<i32>,
    #[serde(default)]
    pub weak_areas: Vec<Value>,
    #[serde(default)]
    pub recommended_resources: Vec<Value>,
}

/// Save a quiz result, then feed the weak topics back into the
/// weakness store.
pub async fn save_quiz_result(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<SaveResultRequest>,
) -> Result<Json<Value>> {
    auth.ensure_user(request.user_id)?;
    tracing::info!(
        user_id = %request.user_id,
        quiz_id = %request.quiz_id,
        "Saving quiz result"
    );

    let (score, correct_count, total_questions) = scored_counts(&request);

    let repo = Repository::new(state.db.clone());
    let result = repo
        .create_quiz_result(
            request.user_id,
            NewQuizResult {
                quiz_id: request.quiz_id.clone(),
                score,
                answers: json!(request.answers),
                weak_topics: json!(request.weak_topics),
                time_spent: request.time_spent,
                quiz_title: request.quiz_title.clone(),
                quiz_topics: (!request.quiz_topics.is_empty())
                    .then(|| json!(request.quiz_topics)),
                correct_count,
                wrong_count: request.wrong_count,
                total_questions,
                weak_areas: None,
                recommended_resources: None,
            },
        )
        .await?;
    tracing::info!(result_id = %result.id, score, "Quiz result saved");

    // The weakness store learns from every attempt; its failures do not
    // block the save
    if !request.weak_topics.is_empty() {
        let performance = json!({"score": score});
        if let Err(err) = state
            .weaknesses
            .record_quiz_performance(
                &request.user_id.to_string(),
                &request.weak_topics,
                Some(&performance),
            )
            .await
        {
            tracing::warn!(error = %err, "Failed to update stored weaknesses");
        }
    }

    Ok(Json(json!({
        "result_id": result.id,
        "message": "Quiz result saved successfully",
    })))
}

/// Save the post-completion summary onto the existing result row,
/// inserting a fresh row when none matches the quiz.
pub async fn save_quiz_summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<SaveSummaryRequest>,
) -> Result<Json<Value>> {
    auth.ensure_user(request.user_id)?;
    tracing::info!(
        user_id = %request.user_id,
        quiz_id = %request.quiz_id,
        "Saving quiz summary"
    );

    // Keep weak_topics aligned with the submitted weak areas
    let weak_topics: Vec<String> = request
        .weak_areas
        .iter()
        .map(|area| {
            area.get("topic")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect();

    let repo = Repository::new(state.db.clone());
    let result = repo
        .update_quiz_summary(
            &request.quiz_id,
            request.user_id,
            QuizSummaryUpdate {
                score: request.score,
                answers: None,
                weak_topics: (!weak_topics.is_empty()).then(|| json!(weak_topics)),
                quiz_title: None,
                quiz_topics: None,
                correct_count: request.correct_count,
                wrong_count: request.wrong_count,
                total_questions: request.total_questions,
                time_spent: None,
                weak_areas: Some(json!(request.weak_areas)),
                recommended_resources: Some(json!(request.recommended_resources)),
            },
        )
        .await?;
    tracing::info!(
        result_id = %result.id,
        correct_count = ?request.correct_count,
        wrong_count = ?request.wrong_count,
        "Quiz summary saved"
    );

    Ok(Json(json!({
        "result_id": result.id,
        "message": "Quiz summary saved successfully",
    })))
}

/// Get a specific quiz result by its id
pub async fn get_quiz_result_by_id(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(result_id): Path<Uuid>,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<Value>> {
    auth.ensure_user(query.user_id)?;
    tracing::info!(result_id = %result_id, user_id = %query.user_id, "Getting quiz result by id");

    let repo = Repository::new(state.db.clone());
    let result = repo
        .find_quiz_result(result_id, query.user_id)
        .await?
        .ok_or_else(|| AppError::QuizResultNotFound {
            id: result_id.to_string(),
        })?;

    let quiz = match Uuid::parse_str(&result.quiz_id) {
        Ok(quiz_uuid) => repo.find_quiz_unscoped(quiz_uuid).await?,
        Err(_) => None,
    };
    let recommendations = result
        .recommended_resources
        .clone()
        .unwrap_or_else(|| json!([]));

    Ok(Json(json!({
        "quiz": quiz,
        "result": result,
        "recommendations": recommendations,
    })))
}

/// Get a specific midterm analysis by id
pub async fn get_midterm_analysis_by_id(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(analysis_id): Path<Uuid>,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<Value>> {
    auth.ensure_user(query.user_id)?;
    tracing::info!(analysis_id = %analysis_id, user_id = %query.user_id, "Getting midterm analysis");

    let repo = Repository::new(state.db.clone());
    let analysis = repo
        .find_midterm_analysis(analysis_id, query.user_id)
        .await?
        .ok_or_else(|| AppError::AnalysisNotFound {
            id: analysis_id.to_string(),
        })?;

    Ok(Json(serde_json::to_value(analysis)?))
}

/// Correct count and score recomputed from the submitted answers so
/// stored scores always match them. Client values stand when no
/// answers were sent.
fn scored_counts(request: &SaveResultRequest) -> (f64, Option<i32>, Option<i32>) {
    if request.answers.is_empty() {
        return (request.score, request.correct_count, request.total_questions);
    }

    let total = request.answers.len() as i32;
    let correct = request
        .answers
        .iter()
        .filter(|answer| {
            answer
                .get("is_correct")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .count() as i32;
    let score = f64::from(correct) / f64::from(total) * 100.0;

    (score, Some(correct), Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_request(answers: Vec<Value>) -> SaveResultRequest {
        SaveResultRequest {
            user_id: Uuid::new_v4(),
            quiz_id: "quiz-1".to_string(),
            score: 50.0,
            answers,
            weak_topics: vec![],
            time_spent: None,
            quiz_title: None,
            quiz_topics: vec![],
            correct_count: Some(1),
            wrong_count: Some(1),
            total_questions: Some(2),
        }
    }

    #[test]
    fn test_scored_counts_recomputes_from_answers() {
        let request = result_request(vec![
            json!({"question_id": "1", "is_correct": true}),
            json!({"question_id": "2", "is_correct": false}),
            json!({"question_id": "3", "is_correct": true}),
            json!({"question_id": "4"}),
        ]);

        let (score, correct, total) = scored_counts(&request);
        assert_eq!(correct, Some(2));
        assert_eq!(total, Some(4));
        assert_eq!(score, 50.0);
    }

    #[test]
    fn test_scored_counts_keeps_client_values_without_answers() {
        let request = result_request(vec![]);

        let (score, correct, total) = scored_counts(&request);
        assert_eq!(score, 50.0);
        assert_eq!(correct, Some(1));
        assert_eq!(total, Some(2));
    }
}
