//! Quiz generation and retrieval handlers

use axum::extract::{Path, Query, State};
use axum::{Form, Json};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{string_values, timed_completion, timed_extraction, UserIdQuery};
use crate::AppState;
use studybuddy_common::auth::AuthContext;
use studybuddy_common::clients::FREE_RESOURCES_CLAUSE;
use studybuddy_common::db::models::Quiz;
use studybuddy_common::db::Repository;
use studybuddy_common::errors::{AppError, Result};
use studybuddy_common::metrics::record_questions_generated;
use studybuddy_quizgen::normalize::{
    normalize_questions, placeholder_question, placeholder_questions, randomize_options,
    QuizQuestion,
};
use studybuddy_quizgen::parse_quiz_questions;
use studybuddy_quizgen::prompts::{error_quiz_prompt, quiz_prompt};
use studybuddy_quizgen::title::{generate_quiz_title, needs_regeneration};

/// Sampling settings for topic quizzes
const QUIZ_TEMPERATURE: f32 = 0.6;
const QUIZ_MAX_TOKENS: u32 = 4096;

// Error quizzes run to ten questions; the larger budget avoids
// truncated JSON arrays
const ERROR_QUIZ_TEMPERATURE: f32 = 0.7;
const ERROR_QUIZ_MAX_TOKENS: u32 = 8192;

/// Study resources fetched alongside a quiz result
const RESULT_RESOURCES: u32 = 5;

/// Request to generate a quiz from topics or uploaded materials
#[derive(Debug, Deserialize, Validate)]
pub struct QuizGenerationRequest {
    pub user_id: Option<Uuid>,

    pub title: Option<String>,

    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default = "default_num_questions")]
    #[validate(range(min = 1, max = 20))]
    pub num_questions: u32,

    /// Base64 or data-URI study materials, `[{filename, content}]`
    #[serde(default)]
    pub uploaded_files: Vec<UploadedFile>,

    pub subject: Option<String>,
}

fn default_num_questions() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    pub filename: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// Form body for error-topic quiz generation
#[derive(Debug, Deserialize)]
pub struct ErrorQuizForm {
    pub user_id: Uuid,
    /// Comma-separated topic list
    pub error_topics: String,
    #[serde(default = "default_error_questions")]
    pub num_questions: u32,
    pub subject: Option<String>,
}

fn default_error_questions() -> u32 {
    10
}

/// Generate a quiz from specific topics and optional uploaded materials.
/// Stored weaknesses are deliberately not mixed in; weakness-driven
/// quizzes have their own endpoint.
pub async fn generate_quiz(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<QuizGenerationRequest>,
) -> Result<Json<Value>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;
    if let Some(user_id) = request.user_id {
        auth.ensure_user(user_id)?;
    }

    tracing::info!(
        topics = ?request.topics,
        num_questions = request.num_questions,
        "Quiz generation request received"
    );

    let materials_text = extract_materials_text(&state, &request.uploaded_files).await;

    let prompt = quiz_prompt(request.num_questions, &request.topics, &materials_text);
    let reply = timed_completion(
        state.model.as_ref(),
        &prompt,
        QUIZ_TEMPERATURE,
        QUIZ_MAX_TOKENS,
    )
    .await?;

    let parsed = parse_quiz_questions(&reply);
    let fallback_topic = request
        .topics
        .first()
        .map(String::as_str)
        .unwrap_or("General");
    let mut questions = normalize_questions(&parsed, fallback_topic);
    randomize_options(&mut questions);
    tracing::info!(parsed = parsed.len(), kept = questions.len(), "Parsed quiz questions");

    if questions.is_empty() {
        tracing::warn!("No questions generated, using fallback");
        questions = vec![placeholder_question(
            request.topics.first().map(String::as_str),
        )];
    }
    record_questions_generated(questions.len(), "topics");

    let mut quiz_title = request.title.clone();
    if let Some(ref title) = quiz_title {
        if !request.topics.is_empty() && needs_regeneration(title, &request.topics) {
            quiz_title = None;
        }
    }
    if quiz_title.is_none() && !request.topics.is_empty() {
        quiz_title = Some(
            generate_quiz_title(
                state.model.as_ref(),
                &request.topics,
                request.subject.as_deref(),
            )
            .await,
        );
    }
    let title = quiz_title.unwrap_or_else(|| "Generated Quiz".to_string());

    let quiz_id = persist_quiz(
        &state,
        request.user_id,
        &title,
        &questions,
        &request.topics,
    )
    .await?;

    tracing::info!(quiz_id = %quiz_id, questions = questions.len(), "Quiz generation successful");
    Ok(Json(json!({
        "quiz_id": quiz_id,
        "questions": questions,
        "title": title,
    })))
}

/// Generate a quiz targeting the topics a student got wrong, straight
/// from a midterm analysis.
pub async fn generate_quiz_from_errors(
    State(state): State<AppState>,
    auth: AuthContext,
    Form(form): Form<ErrorQuizForm>,
) -> Result<Json<Value>> {
    auth.ensure_user(form.user_id)?;

    let topics: Vec<String> = form
        .error_topics
        .split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect();
    if topics.is_empty() {
        return Err(AppError::Validation {
            message: "No error topics provided".to_string(),
            field: Some("error_topics".to_string()),
        });
    }

    tracing::info!(
        num_questions = form.num_questions,
        topics = ?topics,
        "Generating quiz from error topics"
    );

    let prompt = error_quiz_prompt(form.num_questions, &topics);
    let reply = timed_completion(
        state.model.as_ref(),
        &prompt,
        ERROR_QUIZ_TEMPERATURE,
        ERROR_QUIZ_MAX_TOKENS,
    )
    .await?;

    let trimmed = reply.trim_end();
    if !trimmed.is_empty() && !trimmed.ends_with(']') && !trimmed.ends_with('}') {
        tracing::warn!("Quiz reply may be truncated");
    }

    let parsed = parse_quiz_questions(&reply);
    let mut questions = normalize_questions(&parsed, &topics[0]);
    randomize_options(&mut questions);
    tracing::info!(
        parsed = parsed.len(),
        kept = questions.len(),
        "Validated questions after cleaning"
    );

    if questions.is_empty() {
        tracing::warn!("No questions generated, using fallback");
        questions = placeholder_questions(&topics, form.num_questions as usize);
    }
    record_questions_generated(questions.len(), "errors");

    let title = generate_quiz_title(state.model.as_ref(), &topics, form.subject.as_deref()).await;

    let quiz_id = persist_quiz(&state, Some(form.user_id), &title, &questions, &topics).await?;

    tracing::info!(quiz_id = %quiz_id, questions = questions.len(), "Error quiz generation successful");
    Ok(Json(json!({
        "quiz_id": quiz_id,
        "questions": questions,
        "title": title,
    })))
}

/// Get quiz details by id. Scoped to the caller's rows when the request
/// carries an authenticated user.
pub async fn get_quiz(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(quiz_id): Path<String>,
) -> Result<Json<Value>> {
    let quiz = match (auth.user_id, Uuid::parse_str(&quiz_id)) {
        (Some(user_id), Ok(id)) => {
            Repository::new(state.db.clone())
                .find_quiz(id, user_id)
                .await?
        }
        _ => find_quiz_by_string_id(&state, &quiz_id).await?,
    };
    let quiz = quiz.ok_or_else(|| AppError::QuizNotFound {
        id: quiz_id.clone(),
    })?;
    Ok(Json(serde_json::to_value(quiz)?))
}

/// Get the latest result for a quiz, with freshly searched study
/// recommendations for its weak topics.
pub async fn get_quiz_result(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(quiz_id): Path<String>,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<Value>> {
    auth.ensure_user(query.user_id)?;
    tracing::info!(quiz_id = %quiz_id, user_id = %query.user_id, "Getting quiz result");

    // Temporary quiz ids never made it to the database; the result can
    // still exist under the string id
    let quiz = find_quiz_by_string_id(&state, &quiz_id).await?;

    let repo = Repository::new(state.db.clone());
    let Some(result) = repo.find_result_for_quiz(&quiz_id, query.user_id).await? else {
        tracing::warn!(quiz_id = %quiz_id, "No result found for quiz");
        return Ok(Json(
            json!({"quiz": quiz, "result": null, "recommendations": []}),
        ));
    };

    let weak_topics = string_values(&result.weak_topics);
    let mut recommendations = Vec::new();
    if !weak_topics.is_empty() {
        let query_text = format!(
            "Study materials for learning: {}. User scored {}% and needs help with these topics. {}",
            weak_topics.join(", "),
            result.score,
            FREE_RESOURCES_CLAUSE
        );
        recommendations = state
            .search
            .search_materials(&query_text, RESULT_RESOURCES)
            .await;
    }

    Ok(Json(json!({
        "quiz": quiz,
        "result": result,
        "recommendations": recommendations,
    })))
}

/// List every quiz the user has generated, newest first
pub async fn get_user_quizzes(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Quiz>>> {
    auth.ensure_user(user_id)?;
    let repo = Repository::new(state.db.clone());
    let quizzes = repo.list_quizzes(user_id).await?;
    Ok(Json(quizzes))
}

/// OCR uploaded files into one combined materials block. Decode and
/// extraction failures skip the file.
async fn extract_materials_text(state: &AppState, files: &[UploadedFile]) -> String {
    let mut materials_text = String::new();
    if files.is_empty() {
        return materials_text;
    }

    tracing::info!(files = files.len(), "Processing uploaded files");
    for file in files {
        let filename = file.filename.as_deref().unwrap_or("unknown");
        let encoded = match file.content.split_once(',') {
            Some((_, rest)) if file.content.starts_with("data:") => rest,
            _ => file.content.as_str(),
        };
        let bytes = match BASE64.decode(encoded) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(filename, error = %err, "Failed to decode uploaded file");
                continue;
            }
        };
        match timed_extraction(state.extractor.as_ref(), filename, bytes).await {
            Ok(text) => {
                materials_text.push_str(&format!("\n\nMaterial from {filename}:\n{text}"));
            }
            Err(err) => {
                tracing::error!(filename, error = %err, "Failed to extract text from file");
            }
        }
    }
    materials_text
}

/// Store the quiz, falling back to a temporary id when no user is
/// attached or the insert fails. Generation always returns a quiz.
async fn persist_quiz(
    state: &AppState,
    user_id: Option<Uuid>,
    title: &str,
    questions: &[QuizQuestion],
    topics: &[String],
) -> Result<String> {
    let Some(user_id) = user_id else {
        return Ok(Uuid::new_v4().to_string());
    };

    let repo = Repository::new(state.db.clone());
    let questions_json = serde_json::to_value(questions)?;
    let topics_json = serde_json::to_value(topics)?;
    match repo
        .create_quiz(user_id, title.to_string(), questions_json, topics_json)
        .await
    {
        Ok(quiz) => {
            tracing::info!(quiz_id = %quiz.id, "Quiz saved to database");
            Ok(quiz.id.to_string())
        }
        Err(err) => {
            let temp_id = Uuid::new_v4().to_string();
            tracing::warn!(error = %err, temp_id = %temp_id, "Failed to save quiz, using temporary id");
            Ok(temp_id)
        }
    }
}

/// Look up a quiz whose id arrived as a string. Temporary ids are not
/// valid UUIDs and never hit the database.
async fn find_quiz_by_string_id(state: &AppState, quiz_id: &str) -> Result<Option<Quiz>> {
    let Ok(parsed) = Uuid::parse_str(quiz_id) else {
        return Ok(None);
    };
    let repo = Repository::new(state.db.clone());
    repo.find_quiz_unscoped(parsed).await
}
