//! RAG-backed personalization handlers
//!
//! The endpoints that reason over the user's whole stored history:
//! insight analysis, curated study resources, the holistic weakness
//! quiz, and the study reports.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::handlers::{string_values, timed_completion};
use crate::AppState;
use studybuddy_common::auth::AuthContext;
use studybuddy_common::db::models::{MidtermAnalysis, QuizResult};
use studybuddy_common::db::Repository;
use studybuddy_common::errors::{AppError, Result};
use studybuddy_common::metrics::record_questions_generated;
use studybuddy_insights::curator::{cached_payload, no_weaknesses_payload, rebuilt_payload};
use studybuddy_insights::{patterns, report, ResourceCurator};
use studybuddy_quizgen::prompts::{clip, rag_quiz_max_tokens, rag_quiz_prompt};
use studybuddy_quizgen::{generate_quiz_title, pad_rag_questions, parse_quiz_questions};

const RAG_QUIZ_TEMPERATURE: f32 = 0.7;
/// Weak topics listed on the result report
const REPORT_TOPIC_LIMIT: usize = 10;
/// Resource titles listed on the result report
const REPORT_RESOURCE_LIMIT: usize = 5;
const RESOURCE_TITLE_CHARS: usize = 60;

const DATE_FORMAT: &str = "%B %d, %Y %I:%M %p";

#[derive(Debug, Deserialize)]
pub struct RagQuizQuery {
    #[serde(default = "default_rag_questions")]
    pub num_questions: u32,
}

fn default_rag_questions() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct RagReportQuery {
    pub quiz_result_id: Uuid,
}

/// Model-written insight analysis over the user's whole assessment
/// history. Model failures degrade to a deterministic analysis instead
/// of failing the request.
pub async fn get_rag_progress(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    auth: AuthContext,
) -> Result<Json<Value>> {
    auth.ensure_user(user_id)?;
    tracing::info!(user_id = %user_id, "Generating insight analysis");

    let repo = Repository::new(state.db.clone());
    let results = repo.list_quiz_results(user_id).await?;
    let analyses = repo.list_midterm_analyses(user_id).await?;

    if results.is_empty() && analyses.is_empty() {
        return Ok(Json(report::empty_insight_response()));
    }

    let snapshot = report::snapshot(&results, &analyses);
    let unique_weak = snapshot.unique_weak_topics();
    let prompt = report::insight_prompt(&snapshot);

    let analysis = match timed_completion(
        state.model.as_ref(),
        &prompt,
        report::INSIGHT_TEMPERATURE,
        report::INSIGHT_MAX_TOKENS,
    )
    .await
    {
        Ok(reply) => report::parse_insight_reply(&reply, &unique_weak),
        Err(err) => {
            tracing::warn!(error = %err, "Insight analysis failed, serving deterministic fallback");
            report::failed_insight_analysis(&unique_weak)
        }
    };

    Ok(Json(report::insight_response(&snapshot, &analysis)))
}

/// Curated study resources across every weak subject, cached until new
/// activity invalidates the row.
pub async fn get_rag_resources(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    auth: AuthContext,
) -> Result<Json<Value>> {
    auth.ensure_user(user_id)?;

    let curator = ResourceCurator::new(
        Repository::new(state.db.clone()),
        state.model.clone(),
        state.search.clone(),
        state.weaknesses.clone(),
    );

    if let Some(row) = curator.fresh_cache(user_id).await? {
        return Ok(Json(cached_payload(&row)));
    }

    tracing::info!(user_id = %user_id, "Generating holistic study resources");
    match curator.rebuild(user_id).await? {
        Some(curated) => Ok(Json(rebuilt_payload(&curated))),
        None => Ok(Json(no_weaknesses_payload())),
    }
}

/// Generate a holistic quiz over every weakness the user has accumulated
/// across quizzes, midterms, and the stored weakness index.
pub async fn generate_rag_quiz(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RagQuizQuery>,
    auth: AuthContext,
) -> Result<Json<Value>> {
    auth.ensure_user(user_id)?;
    tracing::info!(
        user_id = %user_id,
        num_questions = query.num_questions,
        "Generating holistic quiz"
    );

    let repo = Repository::new(state.db.clone());
    let results = repo.list_quiz_results(user_id).await?;
    let analyses = repo.list_midterm_analyses(user_id).await?;
    let stored = state.weaknesses.get_weaknesses(&user_id.to_string()).await;

    let (weak_topics, mistakes) = weaknesses_and_mistakes(&results, &analyses, &stored.topics);
    if weak_topics.is_empty() {
        return Err(AppError::Validation {
            message: "No weaknesses identified. Complete some quizzes or midterm reviews first."
                .to_string(),
            field: None,
        });
    }

    let prompt = rag_quiz_prompt(query.num_questions, &weak_topics, &mistakes);
    let reply = timed_completion(
        state.model.as_ref(),
        &prompt,
        RAG_QUIZ_TEMPERATURE,
        rag_quiz_max_tokens(query.num_questions),
    )
    .await?;

    // correctAnswer is the option text in this shape, so there is no
    // index to fix up and options stay in model order.
    let mut questions = parse_quiz_questions(&reply);
    pad_rag_questions(&mut questions, &weak_topics, query.num_questions as usize);
    record_questions_generated(questions.len(), "rag");

    let generated = generate_quiz_title(state.model.as_ref(), &weak_topics, None).await;
    let title = format!("RAG-Based {generated}");
    tracing::info!(title = %title, "Generated holistic quiz title");

    let quiz_id = match repo
        .create_quiz(user_id, title.clone(), json!(questions), json!(weak_topics))
        .await
    {
        Ok(quiz) => quiz.id.to_string(),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to save holistic quiz, using temporary id");
            format!("rag_quiz_{user_id}_{}", Utc::now().timestamp())
        }
    };

    Ok(Json(json!({
        "quiz_id": quiz_id,
        "title": title,
        "questions": questions,
        "topics": weak_topics,
        "description": format!(
            "Holistic quiz covering {} weak areas identified from your learning history",
            weak_topics.len()
        ),
    })))
}

/// Printable summary of one stored quiz result.
pub async fn rag_quiz_report(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RagReportQuery>,
    auth: AuthContext,
) -> Result<Json<Value>> {
    auth.ensure_user(user_id)?;

    let repo = Repository::new(state.db.clone());
    let result = repo
        .find_quiz_result(query.quiz_result_id, user_id)
        .await?
        .ok_or_else(|| AppError::QuizResultNotFound {
            id: query.quiz_result_id.to_string(),
        })?;

    let weak_topics: Vec<String> = string_values(&result.weak_topics)
        .into_iter()
        .take(REPORT_TOPIC_LIMIT)
        .collect();
    let resources = result.recommended_resources.clone().unwrap_or(Value::Null);

    Ok(Json(json!({
        "report_title": "RAG-Based Assessment Report",
        "generated_at": Utc::now().format(DATE_FORMAT).to_string(),
        "score": result.score,
        "correct_count": result.correct_count.unwrap_or(0),
        "total_questions": result.total_questions.unwrap_or(0),
        "time_spent_secs": result.time_spent.unwrap_or(0),
        "weak_topics": weak_topics,
        "recommended_resources": resource_titles(&resources),
    })))
}

/// The full study report: pattern detection plus a model-written
/// narrative over the complete history.
pub async fn comprehensive_study_report(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    auth: AuthContext,
) -> Result<Json<Value>> {
    auth.ensure_user(user_id)?;
    tracing::info!(user_id = %user_id, "Generating comprehensive study report");

    let repo = Repository::new(state.db.clone());
    let results = repo.list_quiz_results(user_id).await?;
    let analyses = repo.list_midterm_analyses(user_id).await?;

    let snapshot = report::snapshot(&results, &analyses);
    let detected = patterns::analyze(&results, &analyses);
    let trend_delta = patterns::score_trend_delta(&results);
    let unique_weak = snapshot.unique_weak_topics();

    let prompt = report::report_prompt(&snapshot, &detected, &results, &analyses, trend_delta);
    let narrative = match timed_completion(
        state.model.as_ref(),
        &prompt,
        report::REPORT_TEMPERATURE,
        report::REPORT_MAX_TOKENS,
    )
    .await
    {
        Ok(reply) => report::parse_report_reply(&reply, &unique_weak),
        Err(err) => {
            tracing::warn!(error = %err, "Report narrative failed, serving bare analysis");
            report::failed_report_narrative()
        }
    };

    let generated_at = Utc::now().format(DATE_FORMAT).to_string();
    Ok(Json(report::report_response(
        &snapshot,
        &detected,
        &narrative,
        &generated_at,
    )))
}

/// Unique weak topics in mention order and the mistake log across the
/// user's history. Stored weakness-index topics fold in last.
fn weaknesses_and_mistakes(
    results: &[QuizResult],
    analyses: &[MidtermAnalysis],
    stored_topics: &[String],
) -> (Vec<String>, Vec<Value>) {
    let mut topics: Vec<String> = Vec::new();
    let mut mistakes: Vec<Value> = Vec::new();

    for result in results {
        for topic in string_values(&result.weak_topics) {
            push_unique(&mut topics, topic);
        }
        if let Some(answers) = result.answers.as_array() {
            for answer in answers {
                // A missing flag counts as correct here.
                let correct = answer
                    .get("is_correct")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if !correct {
                    mistakes.push(json!({
                        "type": "quiz",
                        "topic": answer.get("topic").cloned().unwrap_or_else(|| json!("Unknown")),
                        "error": answer
                            .get("selected_answer")
                            .cloned()
                            .unwrap_or_else(|| json!("")),
                    }));
                }
            }
        }
    }

    for analysis in analyses {
        for topic in string_values(&analysis.error_topics) {
            push_unique(&mut topics, topic);
        }
        if let Some(errors) = analysis.errors.as_array() {
            for error in errors {
                mistakes.push(json!({
                    "type": "midterm",
                    "topic": error.get("topic").cloned().unwrap_or_else(|| json!("Unknown")),
                    "error": error.get("yourAnswer").cloned().unwrap_or_else(|| json!("")),
                    "correct": error
                        .get("correctAnswer")
                        .cloned()
                        .unwrap_or_else(|| json!("")),
                }));
            }
        }
    }

    for topic in stored_topics {
        push_unique(&mut topics, topic.clone());
    }

    (topics, mistakes)
}

fn push_unique(topics: &mut Vec<String>, topic: String) {
    if !topics.contains(&topic) {
        topics.push(topic);
    }
}

/// First few resource titles for the report, clipped for display.
fn resource_titles(resources: &Value) -> Vec<String> {
    resources
        .as_array()
        .map(|items| {
            items
                .iter()
                .take(REPORT_RESOURCE_LIMIT)
                .map(|resource| {
                    let title = resource
                        .get("title")
                        .and_then(Value::as_str)
                        .or_else(|| resource.get("name").and_then(Value::as_str))
                        .unwrap_or("Resource");
                    clip(title, RESOURCE_TITLE_CHARS).to_string()
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result_row(weak_topics: Value, answers: Value) -> QuizResult {
        QuizResult {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4().to_string(),
            score: 50.0,
            answers,
            weak_topics,
            time_spent: None,
            quiz_title: None,
            quiz_topics: None,
            correct_count: None,
            wrong_count: None,
            total_questions: None,
            weak_areas: None,
            recommended_resources: None,
            completed_at: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap().into(),
        }
    }

    fn analysis_row(error_topics: Value, errors: Value) -> MidtermAnalysis {
        MidtermAnalysis {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            filename: "midterm.pdf".to_string(),
            course_name: "Physics".to_string(),
            errors,
            extracted_text: String::new(),
            recommended_resources: json!([]),
            error_topics,
            total_errors: 1,
            correct_count: 0,
            wrong_count: 1,
            partially_correct_count: 0,
            total_marks_received: None,
            total_marks_possible: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap().into(),
        }
    }

    #[test]
    fn test_mistakes_only_from_wrong_quiz_answers() {
        let result = result_row(
            json!(["Trees"]),
            json!([
                {"is_correct": false, "topic": "Trees", "selected_answer": "B"},
                {"is_correct": true, "topic": "Graphs", "selected_answer": "A"},
                {"selected_answer": "C"},
            ]),
        );

        let (topics, mistakes) = weaknesses_and_mistakes(&[result], &[], &[]);
        assert_eq!(topics, vec!["Trees"]);
        // The unflagged answer counts as correct.
        assert_eq!(mistakes.len(), 1);
        assert_eq!(mistakes[0]["type"], "quiz");
        assert_eq!(mistakes[0]["topic"], "Trees");
        assert_eq!(mistakes[0]["error"], "B");
    }

    #[test]
    fn test_every_midterm_error_becomes_a_mistake() {
        let analysis = analysis_row(
            json!(["Limits"]),
            json!([
                {"topic": "Limits", "yourAnswer": "x=2", "correctAnswer": "x=3"},
                {"question": 2},
            ]),
        );

        let (topics, mistakes) = weaknesses_and_mistakes(&[], &[analysis], &[]);
        assert_eq!(topics, vec!["Limits"]);
        assert_eq!(mistakes.len(), 2);
        assert_eq!(mistakes[0]["type"], "midterm");
        assert_eq!(mistakes[0]["correct"], "x=3");
        assert_eq!(mistakes[1]["topic"], "Unknown");
        assert_eq!(mistakes[1]["error"], "");
    }

    #[test]
    fn test_weak_topics_merge_in_mention_order() {
        let result = result_row(json!(["Trees", "Graphs"]), json!([]));
        let analysis = analysis_row(json!(["Graphs", "Limits"]), json!([]));
        let stored = vec!["Limits".to_string(), "Heaps".to_string()];

        let (topics, _) = weaknesses_and_mistakes(&[result], &[analysis], &stored);
        assert_eq!(topics, vec!["Trees", "Graphs", "Limits", "Heaps"]);
    }

    #[test]
    fn test_resource_titles_fallbacks_and_caps() {
        let resources = json!([
            {"title": "Full course"},
            {"name": "Named only"},
            {"url": "https://example.com"},
            {"title": "a".repeat(80)},
            {"title": "fifth"},
            {"title": "sixth"},
        ]);

        let titles = resource_titles(&resources);
        assert_eq!(titles.len(), 5);
        assert_eq!(titles[0], "Full course");
        assert_eq!(titles[1], "Named only");
        assert_eq!(titles[2], "Resource");
        assert_eq!(titles[3].chars().count(), 60);

        assert!(resource_titles(&Value::Null).is_empty());
    }
}
