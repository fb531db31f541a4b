//! Midterm exam analysis handler

use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::handlers::{read_upload_form, timed_completion, timed_extraction};
use crate::AppState;
use studybuddy_common::auth::AuthContext;
use studybuddy_common::clients::build_personalized_query;
use studybuddy_common::db::{NewMidtermAnalysis, Repository};
use studybuddy_common::errors::{AppError, Result};
use studybuddy_quizgen::prompts::{clip, midterm_grading_prompt, MIDTERM_TEXT_CHARS};
use studybuddy_quizgen::{parse_midterm_errors, Correctness, MidtermError};

/// Sampling settings for the grading pass
const GRADING_TEMPERATURE: f32 = 0.3;
const GRADING_MAX_TOKENS: u32 = 4096;

/// Study resources fetched per analysis
const ANALYSIS_RESOURCES: u32 = 5;

/// Analyze a graded midterm paper: OCR the upload, grade it with the
/// completion model, and surface error topics with study resources.
pub async fn analyze_midterm(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let upload = read_upload_form(multipart).await?;
    auth.ensure_user(upload.user_id)?;

    tracing::info!(filename = %upload.filename, "Extracting text from midterm paper");
    let extracted_text =
        timed_extraction(state.extractor.as_ref(), &upload.filename, upload.content).await?;
    if extracted_text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "No text could be extracted from the uploaded file".to_string(),
            field: None,
        });
    }

    let prompt = midterm_grading_prompt(&extracted_text);
    let reply = timed_completion(
        state.model.as_ref(),
        &prompt,
        GRADING_TEMPERATURE,
        GRADING_MAX_TOKENS,
    )
    .await?;

    // The reply covers every question; only non-correct ones are reported
    let all_questions = parse_midterm_errors(&reply);
    let errors: Vec<MidtermError> = all_questions
        .iter()
        .filter(|question| !question.correctness.is_correct())
        .cloned()
        .collect();
    tracing::info!(
        questions = all_questions.len(),
        errors = errors.len(),
        "Parsed midterm grading reply"
    );
    if errors.is_empty() {
        tracing::warn!("No errors found in midterm analysis");
    }

    let error_topics = unique_error_topics(&errors);

    let mut recommended_resources = Vec::new();
    if !error_topics.is_empty() {
        let error_context = format!(
            "Student made mistakes in: {}. Total errors: {}. Need study materials to improve understanding in these areas.",
            error_topics.join(", "),
            errors.len()
        );
        let query = build_personalized_query(
            &error_topics,
            &error_topics,
            &error_context,
            "intermediate",
        );
        recommended_resources = state
            .search
            .search_materials(&query, ANALYSIS_RESOURCES)
            .await;
        tracing::info!(
            resources = recommended_resources.len(),
            "Fetched study resources for error topics"
        );
    }

    // Feed the weakness store; the analysis still succeeds if it is down
    if !error_topics.is_empty() {
        let error_details = serde_json::to_value(&errors)?;
        if let Err(err) = state
            .weaknesses
            .record_weakness(
                &upload.user_id.to_string(),
                &error_topics,
                &extracted_text,
                Some(&error_details),
            )
            .await
        {
            tracing::warn!(error = %err, "Failed to record midterm weaknesses");
        }
    }

    let stats = QuestionStats::from_questions(&all_questions);
    let repo = Repository::new(state.db.clone());
    let analysis = repo
        .create_midterm_analysis(
            upload.user_id,
            NewMidtermAnalysis {
                filename: upload.filename.clone(),
                course_name: upload
                    .course_name
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
                errors: serde_json::to_value(&errors)?,
                extracted_text: clip(&extracted_text, MIDTERM_TEXT_CHARS).to_string(),
                recommended_resources: serde_json::to_value(&recommended_resources)?,
                error_topics: serde_json::to_value(&error_topics)?,
                total_errors: errors.len() as i32,
                correct_count: stats.correct,
                wrong_count: stats.wrong,
                partially_correct_count: stats.partially_correct,
                total_marks_received: stats.marks_received,
                total_marks_possible: stats.marks_possible,
            },
        )
        .await?;
    tracing::info!(analysis_id = %analysis.id, "Midterm analysis saved");

    if !recommended_resources.is_empty() && !error_topics.is_empty() {
        if let Err(err) = repo
            .save_recommended_resources(upload.user_id, &error_topics, &recommended_resources)
            .await
        {
            tracing::warn!(error = %err, "Failed to save recommended resources");
        }
    }

    Ok(Json(json!({
        "courseName": upload.course_name.as_deref().unwrap_or("Unknown Course"),
        "examDate": Utc::now().format("%B %d, %Y").to_string(),
        "errors": errors,
        "recommendedResources": recommended_resources,
        "errorTopics": error_topics,
    })))
}

/// Unique topics across the error questions, first-seen order
fn unique_error_topics(errors: &[MidtermError]) -> Vec<String> {
    let mut topics = Vec::new();
    for error in errors {
        let topic = error.topic.trim();
        if !topic.is_empty() && !topics.iter().any(|existing| existing == topic) {
            topics.push(topic.to_string());
        }
    }
    topics
}

/// Counts and mark totals over every graded question
struct QuestionStats {
    correct: i32,
    wrong: i32,
    partially_correct: i32,
    marks_received: Option<f64>,
    marks_possible: Option<f64>,
}

impl QuestionStats {
    fn from_questions(questions: &[MidtermError]) -> Self {
        let mut correct = 0;
        let mut wrong = 0;
        let mut partially_correct = 0;
        let mut received = 0.0;
        let mut possible = 0.0;

        for question in questions {
            match question.correctness {
                Correctness::Correct => correct += 1,
                Correctness::Incorrect => wrong += 1,
                Correctness::PartiallyCorrect => partially_correct += 1,
            }
            received += question.marks_received.unwrap_or(0.0);
            possible += question.total_marks.unwrap_or(0.0);
        }

        Self {
            correct,
            wrong,
            partially_correct,
            marks_received: (received > 0.0).then_some(received),
            marks_possible: (possible > 0.0).then_some(possible),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(topic: &str, correctness: Correctness, marks: Option<(f64, f64)>) -> MidtermError {
        MidtermError {
            question: 1,
            your_answer: "x".to_string(),
            correct_answer: "y".to_string(),
            topic: topic.to_string(),
            feedback: String::new(),
            marks_received: marks.map(|(received, _)| received),
            total_marks: marks.map(|(_, total)| total),
            correctness,
        }
    }

    #[test]
    fn test_unique_error_topics_order_and_dedupe() {
        let errors = vec![
            question("Recursion", Correctness::Incorrect, None),
            question("Graphs", Correctness::PartiallyCorrect, None),
            question("Recursion", Correctness::Incorrect, None),
            question("", Correctness::Incorrect, None),
        ];

        let topics = unique_error_topics(&errors);
        assert_eq!(topics, vec!["Recursion".to_string(), "Graphs".to_string()]);
    }

    #[test]
    fn test_question_stats_counts_and_marks() {
        let questions = vec![
            question("A", Correctness::Correct, Some((5.0, 5.0))),
            question("B", Correctness::Incorrect, Some((0.0, 5.0))),
            question("C", Correctness::PartiallyCorrect, Some((2.5, 5.0))),
        ];

        let stats = QuestionStats::from_questions(&questions);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.wrong, 1);
        assert_eq!(stats.partially_correct, 1);
        assert_eq!(stats.marks_received, Some(7.5));
        assert_eq!(stats.marks_possible, Some(15.0));
    }

    #[test]
    fn test_question_stats_without_marks() {
        let questions = vec![
            question("A", Correctness::Incorrect, None),
            question("B", Correctness::Incorrect, None),
        ];

        let stats = QuestionStats::from_questions(&questions);
        assert_eq!(stats.marks_received, None);
        assert_eq!(stats.marks_possible, None);
    }
}
