//! Dashboard progress aggregation
//!
//! Weekly goal counters, a merged quiz/midterm activity feed, and the
//! latest-assessment recap cards. Pure over rows already loaded from
//! storage; the gateway handler does the fetching.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use studybuddy_common::db::models::{MidtermAnalysis, Quiz, QuizResult};
use uuid::Uuid;

use crate::{round1, string_list};

const WEEKLY_QUIZ_GOAL: u32 = 5;
const WEEKLY_HOURS_GOAL: u32 = 10;
const WEEKLY_MIDTERM_GOAL: u32 = 2;
const WEAK_AREAS_GOAL: usize = 5;
const FLASHCARDS_TARGET: u32 = 100;
const HOURS_PER_QUIZ: f64 = 0.25;
const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Weekly goal counters for the dashboard header.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyGoals {
    pub quizzes_completed: usize,
    pub total_quizzes: u32,
    pub study_hours: f64,
    pub total_hours: u32,
    pub flashcards_reviewed: u32,
    pub flashcards_target: u32,
    pub midterms_reviewed: usize,
    pub total_midterms: u32,
    pub weak_areas_fixed: usize,
    pub total_weak_areas: usize,
}

/// Feed entry for a completed quiz.
#[derive(Debug, Clone, Serialize)]
pub struct QuizActivity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: Option<String>,
    pub timestamp: DateTime<FixedOffset>,
    pub score: f64,
    pub topics: Value,
    pub weak_topics: Value,
    pub quiz_id: String,
    pub issues_found: usize,
    pub time_spent: String,
}

/// Feed entry for a graded midterm review.
#[derive(Debug, Clone, Serialize)]
pub struct MidtermActivity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub timestamp: DateTime<FixedOffset>,
    pub topics: Value,
    pub issues_found: i32,
    pub wrong_count: i32,
    pub correct_count: i32,
    pub partially_correct_count: i32,
    pub recommended_resources: Value,
    pub analysis_id: Uuid,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Activity {
    Quiz(QuizActivity),
    Midterm(MidtermActivity),
}

impl Activity {
    fn timestamp(&self) -> DateTime<FixedOffset> {
        match self {
            Activity::Quiz(activity) => activity.timestamp,
            Activity::Midterm(activity) => activity.timestamp,
        }
    }
}

/// Quick-recap card for the most recent quiz.
#[derive(Debug, Clone, Serialize)]
pub struct LatestQuizSummary {
    pub result_id: Uuid,
    pub quiz_id: String,
    pub title: Option<String>,
    pub score: f64,
    pub correct_count: Option<i32>,
    pub wrong_count: Option<i32>,
    pub total_questions: i32,
    pub time_spent: String,
    pub weak_areas: Value,
    pub recommended_resources: Value,
    pub timestamp: DateTime<FixedOffset>,
}

/// Quick-recap card for the most recent graded midterm.
#[derive(Debug, Clone, Serialize)]
pub struct LatestMidtermSummary {
    pub analysis_id: Uuid,
    pub course_name: String,
    pub filename: String,
    pub total_errors: i32,
    pub wrong_count: i32,
    pub correct_count: i32,
    pub partially_correct_count: i32,
    pub error_topics: Value,
    pub recommended_resources: Value,
    pub timestamp: DateTime<FixedOffset>,
    pub accuracy: i64,
}

/// Everything the progress endpoint returns.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub weekly_goals: WeeklyGoals,
    pub recent_activities: Vec<Activity>,
    pub latest_quiz_summary: Option<LatestQuizSummary>,
    pub latest_midterm_summary: Option<LatestMidtermSummary>,
}

/// Start of the current week (Monday), time of day preserved.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(now.weekday().num_days_from_monday()))
}

/// Seconds as "M:SS", "N/A" when unknown.
pub fn format_time_spent(seconds: Option<i32>) -> String {
    match seconds {
        Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
        None => "N/A".to_string(),
    }
}

/// Assemble the dashboard progress report.
///
/// `results` and `analyses` are expected newest first, the order the
/// repository returns them in.
pub fn build_progress(
    quizzes: &[Quiz],
    results: &[QuizResult],
    analyses: &[MidtermAnalysis],
    weakness_topics: &[String],
    now: DateTime<Utc>,
) -> ProgressReport {
    let anchor: DateTime<FixedOffset> = week_start(now).into();

    let recent_results: Vec<&QuizResult> = results
        .iter()
        .filter(|result| result.completed_at >= anchor)
        .collect();
    let recent_midterms = analyses
        .iter()
        .filter(|analysis| analysis.created_at >= anchor)
        .count();

    let weak_areas_fixed = if weakness_topics.is_empty() {
        0
    } else {
        recent_results
            .iter()
            .filter(|result| {
                string_list(&result.weak_topics)
                    .iter()
                    .any(|topic| weakness_topics.contains(topic))
            })
            .count()
    };

    let weekly_goals = WeeklyGoals {
        quizzes_completed: recent_results.len(),
        total_quizzes: WEEKLY_QUIZ_GOAL,
        study_hours: round1(recent_results.len() as f64 * HOURS_PER_QUIZ),
        total_hours: WEEKLY_HOURS_GOAL,
        flashcards_reviewed: 0,
        flashcards_target: FLASHCARDS_TARGET,
        midterms_reviewed: recent_midterms,
        total_midterms: WEEKLY_MIDTERM_GOAL,
        weak_areas_fixed: weak_areas_fixed.min(WEAK_AREAS_GOAL),
        total_weak_areas: WEAK_AREAS_GOAL,
    };

    let mut activities: Vec<Activity> = Vec::new();

    // Results are shown even when the quiz row itself never landed; the
    // snapshot columns on the result carry title and topics for that case.
    for result in results {
        let quiz = quizzes.iter().find(|quiz| quiz.id.to_string() == result.quiz_id);
        let (title, topics) = match quiz {
            Some(quiz) => (Some(quiz.title.clone()), quiz.topics.clone()),
            None => (
                result.quiz_title.clone(),
                result.quiz_topics.clone().unwrap_or(Value::Null),
            ),
        };

        activities.push(Activity::Quiz(QuizActivity {
            id: result.id,
            kind: "quiz",
            title,
            timestamp: result.completed_at,
            score: result.score,
            topics,
            weak_topics: result.weak_topics.clone(),
            quiz_id: result.quiz_id.clone(),
            issues_found: count_wrong_answers(&result.answers),
            time_spent: format_time_spent(result.time_spent.filter(|secs| *secs != 0)),
        }));
    }

    for analysis in analyses {
        activities.push(Activity::Midterm(MidtermActivity {
            id: analysis.id,
            kind: "midterm",
            title: midterm_title(&analysis.course_name),
            timestamp: analysis.created_at,
            topics: midterm_topics(analysis),
            issues_found: analysis.total_errors,
            wrong_count: analysis.wrong_count,
            correct_count: analysis.correct_count,
            partially_correct_count: analysis.partially_correct_count,
            recommended_resources: analysis.recommended_resources.clone(),
            analysis_id: analysis.id,
            filename: analysis.filename.clone(),
        }));
    }

    activities.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

    let latest_quiz_summary = results.first().map(|newest| quiz_summary(newest, quizzes));
    let latest_midterm_summary = analyses.first().map(midterm_summary);

    let latest_quiz_id = latest_quiz_summary.as_ref().map(|summary| summary.result_id);
    let latest_midterm_id = latest_midterm_summary
        .as_ref()
        .map(|summary| summary.analysis_id);

    // The two newest entries already appear in the recap cards.
    let recent_activities: Vec<Activity> = activities
        .into_iter()
        .filter(|activity| match activity {
            Activity::Quiz(quiz) => Some(quiz.id) != latest_quiz_id,
            Activity::Midterm(midterm) => Some(midterm.id) != latest_midterm_id,
        })
        .take(RECENT_ACTIVITY_LIMIT)
        .collect();

    ProgressReport {
        weekly_goals,
        recent_activities,
        latest_quiz_summary,
        latest_midterm_summary,
    }
}

fn quiz_summary(newest: &QuizResult, quizzes: &[Quiz]) -> LatestQuizSummary {
    let mut title = newest.quiz_title.clone();
    if title.as_deref().map_or(true, str::is_empty) {
        if let Some(quiz) = quizzes.iter().find(|quiz| quiz.id.to_string() == newest.quiz_id) {
            title = Some(quiz.title.clone());
        }
    }

    let answers = newest.answers.as_array().cloned().unwrap_or_default();

    let correct_count = match newest.correct_count {
        Some(count) => Some(count),
        None if !answers.is_empty() => {
            Some(answers.iter().filter(|answer| answer_is_correct(answer)).count() as i32)
        }
        None => None,
    };
    let wrong_count = match newest.wrong_count {
        Some(count) => Some(count),
        None if !answers.is_empty() => {
            Some(answers.iter().filter(|answer| !answer_is_correct(answer)).count() as i32)
        }
        None => None,
    };
    let total_questions = newest.total_questions.unwrap_or(answers.len() as i32);

    let weak_topics = string_list(&newest.weak_topics);
    let mut weak_areas = newest.weak_areas.clone().unwrap_or(Value::Null);
    let empty_weak_areas = match &weak_areas {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty_weak_areas && !weak_topics.is_empty() {
        weak_areas = Value::Array(
            weak_topics
                .iter()
                .map(|topic| json!({"topic": topic, "accuracy": 0}))
                .collect(),
        );
    }

    LatestQuizSummary {
        result_id: newest.id,
        quiz_id: newest.quiz_id.clone(),
        title,
        score: newest.score,
        correct_count,
        wrong_count,
        total_questions,
        time_spent: format_time_spent(newest.time_spent),
        weak_areas,
        recommended_resources: newest.recommended_resources.clone().unwrap_or(Value::Null),
        timestamp: newest.completed_at,
    }
}

fn midterm_summary(newest: &MidtermAnalysis) -> LatestMidtermSummary {
    let accuracy = if newest.total_errors > 0 {
        match (newest.total_marks_received, newest.total_marks_possible) {
            (Some(received), Some(possible)) if possible > 0.0 => {
                (received / possible * 100.0).round() as i64
            }
            _ => (f64::from(newest.correct_count) / f64::from(newest.total_errors) * 100.0)
                .round() as i64,
        }
    } else {
        0
    };

    LatestMidtermSummary {
        analysis_id: newest.id,
        course_name: newest.course_name.clone(),
        filename: newest.filename.clone(),
        total_errors: newest.total_errors,
        wrong_count: newest.wrong_count,
        correct_count: newest.correct_count,
        partially_correct_count: newest.partially_correct_count,
        error_topics: midterm_topics(newest),
        recommended_resources: newest.recommended_resources.clone(),
        timestamp: newest.created_at,
        accuracy,
    }
}

fn midterm_title(course_name: &str) -> String {
    if !course_name.is_empty() && course_name != "Unknown" {
        format!("{course_name} Graded Paper Review")
    } else {
        "Mid-Term Review".to_string()
    }
}

/// Stored error topics, or topics pulled off the error items when the
/// column is empty.
fn midterm_topics(analysis: &MidtermAnalysis) -> Value {
    match analysis.error_topics.as_array() {
        Some(list) if !list.is_empty() => analysis.error_topics.clone(),
        _ => json!(error_topic_fallback(&analysis.errors)),
    }
}

fn error_topic_fallback(errors: &Value) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    if let Some(items) = errors.as_array() {
        for item in items {
            if let Some(topic) = item.get("topic").and_then(Value::as_str) {
                if !topic.is_empty() && !topics.iter().any(|seen| seen == topic) {
                    topics.push(topic.to_string());
                }
            }
        }
    }
    topics
}

/// Wrong answers for the activity feed. A missing flag counts as correct
/// here; the recap recount below treats it as wrong, matching how each
/// consumer has always read the data.
fn count_wrong_answers(answers: &Value) -> usize {
    answers
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|answer| {
                    !answer
                        .get("is_correct")
                        .and_then(Value::as_bool)
                        .unwrap_or(true)
                })
                .count()
        })
        .unwrap_or(0)
}

fn answer_is_correct(answer: &Value) -> bool {
    answer
        .get("is_correct")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
