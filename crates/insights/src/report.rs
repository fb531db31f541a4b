//! Performance snapshots and model-written narratives
//!
//! Aggregates the full assessment history into the numbers behind the
//! dashboard insight analysis and the comprehensive study report, builds
//! both prompts, and parses the model's JSON replies with deterministic
//! fallbacks at every layer.

use regex_lite::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use studybuddy_common::db::models::{MidtermAnalysis, QuizResult};

use crate::patterns::{self, PatternReport};
use crate::{mean, round1, string_list};

pub const INSIGHT_TEMPERATURE: f32 = 0.7;
pub const INSIGHT_MAX_TOKENS: u32 = 4096;
pub const REPORT_TEMPERATURE: f32 = 0.8;
pub const REPORT_MAX_TOKENS: u32 = 4000;

const QUIZ_DETAIL_LIMIT: usize = 10;
const MIDTERM_DETAIL_LIMIT: usize = 5;
const DETAIL_TOPIC_LIMIT: usize = 3;
const DETAIL_WEAK_LIMIT: usize = 2;
const REPORT_WEAK_TOPICS: usize = 15;
const FALLBACK_WEAK_TOPICS: usize = 10;
const INSIGHT_WEAK_TOPICS: usize = 5;
const REPLY_PREVIEW_CHARS: usize = 200;

/// Aggregate numbers over a user's full assessment history.
#[derive(Debug, Clone, Default)]
pub struct PerformanceSnapshot {
    pub total_quizzes: usize,
    pub total_midterms: usize,
    pub overall_accuracy: f64,
    pub total_questions: i64,
    pub total_correct: i64,
    /// Weak-topic mentions in row order, duplicates kept.
    pub weak_topics: Vec<String>,
    pub topic_stats: Vec<(String, TopicStats)>,
}

/// Per-topic tallies. Quiz rows contribute scores only; midterm error
/// items contribute the correct/total counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicStats {
    pub correct: usize,
    pub total: usize,
    pub scores: Vec<f64>,
}

impl PerformanceSnapshot {
    /// First occurrence of each weak topic, in mention order.
    pub fn unique_weak_topics(&self) -> Vec<String> {
        let mut unique: Vec<String> = Vec::new();
        for topic in &self.weak_topics {
            if !unique.contains(topic) {
                unique.push(topic.clone());
            }
        }
        unique
    }
}

/// Aggregate the full history into one snapshot.
pub fn snapshot(results: &[QuizResult], analyses: &[MidtermAnalysis]) -> PerformanceSnapshot {
    let mut snap = PerformanceSnapshot {
        total_quizzes: results.len(),
        total_midterms: analyses.len(),
        ..Default::default()
    };

    let mut scores: Vec<f64> = Vec::new();
    for result in results {
        scores.push(result.score);
        let topics = result
            .quiz_topics
            .as_ref()
            .map(string_list)
            .unwrap_or_default();
        for topic in topics {
            topic_entry(&mut snap.topic_stats, &topic)
                .scores
                .push(result.score);
        }
        snap.total_questions += i64::from(result.total_questions.unwrap_or(0));
        snap.total_correct += i64::from(result.correct_count.unwrap_or(0));
    }

    for analysis in analyses {
        if let Some(errors) = analysis.errors.as_array() {
            for error in errors {
                let topic = error
                    .get("topic")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown");
                let correctness = error
                    .get("correctness")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let stats = topic_entry(&mut snap.topic_stats, topic);
                stats.total += 1;
                if correctness.eq_ignore_ascii_case("correct") {
                    stats.correct += 1;
                }
            }
        }
    }

    snap.weak_topics = patterns::collect_weak_topic_mentions(results, analyses);
    snap.overall_accuracy = mean(&scores);
    snap
}

fn topic_entry<'a>(stats: &'a mut Vec<(String, TopicStats)>, topic: &str) -> &'a mut TopicStats {
    let idx = match stats.iter().position(|(name, _)| name == topic) {
        Some(idx) => idx,
        None => {
            stats.push((topic.to_string(), TopicStats::default()));
            stats.len() - 1
        }
    };
    &mut stats[idx].1
}

/// Prompt behind the dashboard insight analysis.
pub fn insight_prompt(snapshot: &PerformanceSnapshot) -> String {
    let unique = snapshot.unique_weak_topics();
    let weak_line = if unique.is_empty() {
        "None identified".to_string()
    } else {
        unique.join(", ")
    };

    let mut topic_performance = Map::new();
    for (topic, stats) in &snapshot.topic_stats {
        let accuracy = if stats.total > 0 {
            json!(stats.correct as f64 / stats.total as f64 * 100.0)
        } else {
            json!(0)
        };
        let avg_score = if stats.scores.is_empty() {
            json!(0)
        } else {
            json!(mean(&stats.scores))
        };
        topic_performance.insert(
            topic.clone(),
            json!({"accuracy": accuracy, "avg_score": avg_score}),
        );
    }
    let topic_json = serde_json::to_string_pretty(&Value::Object(topic_performance))
        .unwrap_or_else(|_| "{}".to_string());

    let total_quizzes = snapshot.total_quizzes;
    let total_midterms = snapshot.total_midterms;
    let overall_accuracy = snapshot.overall_accuracy;
    let total_questions = snapshot.total_questions;
    let total_correct = snapshot.total_correct;

    format!(
        "User Performance Summary:
- Total Quizzes: {total_quizzes}
- Total Midterm Reviews: {total_midterms}
- Overall Average Score: {overall_accuracy:.1}%
- Total Questions Attempted: {total_questions}
- Total Correct Answers: {total_correct}
- Weak Topics Identified: {weak_line}

Topic Performance:
{topic_json}

Analyze this performance data and provide:
1. Key insights about the user's learning journey
2. Identified strengths (topics with >80% accuracy)
3. Areas needing improvement (topics with <70% accuracy)
4. Specific recommendations for improvement
5. Learning trends (improving, declining, or stable)

Return a JSON object with: insights (array of strings), strengths (array of topic names), weaknesses (array of topic names), improvement_areas (array of detailed recommendations), trends (object with trend analysis)."
    )
}

/// Parse the model's insight reply; layered fallbacks keep the endpoint
/// serving something useful whatever comes back.
pub fn parse_insight_reply(reply: &str, unique_weak: &[String]) -> Value {
    let object_re = Regex::new(r"(?s)\{.*\}").unwrap();

    match object_re.find(reply) {
        Some(found) => match serde_json::from_str::<Value>(found.as_str()) {
            Ok(parsed) => parsed,
            Err(_) => failed_insight_analysis(unique_weak),
        },
        None => {
            let preview: String = reply.chars().take(REPLY_PREVIEW_CHARS).collect();
            json!({
                "insights": [format!("{preview}...")],
                "strengths": [],
                "weaknesses": weak_five(unique_weak),
                "improvement_areas": ["Focus on weak topics identified in your quizzes"],
                "trends": {},
            })
        }
    }
}

/// Analysis served when the model call fails or its reply has no usable
/// JSON object.
pub fn failed_insight_analysis(unique_weak: &[String]) -> Value {
    json!({
        "insights": ["Performance analysis completed"],
        "strengths": [],
        "weaknesses": weak_five(unique_weak),
        "improvement_areas": ["Continue practicing weak topics"],
        "trends": {},
    })
}

fn weak_five(unique_weak: &[String]) -> Vec<String> {
    unique_weak.iter().take(INSIGHT_WEAK_TOPICS).cloned().collect()
}

/// Final payload for the insight endpoint.
pub fn insight_response(snapshot: &PerformanceSnapshot, analysis: &Value) -> Value {
    let unique = snapshot.unique_weak_topics();
    let weaknesses = match analysis.get("weaknesses") {
        Some(value) => value.clone(),
        None => json!(unique
            .iter()
            .take(FALLBACK_WEAK_TOPICS)
            .cloned()
            .collect::<Vec<_>>()),
    };

    let mut topic_performance = Map::new();
    for (topic, stats) in &snapshot.topic_stats {
        if stats.total == 0 {
            continue;
        }
        let accuracy = stats.correct as f64 / stats.total as f64 * 100.0;
        let avg_score = if stats.scores.is_empty() {
            0.0
        } else {
            mean(&stats.scores)
        };
        topic_performance.insert(
            topic.clone(),
            json!({"accuracy": round1(accuracy), "avg_score": round1(avg_score)}),
        );
    }

    json!({
        "overall_accuracy": round1(snapshot.overall_accuracy),
        "total_quizzes": snapshot.total_quizzes,
        "total_midterms": snapshot.total_midterms,
        "total_questions": snapshot.total_questions,
        "total_correct": snapshot.total_correct,
        "insights": analysis.get("insights").cloned().unwrap_or_else(|| json!([])),
        "strengths": analysis.get("strengths").cloned().unwrap_or_else(|| json!([])),
        "weaknesses": weaknesses,
        "improvement_areas": analysis.get("improvement_areas").cloned().unwrap_or_else(|| json!([])),
        "trends": analysis.get("trends").cloned().unwrap_or_else(|| json!({})),
        "topic_performance": topic_performance,
    })
}

/// Insight payload for a user with no history yet.
pub fn empty_insight_response() -> Value {
    json!({
        "overall_accuracy": 0,
        "total_quizzes": 0,
        "total_midterms": 0,
        "insights": ["No activity data available yet. Start taking quizzes or uploading midterm reviews!"],
        "strengths": [],
        "weaknesses": [],
        "improvement_areas": [],
        "trends": {},
    })
}

fn quiz_detail_lines(results: &[QuizResult]) -> Vec<String> {
    results
        .iter()
        .take(QUIZ_DETAIL_LIMIT)
        .enumerate()
        .map(|(i, result)| {
            let topics = result
                .quiz_topics
                .as_ref()
                .map(string_list)
                .unwrap_or_default();
            let weak = string_list(&result.weak_topics);
            format!(
                "Quiz {}: Score {}%, {}/{} correct, Time: {}s, Topics: {}, Weak in: {}",
                i + 1,
                result.score,
                result.correct_count.unwrap_or(0),
                result.total_questions.unwrap_or(0),
                result.time_spent.unwrap_or(0),
                topics[..topics.len().min(DETAIL_TOPIC_LIMIT)].join(", "),
                weak[..weak.len().min(DETAIL_WEAK_LIMIT)].join(", "),
            )
        })
        .collect()
}

fn midterm_detail_lines(analyses: &[MidtermAnalysis]) -> Vec<String> {
    analyses
        .iter()
        .take(MIDTERM_DETAIL_LIMIT)
        .enumerate()
        .map(|(i, analysis)| {
            let topics = string_list(&analysis.error_topics);
            format!(
                "Midterm {}: {} errors, Course: {}, Error topics: {}",
                i + 1,
                analysis.total_errors,
                analysis.course_name,
                topics[..topics.len().min(DETAIL_TOPIC_LIMIT)].join(", "),
            )
        })
        .collect()
}

// Static tail of the report prompt. The braced tokens are templates the
// model fills in, not interpolations.
const REPORT_GUIDELINES: &str = r#"2. STRENGTHS (5-8 items, each 2-3 sentences with reasoning):
   - Identify actual strengths from the data with specific evidence
   - If they improved over time, explain WHY this happened and what it means
   - If certain topics score well, list them with specific scores and explain why they're strengths
   - Reference specific quiz numbers or dates if available
   - Explain the significance of each strength
   - Be specific: "In Quiz 3 on [date], you scored 85% on [topic], demonstrating strong understanding of..."
   - Discuss what these strengths indicate about their learning style

3. WEAKNESSES (8-12 items, each 2-3 sentences with detailed analysis):
   - List actual weak topics with specific performance data
   - For each weakness, provide:
     * The topic name
     * How many times it appeared as weak (e.g., "appeared in 4 out of 6 quizzes")
     * Average score on that topic
     * Specific examples from quiz/midterm history
     * Reasoning for why this is a weakness
     * Impact on overall performance
   - Reference consistently weak topics with full context
   - Explain the pattern: "This topic appears as a weakness in {X}% of your assessments, suggesting..."
   - Discuss the root cause if identifiable from patterns

4. RECOMMENDATIONS (10-15 detailed items, each 3-5 sentences with extensive reasoning):
   Each recommendation must include:
   - WHAT to do (specific action)
   - WHY to do it (reasoning based on their data/patterns)
   - HOW to do it (step-by-step approach)
   - WHEN to do it (timeline or priority)
   - EXPECTED OUTCOME (what improvement to expect)

   Structure recommendations around:
   - Hidden patterns discovered (explain the pattern, why it matters, how to address it)
   - Specific weak topics (name the topic, explain why it's weak, provide targeted study plan)
   - Time-performance correlations (if found, explain the relationship and suggest pacing strategies)
   - Consistency issues (if found, explain the variance and suggest stabilization methods)
   - Topic clusters (if found, explain the domain gap and suggest foundational review)
   - Performance trends (if declining, explain why and suggest recovery strategies)

   Example format: "Focus intensively on {topic} because it appears as a weakness in {X} of your {Y} assessments with an average score of {Z}%. This indicates a fundamental gap that's affecting your overall performance. Start by reviewing basic concepts through [specific resource type], then practice with [specific practice type] for 2-3 hours daily. Track your progress weekly. You should see improvement within 2-3 weeks, which should raise your overall average by approximately {estimated_improvement}%."

5. STUDY_STRATEGY (8-12 sentences, 200-300 words):
   A comprehensive, personalized strategy that:
   - Opens with an assessment of their current learning approach based on data
   - References their actual performance patterns with specific numbers
   - Explains WHY a particular approach will work for them (based on patterns)
   - Suggests a specific, phased approach:
     * Phase 1: Immediate actions (next week)
     * Phase 2: Short-term goals (next month)
     * Phase 3: Long-term improvement (next 2-3 months)
   - Mentions their weak topic clusters with reasoning
   - Addresses time management based on time-performance patterns
   - Provides a concrete, week-by-week action plan
   - Explains the expected trajectory of improvement
   - Discusses how to measure progress
   - Ends with motivation based on their specific achievements

=== WRITING STYLE ===
- Use comprehensive, detailed explanations
- Provide reasoning for every claim
- Reference specific data points throughout
- Use professional but accessible language
- Be encouraging but realistic
- Show deep analysis, not surface-level observations
- Connect different data points to reveal insights
- Explain the "why" behind every recommendation

IMPORTANT:
- Make everything specific to THIS student's data
- Reference actual numbers, topics, dates, and patterns throughout
- Do NOT use generic advice - every sentence should be personalized
- Provide extensive reasoning and explanations
- Show deep analytical thinking
- Make the report comprehensive and detailed (aim for 1000+ words total)

Return JSON with: {"overview": "...", "strengths": ["..."], "weaknesses": ["..."], "recommendations": ["..."], "study_strategy": "..."}"#;

/// Full prompt for the comprehensive study report.
pub fn report_prompt(
    snapshot: &PerformanceSnapshot,
    patterns: &PatternReport,
    results: &[QuizResult],
    analyses: &[MidtermAnalysis],
    trend_delta: f64,
) -> String {
    let unique = snapshot.unique_weak_topics();
    let weak_line = if unique.is_empty() {
        "None identified".to_string()
    } else {
        unique[..unique.len().min(REPORT_WEAK_TOPICS)].join(", ")
    };

    let quiz_lines = quiz_detail_lines(results);
    let quiz_history = if quiz_lines.is_empty() {
        "No quiz data available".to_string()
    } else {
        quiz_lines.join("\n")
    };
    let midterm_lines = midterm_detail_lines(analyses);
    let midterm_history = if midterm_lines.is_empty() {
        "No midterm data available".to_string()
    } else {
        midterm_lines.join("\n")
    };
    let patterns_block = if patterns.patterns.is_empty() {
        "No significant patterns detected yet".to_string()
    } else {
        patterns.patterns.join("\n")
    };
    let insights_block = if patterns.hidden_insights.is_empty() {
        "Continue learning to discover patterns".to_string()
    } else {
        patterns.hidden_insights.join("\n")
    };
    let accuracy_rate = if snapshot.total_questions > 0 {
        snapshot.total_correct as f64 / snapshot.total_questions as f64 * 100.0
    } else {
        0.0
    };

    let total_quizzes = snapshot.total_quizzes;
    let total_midterms = snapshot.total_midterms;
    let overall_accuracy = snapshot.overall_accuracy;
    let total_questions = snapshot.total_questions;
    let total_correct = snapshot.total_correct;

    format!(
        "Analyze this student's complete learning journey using the detailed data below. Provide specific, actionable insights based on the actual patterns found in their performance data.

=== PERFORMANCE SUMMARY ===
- Total Quizzes Completed: {total_quizzes}
- Total Midterm Reviews: {total_midterms}
- Overall Average Score: {overall_accuracy:.1}%
- Total Questions Attempted: {total_questions}
- Total Correct Answers: {total_correct}
- Accuracy Rate: {accuracy_rate:.1}%

=== DETAILED QUIZ HISTORY ===
{quiz_history}

=== DETAILED MIDTERM HISTORY ===
{midterm_history}

=== IDENTIFIED WEAK TOPICS ===
{weak_line}

=== DISCOVERED PATTERNS ===
{patterns_block}

=== HIDDEN INSIGHTS ===
{insights_block}

=== ANALYSIS REQUIREMENTS ===
Based on this REAL data, provide a COMPREHENSIVE, DETAILED analysis with extensive reasoning:

1. OVERVIEW (5-8 sentences, 150-250 words):
   - Start with a comprehensive assessment of their learning journey
   - Mention specific numbers: \"{total_quizzes} quizzes\", \"{total_midterms} midterm reviews\", \"{overall_accuracy:.1}% average score\", \"{total_questions} questions attempted\", \"{total_correct} correct answers\"
   - Analyze their overall progress trajectory (improving, declining, or stable)
   - Reference specific patterns discovered (e.g., \"Your recent performance shows a {trend_delta:.1}% decline, indicating...\")
   - Provide reasoning for what these numbers mean
   - Discuss the significance of their learning activity level
   - End with an overall assessment of their learning status

{REPORT_GUIDELINES}"
    )
}

/// Narrative fields extracted from the report reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportNarrative {
    pub overview: String,
    pub strengths: Vec<Value>,
    pub weaknesses: Vec<Value>,
    pub recommendations: Vec<Value>,
    pub study_strategy: String,
}

/// Parse the report reply into its narrative fields.
pub fn parse_report_reply(reply: &str, unique_weak: &[String]) -> ReportNarrative {
    let object_re = Regex::new(r"(?s)\{.*\}").unwrap();
    let weak_ten: Vec<Value> = unique_weak
        .iter()
        .take(FALLBACK_WEAK_TOPICS)
        .map(|topic| json!(topic))
        .collect();

    let found = match object_re.find(reply) {
        Some(found) => found,
        None => {
            return ReportNarrative {
                overview: "Comprehensive learning analysis completed".to_string(),
                strengths: vec![],
                weaknesses: weak_ten,
                recommendations: vec![json!("Continue practicing identified weak areas")],
                study_strategy: "Focus on weak topics systematically".to_string(),
            }
        }
    };

    match serde_json::from_str::<Value>(found.as_str()) {
        Ok(parsed) => ReportNarrative {
            overview: narrative_text(
                parsed.get("overview"),
                "Comprehensive learning analysis completed",
            ),
            strengths: value_list(parsed.get("strengths")).unwrap_or_default(),
            weaknesses: value_list(parsed.get("weaknesses")).unwrap_or(weak_ten),
            recommendations: value_list(parsed.get("recommendations"))
                .unwrap_or_else(|| vec![json!("Continue practicing identified weak areas")]),
            study_strategy: narrative_text(
                parsed.get("study_strategy"),
                "Focus on weak topics systematically",
            ),
        },
        Err(_) => ReportNarrative {
            overview: "Learning analysis completed".to_string(),
            strengths: vec![],
            weaknesses: weak_ten,
            recommendations: vec![json!("Practice weak topics")],
            study_strategy: "Systematic review of weak areas".to_string(),
        },
    }
}

/// Narrative used when the model call itself fails.
pub fn failed_report_narrative() -> ReportNarrative {
    ReportNarrative {
        overview: "Learning analysis".to_string(),
        strengths: vec![],
        weaknesses: vec![],
        recommendations: vec![],
        study_strategy: String::new(),
    }
}

/// Final payload for the comprehensive study report.
pub fn report_response(
    snapshot: &PerformanceSnapshot,
    patterns: &PatternReport,
    narrative: &ReportNarrative,
    generated_at: &str,
) -> Value {
    json!({
        "generated_at": generated_at,
        "overview": narrative.overview,
        "strengths": narrative.strengths,
        "weaknesses": narrative.weaknesses,
        "recommendations": narrative.recommendations,
        "study_strategy": narrative.study_strategy,
        "metrics": {
            "total_quizzes": snapshot.total_quizzes,
            "total_midterms": snapshot.total_midterms,
            "overall_average_score": round1(snapshot.overall_accuracy),
            "total_questions": snapshot.total_questions,
            "total_correct": snapshot.total_correct,
        },
        "patterns": patterns.patterns,
        "hidden_insights": patterns.hidden_insights,
    })
}

fn narrative_text(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(object @ Value::Object(_)) => object.to_string(),
        _ => default.to_string(),
    }
}

fn value_list(value: Option<&Value>) -> Option<Vec<Value>> {
    value.and_then(Value::as_array).map(|list| list.to_vec())
}
