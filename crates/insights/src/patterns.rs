//! Hidden pattern detection over assessment history
//!
//! Seven detectors over quiz results and midterm reviews, each pairing a
//! formal finding with a plain-language takeaway. The findings feed the
//! study report prompt and both lists render on the report itself.

use serde::Serialize;
use studybuddy_common::db::models::{MidtermAnalysis, QuizResult};

use crate::{mean, string_list};

const TREND_MIN_RESULTS: usize = 6;
const TREND_WINDOW: usize = 3;
const TREND_MARGIN: f64 = 5.0;
const WEAK_TOPIC_MIN_QUIZZES: usize = 2;
const WEAK_RATIO_THRESHOLD: f64 = 0.6;
const WEAK_AVG_THRESHOLD: f64 = 50.0;
const WEAK_TOPICS_LISTED: usize = 5;
const TIME_MIN_RESULTS: usize = 3;
const TIME_SLOW_MARGIN: f64 = 10.0;
const TIME_QUICK_MARGIN: f64 = 5.0;
const MIDTERM_ERROR_THRESHOLD: f64 = 5.0;
const QUIZ_STRUGGLE_THRESHOLD: f64 = 60.0;
const CLUSTER_MIN_MENTIONS: usize = 5;
const CLUSTER_MIN_SIZE: usize = 3;
const LOW_ACCURACY_CUTOFF: f64 = 40.0;
const VERY_DIFFICULT_RATIO: f64 = 0.4;
const CONSISTENCY_MIN_RESULTS: usize = 4;
const HIGH_VARIANCE_STDDEV: f64 = 20.0;
const LOW_VARIANCE_STDDEV: f64 = 10.0;

const ALGO_KEYWORDS: [&str; 4] = ["algorithm", "sort", "search", "data structure"];
const DATA_KEYWORDS: [&str; 3] = ["database", "sql", "data"];
const WEB_KEYWORDS: [&str; 4] = ["web", "frontend", "backend", "api"];

/// One detected pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub finding: String,
    pub insight: String,
}

/// All detected findings and takeaways, in detector order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatternReport {
    pub patterns: Vec<String>,
    pub hidden_insights: Vec<String>,
}

/// Run every detector over the user's history, newest rows first.
pub fn analyze(results: &[QuizResult], analyses: &[MidtermAnalysis]) -> PatternReport {
    let mut detected: Vec<Pattern> = Vec::new();

    detected.extend(score_trend(results));
    detected.extend(consistently_weak_topics(results));
    detected.extend(time_performance(results));
    detected.extend(quiz_vs_midterm(results, analyses));
    detected.extend(topic_clusters(&collect_weak_topic_mentions(results, analyses)));
    detected.extend(difficulty_profile(results));
    detected.extend(consistency(results));

    let mut report = PatternReport::default();
    for pattern in detected {
        report.patterns.push(pattern.finding);
        report.hidden_insights.push(pattern.insight);
    }
    report
}

/// Recent-vs-older score delta for the report prompt, zero on thin history.
pub fn score_trend_delta(results: &[QuizResult]) -> f64 {
    if results.len() < TREND_MIN_RESULTS {
        return 0.0;
    }
    let scores: Vec<f64> = results.iter().map(|result| result.score).collect();
    mean(&scores[..TREND_WINDOW]) - mean(&scores[scores.len() - TREND_WINDOW..])
}

/// Every weak-topic mention across quizzes and midterms, duplicates kept.
pub fn collect_weak_topic_mentions(
    results: &[QuizResult],
    analyses: &[MidtermAnalysis],
) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    for result in results {
        mentions.extend(string_list(&result.weak_topics));
    }
    for analysis in analyses {
        mentions.extend(string_list(&analysis.error_topics));
    }
    mentions
}

fn score_trend(results: &[QuizResult]) -> Option<Pattern> {
    if results.len() < TREND_MIN_RESULTS {
        return None;
    }
    let scores: Vec<f64> = results.iter().map(|result| result.score).collect();
    let recent = mean(&scores[..TREND_WINDOW]);
    let older = mean(&scores[scores.len() - TREND_WINDOW..]);

    if recent > older + TREND_MARGIN {
        Some(Pattern {
            finding: format!(
                "IMPROVING TREND: Recent quiz scores ({recent:.1}%) are significantly higher than earlier scores ({older:.1}%), showing {:.1}% improvement.",
                recent - older
            ),
            insight: "You're showing strong upward momentum - your recent performance suggests effective learning strategies are working.".to_string(),
        })
    } else if recent < older - TREND_MARGIN {
        Some(Pattern {
            finding: format!(
                "DECLINING TREND: Recent scores ({recent:.1}%) are lower than earlier ({older:.1}%), indicating potential knowledge retention issues."
            ),
            insight: "Your performance has declined recently - consider reviewing previously mastered topics to maintain retention.".to_string(),
        })
    } else {
        None
    }
}

struct TopicRecord {
    topic: String,
    scores: Vec<f64>,
    weak_count: usize,
    total: usize,
}

fn consistently_weak_topics(results: &[QuizResult]) -> Option<Pattern> {
    let mut records: Vec<TopicRecord> = Vec::new();

    for result in results {
        let topics = result
            .quiz_topics
            .as_ref()
            .map(string_list)
            .unwrap_or_default();
        let weak = string_list(&result.weak_topics);

        for topic in topics {
            let idx = match records.iter().position(|record| record.topic == topic) {
                Some(idx) => idx,
                None => {
                    records.push(TopicRecord {
                        topic: topic.clone(),
                        scores: Vec::new(),
                        weak_count: 0,
                        total: 0,
                    });
                    records.len() - 1
                }
            };
            records[idx].scores.push(result.score);
            records[idx].total += 1;
            if weak.contains(&topic) {
                records[idx].weak_count += 1;
            }
        }
    }

    let mut flagged: Vec<(String, String)> = Vec::new();
    for record in &records {
        if record.total < WEAK_TOPIC_MIN_QUIZZES {
            continue;
        }
        let weak_ratio = record.weak_count as f64 / record.total as f64;
        let avg = mean(&record.scores);
        if weak_ratio >= WEAK_RATIO_THRESHOLD || avg < WEAK_AVG_THRESHOLD {
            flagged.push((
                record.topic.clone(),
                format!(
                    "{} (appeared in {} quizzes, weak in {} of them, avg score: {avg:.1}%)",
                    record.topic, record.total, record.weak_count
                ),
            ));
        }
    }

    let (first_topic, _) = flagged.first()?;
    let insight = format!(
        "Hidden pattern detected: You struggle with {first_topic} across multiple assessments - this indicates a fundamental gap that needs systematic review."
    );
    let listed: Vec<&str> = flagged
        .iter()
        .take(WEAK_TOPICS_LISTED)
        .map(|(_, line)| line.as_str())
        .collect();
    Some(Pattern {
        finding: format!(
            "CONSISTENT WEAKNESS PATTERN: These topics appear repeatedly as weak areas: {}",
            listed.join(", ")
        ),
        insight,
    })
}

fn time_performance(results: &[QuizResult]) -> Option<Pattern> {
    let mut timed: Vec<(i32, f64)> = results
        .iter()
        .filter_map(|result| match result.time_spent {
            Some(secs) if secs > 0 => Some((secs, result.score)),
            _ => None,
        })
        .collect();
    if timed.len() < TIME_MIN_RESULTS {
        return None;
    }
    timed.sort_by_key(|(secs, _)| *secs);

    // Matching halves; on odd counts the middle result sits out.
    let half = timed.len() / 2;
    let quick: Vec<f64> = timed[..half].iter().map(|(_, score)| *score).collect();
    let slow: Vec<f64> = timed[timed.len() - half..]
        .iter()
        .map(|(_, score)| *score)
        .collect();
    let quick_avg = mean(&quick);
    let slow_avg = mean(&slow);

    if slow_avg > quick_avg + TIME_SLOW_MARGIN {
        Some(Pattern {
            finding: format!(
                "TIME-PERFORMANCE CORRELATION: When you spend more time ({slow_avg:.1}% avg), you score significantly higher than when rushing ({quick_avg:.1}% avg)."
            ),
            insight: "Hidden insight: Taking your time leads to better results - you may benefit from slowing down and reading questions more carefully.".to_string(),
        })
    } else if quick_avg > slow_avg + TIME_QUICK_MARGIN {
        Some(Pattern {
            finding: format!(
                "EFFICIENCY PATTERN: You perform better when working quickly ({quick_avg:.1}%) vs slowly ({slow_avg:.1}%), suggesting strong recall but potential overthinking."
            ),
            insight: "Interesting pattern: You score higher when working faster - you might be overthinking on longer assessments. Trust your first instincts more.".to_string(),
        })
    } else {
        None
    }
}

fn quiz_vs_midterm(results: &[QuizResult], analyses: &[MidtermAnalysis]) -> Option<Pattern> {
    if results.is_empty() || analyses.is_empty() {
        return None;
    }
    let scores: Vec<f64> = results.iter().map(|result| result.score).collect();
    let errors: Vec<f64> = analyses
        .iter()
        .map(|analysis| f64::from(analysis.total_errors))
        .collect();
    let quiz_avg = mean(&scores);
    let error_avg = mean(&errors);

    if error_avg > MIDTERM_ERROR_THRESHOLD && quiz_avg < QUIZ_STRUGGLE_THRESHOLD {
        Some(Pattern {
            finding: format!(
                "ASSESSMENT TYPE PATTERN: High error rate in midterms ({error_avg:.1} errors avg) combined with lower quiz scores ({quiz_avg:.1}%) suggests difficulty with application-based questions."
            ),
            insight: "Pattern identified: You struggle more with comprehensive assessments (midterms) than focused quizzes - focus on connecting concepts across topics.".to_string(),
        })
    } else {
        None
    }
}

fn cluster_name(topic: &str) -> &'static str {
    let lower = topic.to_lowercase();
    if ALGO_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        "Algorithms & Data Structures"
    } else if DATA_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        "Data Management"
    } else if WEB_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        "Web Development"
    } else {
        "Other Topics"
    }
}

fn topic_clusters(mentions: &[String]) -> Option<Pattern> {
    if mentions.len() < CLUSTER_MIN_MENTIONS {
        return None;
    }
    let mut unique: Vec<&String> = Vec::new();
    for topic in mentions {
        if !unique.iter().any(|seen| *seen == topic) {
            unique.push(topic);
        }
    }

    let mut groups: Vec<(&'static str, usize)> = Vec::new();
    for topic in unique {
        let name = cluster_name(topic);
        match groups.iter_mut().find(|(group, _)| *group == name) {
            Some((_, count)) => *count += 1,
            None => groups.push((name, 1)),
        }
    }

    // First group wins ties, in mention order.
    let mut largest: (&'static str, usize) = ("", 0);
    for (name, count) in groups {
        if count > largest.1 {
            largest = (name, count);
        }
    }
    if largest.1 < CLUSTER_MIN_SIZE {
        return None;
    }

    Some(Pattern {
        finding: format!(
            "TOPIC CLUSTERING PATTERN: {} weak topics cluster around '{}' - this suggests a knowledge gap in this domain.",
            largest.1, largest.0
        ),
        insight: format!(
            "Hidden pattern discovered: Multiple weak areas in '{}' indicate you need foundational review in this entire domain, not just individual topics.",
            largest.0
        ),
    })
}

fn difficulty_profile(results: &[QuizResult]) -> Option<Pattern> {
    let accuracies: Vec<f64> = results
        .iter()
        .filter_map(|result| match result.total_questions {
            Some(total) if total > 0 => {
                Some(f64::from(result.correct_count.unwrap_or(0)) / f64::from(total) * 100.0)
            }
            _ => None,
        })
        .collect();
    if accuracies.is_empty() {
        return None;
    }

    let very_difficult = accuracies
        .iter()
        .filter(|accuracy| **accuracy < LOW_ACCURACY_CUTOFF)
        .count();
    let ratio = very_difficult as f64 / accuracies.len() as f64;

    if ratio > VERY_DIFFICULT_RATIO {
        Some(Pattern {
            finding: format!(
                "DIFFICULTY PATTERN: {:.0}% of your assessments show very low accuracy (<40%), indicating you're attempting content beyond your current level.",
                ratio * 100.0
            ),
            insight: "Critical insight: You're consistently scoring below 40% on many assessments - consider focusing on foundational concepts before advancing to complex topics.".to_string(),
        })
    } else {
        None
    }
}

fn consistency(results: &[QuizResult]) -> Option<Pattern> {
    if results.len() < CONSISTENCY_MIN_RESULTS {
        return None;
    }
    let scores: Vec<f64> = results.iter().map(|result| result.score).collect();
    let avg = mean(&scores);
    let variance =
        scores.iter().map(|score| (score - avg).powi(2)).sum::<f64>() / scores.len() as f64;
    let std_dev = variance.sqrt();

    if std_dev > HIGH_VARIANCE_STDDEV {
        Some(Pattern {
            finding: format!(
                "INCONSISTENCY PATTERN: High score variance (std dev: {std_dev:.1}%) suggests inconsistent preparation or topic-specific strengths/weaknesses."
            ),
            insight: "Pattern detected: Your performance varies widely - identify what you do differently on high-scoring assessments and replicate those strategies.".to_string(),
        })
    } else if std_dev < LOW_VARIANCE_STDDEV {
        Some(Pattern {
            finding: format!(
                "CONSISTENCY PATTERN: Low variance (std dev: {std_dev:.1}%) shows stable performance, but also suggests you may be plateauing."
            ),
            insight: "Insight: Your scores are very consistent - to break through, try challenging yourself with more difficult material or different study methods.".to_string(),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn scored(score: f64) -> QuizResult {
        QuizResult {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4().to_string(),
            score,
            answers: json!([]),
            weak_topics: json!([]),
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

    fn analysis_with_errors(total_errors: i32) -> MidtermAnalysis {
        MidtermAnalysis {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            filename: "paper.pdf".to_string(),
            course_name: "Physics".to_string(),
            errors: json!([]),
            extracted_text: String::new(),
            recommended_resources: json!([]),
            error_topics: json!([]),
            total_errors,
            correct_count: 0,
            wrong_count: total_errors,
            partially_correct_count: 0,
            total_marks_received: None,
            total_marks_possible: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap().into(),
        }
    }

    #[test]
    fn test_improving_trend_message() {
        let results: Vec<QuizResult> =
            [90.0, 85.0, 80.0, 60.0, 55.0, 50.0].iter().map(|s| scored(*s)).collect();
        let report = analyze(&results, &[]);
        let trend = report
            .patterns
            .iter()
            .find(|p| p.contains("IMPROVING TREND"))
            .unwrap();
        assert!(trend.contains("(85.0%)"));
        assert!(trend.contains("(55.0%)"));
        assert!(trend.contains("showing 30.0% improvement"));
    }

    #[test]
    fn test_declining_trend_message() {
        let results: Vec<QuizResult> =
            [50.0, 55.0, 60.0, 80.0, 85.0, 90.0].iter().map(|s| scored(*s)).collect();
        let report = analyze(&results, &[]);
        assert!(report.patterns.iter().any(|p| p.contains("DECLINING TREND")));
    }

    #[test]
    fn test_trend_needs_six_results() {
        let results: Vec<QuizResult> =
            [90.0, 85.0, 80.0, 60.0, 55.0].iter().map(|s| scored(*s)).collect();
        let report = analyze(&results, &[]);
        assert!(!report.patterns.iter().any(|p| p.contains("TREND")));
    }

    #[test]
    fn test_score_trend_delta() {
        let results: Vec<QuizResult> =
            [90.0, 85.0, 80.0, 60.0, 55.0, 50.0].iter().map(|s| scored(*s)).collect();
        assert_eq!(score_trend_delta(&results), 30.0);
        assert_eq!(score_trend_delta(&results[..4]), 0.0);
    }

    #[test]
    fn test_consistent_weakness_message() {
        let mut first = scored(40.0);
        first.quiz_topics = Some(json!(["Recursion"]));
        first.weak_topics = json!(["Recursion"]);
        let mut second = scored(45.0);
        second.quiz_topics = Some(json!(["Recursion"]));
        second.weak_topics = json!(["Recursion"]);

        let report = analyze(&[first, second], &[]);
        let finding = report
            .patterns
            .iter()
            .find(|p| p.contains("CONSISTENT WEAKNESS PATTERN"))
            .unwrap();
        assert!(finding
            .contains("Recursion (appeared in 2 quizzes, weak in 2 of them, avg score: 42.5%)"));
        assert!(report
            .hidden_insights
            .iter()
            .any(|i| i.contains("You struggle with Recursion across multiple assessments")));
    }

    #[test]
    fn test_weak_topic_needs_two_appearances() {
        let mut only = scored(30.0);
        only.quiz_topics = Some(json!(["Recursion"]));
        only.weak_topics = json!(["Recursion"]);
        let report = analyze(&[only], &[]);
        assert!(!report.patterns.iter().any(|p| p.contains("CONSISTENT WEAKNESS")));
    }

    #[test]
    fn test_time_correlation_excludes_middle_result() {
        let specs = [(60, 50.0), (120, 52.0), (180, 99.0), (240, 70.0), (300, 75.0)];
        let results: Vec<QuizResult> = specs
            .iter()
            .map(|(secs, score)| {
                let mut result = scored(*score);
                result.time_spent = Some(*secs);
                result
            })
            .collect();

        let report = analyze(&results, &[]);
        let finding = report
            .patterns
            .iter()
            .find(|p| p.contains("TIME-PERFORMANCE CORRELATION"))
            .unwrap();
        // Middle result (180s, 99%) is excluded from both halves.
        assert!(finding.contains("(72.5% avg)"));
        assert!(finding.contains("(51.0% avg)"));
    }

    #[test]
    fn test_efficiency_pattern_when_quick_wins() {
        let specs = [(60, 90.0), (120, 88.0), (300, 60.0), (400, 62.0)];
        let results: Vec<QuizResult> = specs
            .iter()
            .map(|(secs, score)| {
                let mut result = scored(*score);
                result.time_spent = Some(*secs);
                result
            })
            .collect();

        let report = analyze(&results, &[]);
        assert!(report.patterns.iter().any(|p| p.contains("EFFICIENCY PATTERN")));
    }

    #[test]
    fn test_untimed_results_are_ignored() {
        let results: Vec<QuizResult> = [50.0, 90.0, 70.0].iter().map(|s| scored(*s)).collect();
        let report = analyze(&results, &[]);
        assert!(!report.patterns.iter().any(|p| p.contains("TIME-PERFORMANCE")));
    }

    #[test]
    fn test_quiz_vs_midterm_pattern() {
        let results: Vec<QuizResult> = [55.0, 50.0].iter().map(|s| scored(*s)).collect();
        let analyses = vec![analysis_with_errors(8), analysis_with_errors(6)];
        let report = analyze(&results, &analyses);
        let finding = report
            .patterns
            .iter()
            .find(|p| p.contains("ASSESSMENT TYPE PATTERN"))
            .unwrap();
        assert!(finding.contains("(7.0 errors avg)"));
        assert!(finding.contains("(52.5%)"));

        let mild = vec![analysis_with_errors(2)];
        let report = analyze(&results, &mild);
        assert!(!report.patterns.iter().any(|p| p.contains("ASSESSMENT TYPE")));
    }

    #[test]
    fn test_topic_cluster_message() {
        let mut result = scored(50.0);
        result.weak_topics = json!([
            "Sorting Algorithms",
            "Binary Search",
            "Graph Algorithms",
            "SQL Joins",
            "Cell Biology",
        ]);
        let report = analyze(&[result], &[]);
        let finding = report
            .patterns
            .iter()
            .find(|p| p.contains("TOPIC CLUSTERING PATTERN"))
            .unwrap();
        assert!(finding.contains("3 weak topics cluster around 'Algorithms & Data Structures'"));
    }

    #[test]
    fn test_cluster_needs_enough_distinct_topics() {
        let mut result = scored(50.0);
        result.weak_topics = json!(["Sorting", "Sorting", "Sorting", "Sorting", "Sorting"]);
        let report = analyze(&[result], &[]);
        // Five mentions but a single distinct topic never forms a cluster.
        assert!(!report.patterns.iter().any(|p| p.contains("CLUSTERING")));
    }

    #[test]
    fn test_difficulty_pattern_ratio() {
        let mut hard_one = scored(30.0);
        hard_one.total_questions = Some(10);
        hard_one.correct_count = Some(3);
        let mut hard_two = scored(20.0);
        hard_two.total_questions = Some(10);
        hard_two.correct_count = Some(2);
        let mut fine = scored(80.0);
        fine.total_questions = Some(10);
        fine.correct_count = Some(8);

        let report = analyze(&[hard_one, hard_two, fine], &[]);
        let finding = report
            .patterns
            .iter()
            .find(|p| p.contains("DIFFICULTY PATTERN"))
            .unwrap();
        assert!(finding.contains("67% of your assessments"));
    }

    #[test]
    fn test_high_variance_message() {
        let results: Vec<QuizResult> =
            [90.0, 30.0, 95.0, 25.0].iter().map(|s| scored(*s)).collect();
        let report = analyze(&results, &[]);
        let finding = report
            .patterns
            .iter()
            .find(|p| p.contains("INCONSISTENCY PATTERN"))
            .unwrap();
        assert!(finding.contains("std dev: 32.6%"));
    }

    #[test]
    fn test_low_variance_message() {
        let results: Vec<QuizResult> =
            [80.0, 82.0, 78.0, 81.0].iter().map(|s| scored(*s)).collect();
        let report = analyze(&results, &[]);
        assert!(report.patterns.iter().any(|p| p.contains("CONSISTENCY PATTERN")));
    }

    #[test]
    fn test_empty_history_finds_nothing() {
        let report = analyze(&[], &[]);
        assert!(report.patterns.is_empty());
        assert!(report.hidden_insights.is_empty());
    }

    #[test]
    fn test_findings_and_insights_stay_paired() {
        let results: Vec<QuizResult> =
            [90.0, 85.0, 80.0, 60.0, 55.0, 50.0].iter().map(|s| scored(*s)).collect();
        let report = analyze(&results, &analysis_rows());
        assert_eq!(report.patterns.len(), report.hidden_insights.len());
    }

    fn analysis_rows() -> Vec<MidtermAnalysis> {
        vec![analysis_with_errors(8), analysis_with_errors(7)]
    }
}
