//! Weakness grouping and resource balancing
//!
//! Groups weak topics by subject, allocates search quotas so no subject
//! dominates the recommendation list, and balances the final set. The
//! curator drives these over live search results; everything here is
//! pure and order-stable.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use studybuddy_common::clients::{StudyMaterial, UserWeaknesses, FREE_RESOURCES_CLAUSE};
use studybuddy_common::db::models::{MidtermAnalysis, QuizResult};

use crate::string_list;

/// Size of the final recommendation list.
pub const RESOURCE_TARGET: usize = 15;
/// First-pass cap per subject when balancing.
pub const MAX_PER_SUBJECT: usize = 5;
/// Topics searched per subject.
pub const TOPICS_PER_SUBJECT: usize = 5;
const MIN_SUBJECT_QUOTA: usize = 3;
const MIN_TOPIC_RESULTS: u32 = 2;

const TITLE_SUFFIXES: [&str; 5] = [" Quiz", " Error Quiz", " Assessment", " Test", " Exam"];
const TWO_WORD_SUBJECTS: [&str; 4] = [
    "computer science",
    "data structures",
    "organic chemistry",
    "inorganic chemistry",
];

/// Weak topics grouped by subject, plus the performance lines the
/// learning-path prompt quotes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeaknessProfile {
    pub all_topics: Vec<String>,
    pub by_subject: Vec<(String, Vec<String>)>,
    pub performance_context: Vec<String>,
}

impl WeaknessProfile {
    pub fn is_empty(&self) -> bool {
        self.all_topics.is_empty()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.by_subject
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }

    /// Registers the subject even when it brings no topics, so it still
    /// counts toward quota splitting.
    pub(crate) fn add_topics(&mut self, subject: &str, topics: &[String]) {
        for topic in topics {
            if !self.all_topics.contains(topic) {
                self.all_topics.push(topic.clone());
            }
        }
        let idx = match self.by_subject.iter().position(|(name, _)| name == subject) {
            Some(idx) => idx,
            None => {
                self.by_subject.push((subject.to_string(), Vec::new()));
                self.by_subject.len() - 1
            }
        };
        for topic in topics {
            if !self.by_subject[idx].1.contains(topic) {
                self.by_subject[idx].1.push(topic.clone());
            }
        }
    }
}

/// Collect every weak topic across quizzes, midterms, and the weakness
/// store, grouped by extracted subject.
pub fn collect_weakness_profile(
    results: &[QuizResult],
    analyses: &[MidtermAnalysis],
    stored: &UserWeaknesses,
) -> WeaknessProfile {
    let mut profile = WeaknessProfile::default();

    for result in results {
        let weak = string_list(&result.weak_topics);
        let subject = extract_subject(result.quiz_title.as_deref().unwrap_or(""));
        profile.add_topics(&subject, &weak);
        profile.performance_context.push(format!(
            "Quiz ({subject}): {}% score, weak in {}",
            result.score,
            weak.join(", ")
        ));
    }

    for analysis in analyses {
        let topics = string_list(&analysis.error_topics);
        let subject = extract_subject(&analysis.course_name);
        profile.add_topics(&subject, &topics);
        profile.performance_context.push(format!(
            "Midterm ({subject}): {} errors in {}",
            analysis.total_errors,
            topics.join(", ")
        ));
    }

    if !stored.topics.is_empty() {
        profile.add_topics("General", &stored.topics);
    }

    profile
}

/// Subject from a quiz or course label, "General" when unknown.
pub fn extract_subject(label: &str) -> String {
    if label.is_empty() {
        return "General".to_string();
    }
    let mut cleaned = label.to_string();
    for suffix in TITLE_SUFFIXES {
        cleaned = cleaned.replace(suffix, "");
    }
    let cleaned = cleaned.trim();

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() >= 2 {
        let pair = format!("{} {}", words[0], words[1]);
        if TWO_WORD_SUBJECTS.contains(&pair.to_lowercase().as_str()) {
            return pair;
        }
    }
    words
        .first()
        .map(|word| (*word).to_string())
        .unwrap_or_else(|| "General".to_string())
}

/// Per-subject resource quota: the target split evenly, floor of three.
pub fn subject_quota(subject_count: usize) -> usize {
    (RESOURCE_TARGET / subject_count.max(1)).max(MIN_SUBJECT_QUOTA)
}

/// Results to request per topic search, floor of two.
pub fn per_topic_results(quota: usize, topic_count: usize) -> u32 {
    ((quota / topic_count.max(1)) as u32).max(MIN_TOPIC_RESULTS)
}

/// Search query for one weak topic within a subject.
pub fn resource_query(topic: &str, subject: &str, difficulty: &str) -> String {
    format!(
        "Comprehensive study materials for learning {topic} in {subject}. Include tutorials, practice problems, video explanations, and written guides suitable for {difficulty} level. {FREE_RESOURCES_CLAUSE}"
    )
}

/// A found study material tagged with the topic and subject that led to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedResource {
    #[serde(flatten)]
    pub material: StudyMaterial,
    pub primary_topic: String,
    pub subject: String,
}

/// Keep the first resource per url; resources without a url are dropped.
pub fn dedupe_by_url(found: Vec<TaggedResource>) -> Vec<TaggedResource> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::new();
    for resource in found {
        if resource.material.url.is_empty() {
            continue;
        }
        if seen.insert(resource.material.url.clone()) {
            unique.push(resource);
        }
    }
    unique
}

/// Up to five resources per subject first, then leftover slots filled in
/// subject order, capped at the overall target.
pub fn balance_by_subject(unique: &[TaggedResource], subjects: &[String]) -> Vec<TaggedResource> {
    let mut balanced: Vec<TaggedResource> = Vec::new();
    for subject in subjects {
        balanced.extend(
            unique
                .iter()
                .filter(|resource| resource.subject == *subject)
                .take(MAX_PER_SUBJECT)
                .cloned(),
        );
    }

    let mut remaining = RESOURCE_TARGET.saturating_sub(balanced.len());
    if remaining > 0 {
        for subject in subjects {
            if remaining == 0 {
                break;
            }
            let already = balanced
                .iter()
                .filter(|resource| resource.subject == *subject)
                .count();
            let additional: Vec<TaggedResource> = unique
                .iter()
                .filter(|resource| resource.subject == *subject)
                .skip(already)
                .take(remaining)
                .cloned()
                .collect();
            remaining -= additional.len();
            balanced.extend(additional);
        }
    }

    balanced.truncate(RESOURCE_TARGET);
    balanced
}

/// Fresh when the cache was built at or after the user's newest activity.
pub fn is_cache_fresh(
    data_timestamp: Option<DateTime<FixedOffset>>,
    latest_activity: Option<DateTime<FixedOffset>>,
) -> bool {
    match (data_timestamp, latest_activity) {
        (Some(cached), Some(latest)) => cached >= latest,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn result_with(title: Option<&str>, score: f64, weak: &[&str]) -> QuizResult {
        QuizResult {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4().to_string(),
            score,
            answers: json!([]),
            weak_topics: json!(weak),
            time_spent: None,
            quiz_title: title.map(str::to_string),
            quiz_topics: None,
            correct_count: None,
            wrong_count: None,
            total_questions: None,
            weak_areas: None,
            recommended_resources: None,
            completed_at: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap().into(),
        }
    }

    fn analysis_with(course: &str, errors: i32, topics: &[&str]) -> MidtermAnalysis {
        MidtermAnalysis {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            filename: "paper.pdf".to_string(),
            course_name: course.to_string(),
            errors: json!([]),
            extracted_text: String::new(),
            recommended_resources: json!([]),
            error_topics: json!(topics),
            total_errors: errors,
            correct_count: 0,
            wrong_count: errors,
            partially_correct_count: 0,
            total_marks_received: None,
            total_marks_possible: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap().into(),
        }
    }

    fn tagged(url: &str, subject: &str) -> TaggedResource {
        TaggedResource {
            material: StudyMaterial {
                title: format!("Resource {url}"),
                description: "A free study resource".to_string(),
                url: url.to_string(),
                source: None,
            },
            primary_topic: "Topic".to_string(),
            subject: subject.to_string(),
        }
    }

    #[test]
    fn test_extract_subject_strips_suffixes() {
        assert_eq!(extract_subject("Physics Quiz"), "Physics");
        assert_eq!(extract_subject("Biology Assessment"), "Biology");
        assert_eq!(extract_subject("Calculus Exam"), "Calculus");
        assert_eq!(extract_subject(""), "General");
        assert_eq!(extract_subject(" Quiz"), "General");
    }

    #[test]
    fn test_extract_subject_keeps_known_two_word_subjects() {
        assert_eq!(extract_subject("Data Structures Quiz"), "Data Structures");
        assert_eq!(extract_subject("Organic Chemistry Error Quiz"), "Organic Chemistry");
        // Unrecognized pairs fall back to the first word.
        assert_eq!(extract_subject("Linear Algebra Test"), "Linear");
    }

    #[test]
    fn test_quota_math() {
        assert_eq!(subject_quota(1), 15);
        assert_eq!(subject_quota(3), 5);
        assert_eq!(subject_quota(4), 3);
        assert_eq!(subject_quota(10), 3);

        assert_eq!(per_topic_results(15, 5), 3);
        assert_eq!(per_topic_results(3, 5), 2);
        assert_eq!(per_topic_results(5, 1), 5);
    }

    #[test]
    fn test_profile_groups_by_subject() {
        let results = vec![
            result_with(Some("Physics Quiz"), 60.0, &["Kinematics"]),
            result_with(Some("Physics Quiz"), 55.0, &["Optics", "Kinematics"]),
            result_with(Some("Chemistry Quiz"), 90.0, &[]),
        ];
        let analyses = vec![analysis_with("Math", 3, &["Limits"])];
        let stored = UserWeaknesses {
            topics: vec!["Recursion".to_string()],
            count: 1,
            documents: vec![],
        };

        let profile = collect_weakness_profile(&results, &analyses, &stored);

        assert_eq!(
            profile.subjects(),
            vec!["Physics", "Chemistry", "Math", "General"]
        );
        assert_eq!(
            profile.by_subject[0].1,
            vec!["Kinematics".to_string(), "Optics".to_string()]
        );
        // Chemistry registered despite bringing no weak topics.
        assert!(profile.by_subject[1].1.is_empty());
        assert_eq!(
            profile.all_topics,
            vec!["Kinematics", "Optics", "Limits", "Recursion"]
        );
    }

    #[test]
    fn test_profile_context_lines() {
        let results = vec![result_with(Some("Physics Quiz"), 72.5, &["Kinematics", "Optics"])];
        let analyses = vec![analysis_with("Math", 3, &["Limits"])];
        let stored = UserWeaknesses::default();

        let profile = collect_weakness_profile(&results, &analyses, &stored);
        assert_eq!(
            profile.performance_context,
            vec![
                "Quiz (Physics): 72.5% score, weak in Kinematics, Optics",
                "Midterm (Math): 3 errors in Limits",
            ]
        );
    }

    #[test]
    fn test_empty_profile() {
        let profile = collect_weakness_profile(&[], &[], &UserWeaknesses::default());
        assert!(profile.is_empty());
    }

    #[test]
    fn test_resource_query_embeds_parts() {
        let query = resource_query("Recursion", "Computer Science", "beginner");
        assert!(query.contains("learning Recursion in Computer Science"));
        assert!(query.contains("beginner level"));
        assert!(query.contains("no paywalls"));
    }

    #[test]
    fn test_dedupe_drops_repeats_and_missing_urls() {
        let found = vec![
            tagged("https://a.example", "Physics"),
            tagged("", "Physics"),
            tagged("https://a.example", "Math"),
            tagged("https://b.example", "Math"),
        ];
        let unique = dedupe_by_url(found);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].material.url, "https://a.example");
        assert_eq!(unique[0].subject, "Physics");
        assert_eq!(unique[1].material.url, "https://b.example");
    }

    #[test]
    fn test_balance_caps_then_fills() {
        let mut unique = Vec::new();
        for i in 0..7 {
            unique.push(tagged(&format!("https://a{i}.example"), "Physics"));
        }
        for i in 0..2 {
            unique.push(tagged(&format!("https://b{i}.example"), "Math"));
        }
        let subjects = vec!["Physics".to_string(), "Math".to_string()];

        let balanced = balance_by_subject(&unique, &subjects);
        let urls: Vec<&str> = balanced.iter().map(|r| r.material.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://a0.example",
                "https://a1.example",
                "https://a2.example",
                "https://a3.example",
                "https://a4.example",
                "https://b0.example",
                "https://b1.example",
                "https://a5.example",
                "https://a6.example",
            ]
        );
    }

    #[test]
    fn test_balance_truncates_at_target() {
        let mut unique = Vec::new();
        let subjects: Vec<String> = (0..4).map(|s| format!("Subject{s}")).collect();
        for subject in &subjects {
            for i in 0..6 {
                unique.push(tagged(&format!("https://{subject}-{i}.example"), subject));
            }
        }
        let balanced = balance_by_subject(&unique, &subjects);
        assert_eq!(balanced.len(), RESOURCE_TARGET);
    }

    #[test]
    fn test_cache_freshness() {
        let earlier: DateTime<FixedOffset> =
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap().into();
        let later: DateTime<FixedOffset> =
            Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap().into();

        assert!(is_cache_fresh(Some(later), Some(earlier)));
        assert!(is_cache_fresh(Some(later), Some(later)));
        assert!(!is_cache_fresh(Some(earlier), Some(later)));
        assert!(!is_cache_fresh(None, Some(later)));
        assert!(!is_cache_fresh(Some(later), None));
    }

    #[test]
    fn test_tagged_resource_serializes_flat() {
        let value = serde_json::to_value(tagged("https://a.example", "Physics")).unwrap();
        assert_eq!(value["url"], "https://a.example");
        assert_eq!(value["subject"], "Physics");
        assert_eq!(value["primary_topic"], "Topic");
        assert_eq!(value["title"], "Resource https://a.example");
    }
}
