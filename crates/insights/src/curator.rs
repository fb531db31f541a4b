//! Recommended-resources curation
//!
//! Builds the per-user recommended resources payload: a weakness profile
//! from quiz and midterm history plus the stored weakness index, a
//! holistic learning-path analysis from the completion model, balanced
//! resource search per subject, and a cache row invalidated by newer
//! activity.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use studybuddy_common::clients::{CompletionModel, ResourceSearch, WeaknessStore};
use studybuddy_common::db::models::ResourcesCache;
use studybuddy_common::db::{CachedResourcesRecord, Repository};
use studybuddy_common::errors::Result;
use studybuddy_common::metrics::{record_ai_request, record_cache_event};
use tracing::{info, warn};
use uuid::Uuid;

use crate::resources::{self, TaggedResource, WeaknessProfile, TOPICS_PER_SUBJECT};

const LEARNING_PATH_TEMPERATURE: f32 = 0.6;
const LEARNING_PATH_MAX_TOKENS: u32 = 4096;
/// Topics listed per subject in the learning-path prompt
const PROMPT_TOPICS_PER_SUBJECT: usize = 10;
/// Performance-context lines in the learning-path prompt
const PROMPT_CONTEXT_LINES: usize = 10;

// Static tail of the learning-path prompt. The trailing JSON is the
// shape the model is asked to return.
const LEARNING_PATH_FOOTER: &str = r#"Provide holistic analysis:
1. How topics across different subjects relate to each other
2. Recommended learning approach that gives equal attention to all subjects
3. Overall difficulty level assessment
4. Learning path that balances all subjects

IMPORTANT: Do NOT prioritize one subject over another. Give equal importance to all subjects.

Return JSON: {"learning_path": "description covering all subjects equally", "difficulty": "beginner/intermediate/advanced", "subject_balance": "description of how to balance learning across subjects"}"#;

/// Holistic analysis extracted from the model's learning-path reply.
/// Every field defaults so a partial reply still yields usable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningAnalysis {
    #[serde(default = "default_learning_path")]
    pub learning_path: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_subject_balance")]
    pub subject_balance: String,
}

impl Default for LearningAnalysis {
    fn default() -> Self {
        Self {
            learning_path: default_learning_path(),
            difficulty: default_difficulty(),
            subject_balance: default_subject_balance(),
        }
    }
}

fn default_learning_path() -> String {
    "Focus on all weak areas across different subjects equally".to_string()
}

fn default_difficulty() -> String {
    "intermediate".to_string()
}

fn default_subject_balance() -> String {
    "Balance learning time across all subjects".to_string()
}

/// Freshly curated resources, before caching.
#[derive(Debug, Clone, Serialize)]
pub struct CuratedResources {
    pub resources: Vec<TaggedResource>,
    pub recommended_topics: Vec<String>,
    pub learning_path: String,
    pub total_weak_topics: usize,
    pub subjects_covered: Vec<String>,
}

/// Prompt asking the model to relate weak topics across subjects.
pub fn learning_path_prompt(profile: &WeaknessProfile) -> String {
    let subjects = profile.subjects().join(", ");
    let topic_lines = profile
        .by_subject
        .iter()
        .map(|(subject, topics)| {
            let listed = topics
                .iter()
                .take(PROMPT_TOPICS_PER_SUBJECT)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{subject}: {listed}")
        })
        .collect::<Vec<_>>()
        .join("\n");
    let context = profile
        .performance_context
        .iter()
        .take(PROMPT_CONTEXT_LINES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze these learning weaknesses holistically across multiple subjects: {subjects}

Weak topics by subject:
{topic_lines}

User performance context:
{context}

{LEARNING_PATH_FOOTER}"
    )
}

/// Pull the analysis object out of the model reply; anything unusable
/// falls back to the balanced defaults.
pub fn parse_learning_analysis(reply: &str) -> LearningAnalysis {
    let object_re = Regex::new(r"(?s)\{.*\}").unwrap();
    object_re
        .find(reply)
        .and_then(|found| serde_json::from_str::<LearningAnalysis>(found.as_str()).ok())
        .unwrap_or_default()
}

/// Curates recommended study resources per user, backed by the cache
/// table. Shared by the gateway handler and the refresh worker.
#[derive(Clone)]
pub struct ResourceCurator {
    repo: Repository,
    model: Arc<dyn CompletionModel>,
    search: Arc<dyn ResourceSearch>,
    weaknesses: Arc<dyn WeaknessStore>,
}

impl ResourceCurator {
    pub fn new(
        repo: Repository,
        model: Arc<dyn CompletionModel>,
        search: Arc<dyn ResourceSearch>,
        weaknesses: Arc<dyn WeaknessStore>,
    ) -> Self {
        Self {
            repo,
            model,
            search,
            weaknesses,
        }
    }

    /// The user's cache row, if it is still newer than their latest
    /// activity. A stale or missing row returns `None`.
    pub async fn fresh_cache(&self, user_id: Uuid) -> Result<Option<ResourcesCache>> {
        let row = match self.repo.get_resources_cache(user_id).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        let latest = self.repo.latest_activity_at(user_id).await?;
        if resources::is_cache_fresh(row.data_timestamp, latest) {
            record_cache_event("hit");
            info!(user_id = %user_id, "Returning cached resources (no new data since cache)");
            Ok(Some(row))
        } else {
            record_cache_event("stale");
            info!(user_id = %user_id, "Cache exists but new data found, regenerating resources");
            Ok(None)
        }
    }

    /// Rebuild the full resource set from current history and cache it.
    /// Returns `None` when the user has no identified weaknesses.
    pub async fn rebuild(&self, user_id: Uuid) -> Result<Option<CuratedResources>> {
        let results = self.repo.list_quiz_results(user_id).await?;
        let analyses = self.repo.list_midterm_analyses(user_id).await?;
        let stored = self.weaknesses.get_weaknesses(&user_id.to_string()).await;

        let profile = resources::collect_weakness_profile(&results, &analyses, &stored);
        if profile.is_empty() {
            return Ok(None);
        }

        let analysis = self.learning_analysis(&profile).await;
        let found = self.search_by_subject(&profile, &analysis.difficulty).await;
        let deduped = resources::dedupe_by_url(found);
        let balanced = resources::balance_by_subject(&deduped, &profile.subjects());

        let curated = CuratedResources {
            resources: balanced,
            recommended_topics: profile.all_topics.clone(),
            learning_path: analysis.learning_path,
            total_weak_topics: profile.all_topics.len(),
            subjects_covered: profile.subjects(),
        };

        self.cache(user_id, &curated).await?;
        record_cache_event("rebuild");
        info!(
            user_id = %user_id,
            resources = curated.resources.len(),
            subjects = curated.subjects_covered.len(),
            "Curated recommended resources"
        );
        Ok(Some(curated))
    }

    async fn learning_analysis(&self, profile: &WeaknessProfile) -> LearningAnalysis {
        let prompt = learning_path_prompt(profile);
        let started = Instant::now();
        match self
            .model
            .complete(
                &prompt,
                None,
                LEARNING_PATH_TEMPERATURE,
                LEARNING_PATH_MAX_TOKENS,
            )
            .await
        {
            Ok(reply) => {
                record_ai_request("completion", started.elapsed().as_secs_f64(), true);
                parse_learning_analysis(&reply)
            }
            Err(err) => {
                record_ai_request("completion", started.elapsed().as_secs_f64(), false);
                warn!(error = %err, "Learning path analysis failed, using balanced defaults");
                LearningAnalysis::default()
            }
        }
    }

    /// Search resources subject by subject, capped so no subject can
    /// crowd out the others.
    async fn search_by_subject(
        &self,
        profile: &WeaknessProfile,
        difficulty: &str,
    ) -> Vec<TaggedResource> {
        let quota = resources::subject_quota(profile.by_subject.len());
        let mut found: Vec<TaggedResource> = Vec::new();

        for (subject, topics) in &profile.by_subject {
            if topics.is_empty() {
                continue;
            }

            let searchable = &topics[..topics.len().min(TOPICS_PER_SUBJECT)];
            let per_topic = resources::per_topic_results(quota, searchable.len());
            let mut subject_count = 0usize;

            for topic in searchable {
                let query = resources::resource_query(topic, subject, difficulty);
                let materials = self.search.search_materials(&query, per_topic).await;
                subject_count += materials.len();
                for material in materials {
                    found.push(TaggedResource {
                        material,
                        primary_topic: topic.clone(),
                        subject: subject.clone(),
                    });
                }
                if subject_count >= quota {
                    break;
                }
            }
        }

        found
    }

    async fn cache(&self, user_id: Uuid, curated: &CuratedResources) -> Result<()> {
        // Without any activity there is no timestamp to invalidate
        // against, so the row is not written.
        let latest = match self.repo.latest_activity_at(user_id).await? {
            Some(latest) => latest,
            None => return Ok(()),
        };

        let record = CachedResourcesRecord {
            resources: serde_json::to_value(&curated.resources)?,
            recommended_topics: serde_json::to_value(&curated.recommended_topics)?,
            learning_path: curated.learning_path.clone(),
            total_weak_topics: curated.total_weak_topics as i32,
            data_timestamp: Some(latest.with_timezone(&Utc)),
        };
        self.repo.upsert_resources_cache(user_id, record).await
    }
}

/// Response payload served from a fresh cache row.
pub fn cached_payload(row: &ResourcesCache) -> Value {
    json!({
        "resources": row.resources,
        "recommended_topics": row.recommended_topics,
        "learning_path": row.learning_path,
        "total_weak_topics": row.total_weak_topics,
        "cached": true,
        "cached_at": row.cached_at,
    })
}

/// Response payload for a freshly rebuilt resource set.
pub fn rebuilt_payload(curated: &CuratedResources) -> Value {
    json!({
        "resources": curated.resources,
        "recommended_topics": curated.recommended_topics,
        "learning_path": curated.learning_path,
        "total_weak_topics": curated.total_weak_topics,
        "subjects_covered": curated.subjects_covered,
        "cached": false,
    })
}

/// Response payload for a user with no identified weaknesses.
pub fn no_weaknesses_payload() -> Value {
    json!({
        "resources": [],
        "recommended_topics": [],
        "message": "No weak areas identified yet. Keep learning!",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use studybuddy_common::clients::StudyMaterial;

    fn profile() -> WeaknessProfile {
        let mut profile = WeaknessProfile::default();
        profile.add_topics(
            "Physics",
            &["Optics".to_string(), "Thermodynamics".to_string()],
        );
        profile.add_topics("Math", &["Calculus".to_string()]);
        profile
            .performance_context
            .push("Quiz (Physics): 55% score, weak in Optics".to_string());
        profile
    }

    #[test]
    fn test_learning_path_prompt_contents() {
        let prompt = learning_path_prompt(&profile());
        assert!(prompt.starts_with(
            "Analyze these learning weaknesses holistically across multiple subjects: Physics, Math"
        ));
        assert!(prompt.contains("Physics: Optics, Thermodynamics"));
        assert!(prompt.contains("Math: Calculus"));
        assert!(prompt.contains("Quiz (Physics): 55% score, weak in Optics"));
        assert!(prompt.contains("IMPORTANT: Do NOT prioritize one subject over another."));
        assert!(prompt.contains("Return JSON: {\"learning_path\""));
    }

    #[test]
    fn test_learning_path_prompt_caps_topics() {
        let mut profile = WeaknessProfile::default();
        let topics: Vec<String> = (0..12).map(|i| format!("Topic{i}")).collect();
        profile.add_topics("Physics", &topics);

        let prompt = learning_path_prompt(&profile);
        assert!(prompt.contains("Topic9"));
        assert!(!prompt.contains("Topic10"));
    }

    #[test]
    fn test_parse_learning_analysis_from_prose() {
        let reply = "Here you go:\n{\"learning_path\": \"Alternate subjects daily\", \"difficulty\": \"advanced\", \"subject_balance\": \"Equal split\"}\nGood luck!";
        let analysis = parse_learning_analysis(reply);
        assert_eq!(analysis.learning_path, "Alternate subjects daily");
        assert_eq!(analysis.difficulty, "advanced");
        assert_eq!(analysis.subject_balance, "Equal split");
    }

    #[test]
    fn test_parse_learning_analysis_partial_object() {
        let analysis = parse_learning_analysis("{\"difficulty\": \"beginner\"}");
        assert_eq!(analysis.difficulty, "beginner");
        assert_eq!(
            analysis.learning_path,
            "Focus on all weak areas across different subjects equally"
        );
        assert_eq!(
            analysis.subject_balance,
            "Balance learning time across all subjects"
        );
    }

    #[test]
    fn test_parse_learning_analysis_unusable_reply() {
        assert_eq!(
            parse_learning_analysis("no json at all"),
            LearningAnalysis::default()
        );
        assert_eq!(
            parse_learning_analysis("{broken json}"),
            LearningAnalysis::default()
        );
    }

    #[test]
    fn test_cached_payload_shape() {
        let row = ResourcesCache {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            resources: json!([{"title": "Optics course"}]),
            recommended_topics: json!(["Optics"]),
            learning_path: "Review fundamentals".to_string(),
            total_weak_topics: 1,
            cached_at: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap().into(),
            data_timestamp: None,
        };

        let payload = cached_payload(&row);
        assert_eq!(payload["cached"], true);
        assert_eq!(payload["resources"][0]["title"], "Optics course");
        assert_eq!(payload["total_weak_topics"], 1);
        assert!(payload.get("subjects_covered").is_none());
        assert!(payload["cached_at"].as_str().is_some());
    }

    #[test]
    fn test_rebuilt_payload_shape() {
        let curated = CuratedResources {
            resources: vec![TaggedResource {
                material: StudyMaterial {
                    title: "Optics course".to_string(),
                    description: "Free video series".to_string(),
                    url: "https://example.com/optics".to_string(),
                    source: None,
                },
                primary_topic: "Optics".to_string(),
                subject: "Physics".to_string(),
            }],
            recommended_topics: vec!["Optics".to_string()],
            learning_path: "Review fundamentals".to_string(),
            total_weak_topics: 1,
            subjects_covered: vec!["Physics".to_string()],
        };

        let payload = rebuilt_payload(&curated);
        assert_eq!(payload["cached"], false);
        assert_eq!(payload["resources"][0]["subject"], "Physics");
        assert_eq!(payload["resources"][0]["title"], "Optics course");
        assert_eq!(payload["subjects_covered"], json!(["Physics"]));
    }

    #[test]
    fn test_no_weaknesses_payload_message() {
        let payload = no_weaknesses_payload();
        assert_eq!(payload["resources"], json!([]));
        assert_eq!(
            payload["message"],
            "No weak areas identified yet. Keep learning!"
        );
    }
}
