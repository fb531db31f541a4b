//! Material upload and topic extraction handler

use axum::extract::{Multipart, State};
use axum::Json;
use regex_lite::Regex;
use serde_json::{json, Value};

use crate::handlers::{read_upload_form, timed_completion, timed_extraction};
use crate::AppState;
use studybuddy_common::auth::AuthContext;
use studybuddy_common::clients::validate_extension;
use studybuddy_common::db::{NewUploadedMaterial, Repository};
use studybuddy_common::errors::Result;
use studybuddy_quizgen::prompts::{clip, topic_extraction_prompt};

const EXTRACTION_TEMPERATURE: f32 = 0.3;
const EXTRACTION_MAX_TOKENS: u32 = 4096;

/// Topics returned per material
const MAX_TOPICS: usize = 5;
/// Stored preview of the extracted text
const STORED_TEXT_CHARS: usize = 1_000;
/// Text window scanned by the keyword fallback
const FALLBACK_TEXT_CHARS: usize = 500;

const ALGORITHM_WORDS: &[&str] = &[
    "algorithm",
    "data structure",
    "tree",
    "graph",
    "sort",
    "binary",
    "merge",
    "dfs",
    "bfs",
];
const CHEMISTRY_WORDS: &[&str] = &["chemical", "reaction", "molecule", "compound"];
const PHYSICS_WORDS: &[&str] = &[
    "force",
    "energy",
    "motion",
    "physics",
    "velocity",
    "acceleration",
];
const PROGRAMMING_WORDS: &[&str] = &[
    "loop",
    "function",
    "variable",
    "class",
    "python",
    "java",
    "programming",
];
const EXAM_WORDS: &[&str] = &["midterm", "exam", "test", "quiz", "cs", "computer science"];

/// Extract the subject and key topics from an uploaded study material.
/// OCR and model failures degrade to keyword inference so an upload
/// always yields a usable subject.
pub async fn extract_topics(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let upload = read_upload_form(multipart).await?;
    auth.ensure_user(upload.user_id)?;
    tracing::info!(
        filename = %upload.filename,
        size = upload.content.len(),
        "Extracting topics from material"
    );

    let file_type = validate_extension(&upload.filename)?;
    let file_size = upload.content.len() as i64;

    let extracted_text = match timed_extraction(
        state.extractor.as_ref(),
        &upload.filename,
        upload.content,
    )
    .await
    {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(error = %err, "OCR extraction failed");
            String::new()
        }
    };

    let prompt = topic_extraction_prompt(&extracted_text);
    let reply = match timed_completion(
        state.model.as_ref(),
        &prompt,
        EXTRACTION_TEMPERATURE,
        EXTRACTION_MAX_TOKENS,
    )
    .await
    {
        Ok(reply) => reply,
        Err(err) => {
            tracing::error!(error = %err, "Topic extraction model call failed");
            String::new()
        }
    };

    let (subject, topics) = if reply.trim().is_empty() {
        tracing::warn!("Empty extraction reply, using keyword fallback");
        (
            infer_subject_from_text(&extracted_text, &upload.filename),
            Vec::new(),
        )
    } else {
        parse_extraction_reply(&reply)
    };
    tracing::info!(subject = %subject, topics = ?topics, "Extracted subject and topics");

    // Keep a record of the material; extraction still succeeds when the
    // insert fails
    let repo = Repository::new(state.db.clone());
    if let Err(err) = repo
        .save_uploaded_material(
            upload.user_id,
            NewUploadedMaterial {
                filename: upload.filename.clone(),
                file_type,
                file_size,
                extracted_text: clip(&extracted_text, STORED_TEXT_CHARS).to_string(),
                topics: json!(topics),
                subject: Some(subject.clone()),
            },
        )
        .await
    {
        tracing::warn!(error = %err, "Failed to store uploaded material");
    }

    Ok(Json(json!({"topics": topics, "subject": subject})))
}

/// Pull `{subject, topics}` out of a model reply, salvaging what the
/// strict JSON pass misses.
fn parse_extraction_reply(reply: &str) -> (String, Vec<String>) {
    let mut subject = "General".to_string();
    let mut topics: Vec<String> = Vec::new();

    let object_re = Regex::new(r#"(?s)\{.*?"subject".*?"topics".*?\}"#).unwrap();
    if let Some(found) = object_re.find(reply) {
        if let Some((parsed_subject, parsed_topics)) = parse_extraction_object(found.as_str()) {
            subject = parsed_subject;
            topics = parsed_topics;
        }
    }

    if topics.is_empty() {
        topics = salvage_topics(reply);
    }
    if subject == "General" {
        if let Some(found) = salvage_subject(reply) {
            subject = found;
        }
    }
    topics.truncate(MAX_TOPICS);

    (clean_subject(&subject, &topics), topics)
}

fn parse_extraction_object(json_str: &str) -> Option<(String, Vec<String>)> {
    let parsed: Value = serde_json::from_str(json_str)
        .or_else(|_| serde_json::from_str(&strip_trailing_commas(json_str)))
        .ok()?;

    let subject = parsed
        .get("subject")
        .and_then(Value::as_str)
        .unwrap_or("General")
        .to_string();
    let topics = parsed
        .get("topics")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Some((subject, topics))
}

fn strip_trailing_commas(json_str: &str) -> String {
    let trailing = Regex::new(r",(\s*[}\]])").unwrap();
    trailing.replace_all(json_str, "$1").into_owned()
}

/// Topics from the first bracketed list, else the reply's leading lines
fn salvage_topics(reply: &str) -> Vec<String> {
    let list_re = Regex::new(r"\[(.*?)\]").unwrap();
    if let Some(captures) = list_re.captures(reply) {
        let quoted = Regex::new(r#""([^"]+)""#).unwrap();
        return quoted
            .captures_iter(captures.get(1).map(|m| m.as_str()).unwrap_or_default())
            .map(|c| c[1].to_string())
            .collect();
    }

    reply
        .lines()
        .take(5)
        .map(|line| line.trim().trim_matches('-').trim_matches('*').trim())
        .filter(|line| !line.is_empty() && line.chars().count() < 50)
        .map(str::to_string)
        .collect()
}

/// Subject patterns scanned when the JSON object carried none
fn salvage_subject(reply: &str) -> Option<String> {
    let quoted = Regex::new(r#"(?i)"subject"\s*:\s*"([^"]+)""#).unwrap();
    if let Some(captures) = quoted.captures(reply) {
        return Some(captures[1].trim().to_string());
    }

    let labeled = Regex::new(r"(?i)subject[:\s]+([A-Z][^,\n]+)").unwrap();
    labeled
        .captures(reply)
        .map(|captures| captures[1].trim().to_string())
}

/// Strip quoting; a too-short subject gets inferred from the first topic
fn clean_subject(subject: &str, topics: &[String]) -> String {
    let cleaned = subject.trim().trim_matches('"').trim_matches('\'').trim();
    if cleaned.chars().count() >= 2 {
        return cleaned.to_string();
    }

    let Some(first_topic) = topics.first() else {
        return "General".to_string();
    };
    let topic_lower = first_topic.to_lowercase();
    if contains_any(
        &topic_lower,
        &["algorithm", "data structure", "tree", "graph", "sort"],
    ) {
        "Data Structures & Algorithms".to_string()
    } else if contains_any(&topic_lower, &["loop", "function", "variable", "class"]) {
        "Programming Fundamentals".to_string()
    } else if contains_any(&topic_lower, &["chemical", "reaction", "molecule"]) {
        "Chemistry".to_string()
    } else if contains_any(&topic_lower, &["force", "energy", "motion", "physics"]) {
        "Physics".to_string()
    } else {
        "General".to_string()
    }
}

/// Infer a subject from the raw material text when the model gave nothing
fn infer_subject_from_text(extracted_text: &str, filename: &str) -> String {
    if extracted_text.is_empty() {
        return "General".to_string();
    }

    let text_lower = clip(extracted_text, FALLBACK_TEXT_CHARS).to_lowercase();
    if contains_any(&text_lower, ALGORITHM_WORDS) {
        "Data Structures & Algorithms".to_string()
    } else if contains_any(&text_lower, CHEMISTRY_WORDS) {
        "Chemistry".to_string()
    } else if contains_any(&text_lower, PHYSICS_WORDS) {
        "Physics".to_string()
    } else if contains_any(&text_lower, PROGRAMMING_WORDS) {
        "Programming Fundamentals".to_string()
    } else if contains_any(&text_lower, EXAM_WORDS) {
        let filename_lower = filename.to_lowercase();
        if filename_lower.contains("cs") || filename_lower.contains("computer science") {
            "Computer Science".to_string()
        } else if filename_lower.contains("math") {
            "Mathematics".to_string()
        } else {
            "General".to_string()
        }
    } else {
        "General".to_string()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_reply_clean_json() {
        let reply = r#"{"subject": "Chemistry", "topics": ["Stoichiometry", "Acids", "Bases"]}"#;
        let (subject, topics) = parse_extraction_reply(reply);

        assert_eq!(subject, "Chemistry");
        assert_eq!(topics, vec!["Stoichiometry", "Acids", "Bases"]);
    }

    #[test]
    fn test_parse_extraction_reply_repairs_trailing_commas() {
        let reply = r#"{"subject": "Physics", "topics": ["Forces", "Energy",]}"#;
        let (subject, topics) = parse_extraction_reply(reply);

        assert_eq!(subject, "Physics");
        assert_eq!(topics, vec!["Forces", "Energy"]);
    }

    #[test]
    fn test_parse_extraction_reply_limits_topics() {
        let reply = r#"{"subject": "Math", "topics": ["A", "B", "C", "D", "E", "F", "G"]}"#;
        let (_, topics) = parse_extraction_reply(reply);

        assert_eq!(topics.len(), 5);
    }

    #[test]
    fn test_salvage_topics_from_bracketed_list() {
        let reply = r#"Here are the topics: ["Loops", "Functions", "Classes"] as requested"#;
        let topics = salvage_topics(reply);

        assert_eq!(topics, vec!["Loops", "Functions", "Classes"]);
    }

    #[test]
    fn test_salvage_topics_from_lines() {
        let reply = "- Recursion\n- Backtracking\nA very long explanatory line that runs well past the fifty character limit\n";
        let topics = salvage_topics(reply);

        assert_eq!(topics, vec!["Recursion", "Backtracking"]);
    }

    #[test]
    fn test_salvage_subject_from_label() {
        let reply = "The subject: Organic Chemistry, with five topics below";
        assert_eq!(salvage_subject(reply).as_deref(), Some("Organic Chemistry"));
    }

    #[test]
    fn test_clean_subject_infers_from_first_topic() {
        let topics = vec!["Merge Sort".to_string()];
        assert_eq!(clean_subject("", &topics), "Data Structures & Algorithms");

        let topics = vec!["While Loops".to_string()];
        assert_eq!(clean_subject("?", &topics), "Programming Fundamentals");
    }

    #[test]
    fn test_infer_subject_from_text_branches() {
        assert_eq!(
            infer_subject_from_text("binary trees and graph traversal", "notes.pdf"),
            "Data Structures & Algorithms"
        );
        assert_eq!(
            infer_subject_from_text("balancing a chemical reaction", "lab.pdf"),
            "Chemistry"
        );
        assert_eq!(
            infer_subject_from_text("midterm exam answers", "cs101-midterm.pdf"),
            "Computer Science"
        );
        assert_eq!(infer_subject_from_text("", "anything.pdf"), "General");
    }
}
