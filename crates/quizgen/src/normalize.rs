//! Question validation and option shuffling
//!
//! Parsed replies carry whatever shape the model felt like producing.
//! Normalization turns them into well-formed questions, dropping entries
//! that cannot be repaired, and shuffling shifts correct answers off the
//! position the model favored.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Questions with less text than this are dropped as junk
const MIN_QUESTION_CHARS: usize = 10;

/// A single answer choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
}

/// A validated quiz question in the shape the API serves and stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<QuizOption>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Validate parsed questions into the served shape.
///
/// Keeps a question when it has usable text (under `text` or `question`)
/// and at least two options after per-option cleanup. Dict options keep
/// their ids, string options get positional letter ids, anything else is
/// dropped. Missing answers default to the first option; missing topics
/// get `fallback_topic`.
pub fn normalize_questions(items: &[Value], fallback_topic: &str) -> Vec<QuizQuestion> {
    let mut validated = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let text = string_of(item.get("text"))
            .or_else(|| string_of(item.get("question")))
            .unwrap_or_default();
        let text = text.trim();
        if text.chars().count() < MIN_QUESTION_CHARS {
            warn!(question = index + 1, "Dropping question with missing or too short text");
            continue;
        }

        let Some(raw_options) = item.get("options").and_then(Value::as_array) else {
            warn!(question = index + 1, "Dropping question without an options array");
            continue;
        };

        let mut options: Vec<QuizOption> = Vec::new();
        for raw in raw_options {
            match raw {
                Value::Object(opt) => {
                    if !opt.contains_key("text") && !opt.contains_key("id") {
                        continue;
                    }
                    let id = string_of(opt.get("id"))
                        .unwrap_or_else(|| option_letter(options.len()));
                    let text = string_of(opt.get("text"))
                        .or_else(|| string_of(opt.get("id")))
                        .unwrap_or_else(|| format!("Option {}", id.to_uppercase()));
                    options.push(QuizOption { id, text });
                }
                Value::String(s) => {
                    options.push(QuizOption {
                        id: option_letter(options.len()),
                        text: s.clone(),
                    });
                }
                _ => {}
            }
        }
        if options.len() < 2 {
            warn!(question = index + 1, "Dropping question with fewer than two usable options");
            continue;
        }

        let correct_answer = string_of(item.get("correctAnswer"))
            .or_else(|| string_of(item.get("correct_answer")))
            .unwrap_or_else(|| options[0].id.clone());
        let id = id_of(item.get("id")).unwrap_or_else(|| (validated.len() + 1).to_string());
        let topic = string_of(item.get("topic")).unwrap_or_else(|| fallback_topic.to_string());

        validated.push(QuizQuestion {
            id,
            text: text.to_string(),
            options,
            correct_answer,
            explanation: string_of(item.get("explanation")).unwrap_or_default(),
            topic,
            image_url: None,
        });
    }

    debug!(
        kept = validated.len(),
        parsed = items.len(),
        "Validated questions after cleaning"
    );
    validated
}

/// Shuffle answer positions so the correct option is not always where the
/// model put it. Option ids are reassigned a, b, c... by new position and
/// the stored answer follows the moved option. Questions whose answer does
/// not name an option are left untouched.
pub fn randomize_options(questions: &mut [QuizQuestion]) {
    let mut rng = rand::thread_rng();

    for question in questions.iter_mut() {
        if question.options.len() < 2 {
            continue;
        }
        let original = question.correct_answer.clone();
        if !question.options.iter().any(|o| o.id == original) {
            continue;
        }

        question.options.shuffle(&mut rng);
        let Some(new_index) = question.options.iter().position(|o| o.id == original) else {
            continue;
        };
        for (index, option) in question.options.iter_mut().enumerate() {
            option.id = option_letter(index);
        }
        question.correct_answer = option_letter(new_index);
    }
}

/// The stand-in served when a reply yields no usable questions at all.
pub fn placeholder_question(topic: Option<&str>) -> QuizQuestion {
    QuizQuestion {
        id: "1".to_string(),
        text: format!("Test question about {}", topic.unwrap_or("general topic")),
        options: default_options(),
        correct_answer: "a".to_string(),
        explanation: "This is a placeholder question".to_string(),
        topic: topic.unwrap_or("General").to_string(),
        image_url: None,
    }
}

/// Per-topic stand-ins for the error quiz, one per requested topic.
pub fn placeholder_questions(topics: &[String], num_questions: usize) -> Vec<QuizQuestion> {
    topics
        .iter()
        .take(num_questions)
        .enumerate()
        .map(|(index, topic)| QuizQuestion {
            id: (index + 1).to_string(),
            text: format!("Test question about {topic}"),
            options: default_options(),
            correct_answer: "a".to_string(),
            explanation: format!("This is a placeholder question about {topic}"),
            topic: topic.clone(),
            image_url: None,
        })
        .collect()
}

/// Top up a holistic quiz to exactly `num_questions`, cycling through the
/// weak topics for the filler entries. Holistic questions stay as raw JSON
/// because their shape differs from the standard quiz.
pub fn pad_rag_questions(questions: &mut Vec<Value>, topics: &[String], num_questions: usize) {
    while questions.len() < num_questions {
        let index = questions.len();
        let topic = if topics.is_empty() {
            "General".to_string()
        } else {
            topics[index % topics.len()].clone()
        };
        questions.push(json!({
            "id": format!("q{}", index + 1),
            "question": format!("Test your understanding of {topic}"),
            "options": ["Option A", "Option B", "Option C", "Option D"],
            "correctAnswer": "Option A",
            "topic": topic,
            "difficulty": "medium",
            "explanation": format!("This question tests your knowledge of {topic}"),
        }));
    }
    questions.truncate(num_questions);
}

fn default_options() -> Vec<QuizOption> {
    ["a", "b", "c", "d"]
        .iter()
        .zip(["Option A", "Option B", "Option C", "Option D"])
        .map(|(id, text)| QuizOption {
            id: id.to_string(),
            text: text.to_string(),
        })
        .collect()
}

fn option_letter(index: usize) -> String {
    if index < 26 {
        ((b'a' + index as u8) as char).to_string()
    } else {
        index.to_string()
    }
}

fn string_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

// Models sometimes emit numeric ids; keep them as strings.
fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_accepts_well_formed_question() {
        let items = vec![json!({
            "id": "1",
            "text": "What is the time complexity of merge sort?",
            "options": [
                {"id": "a", "text": "O(n)"},
                {"id": "b", "text": "O(n log n)"},
            ],
            "correctAnswer": "b",
            "explanation": "Divide and conquer",
            "topic": "Sorting",
        })];
        let questions = normalize_questions(&items, "General");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer, "b");
        assert_eq!(questions[0].topic, "Sorting");
    }

    #[test]
    fn test_normalize_drops_short_text() {
        let items = vec![
            json!({"text": "Too short", "options": ["x", "y"]}),
            json!({"text": "This one is long enough to keep", "options": ["x", "y"]}),
        ];
        let questions = normalize_questions(&items, "General");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "This one is long enough to keep");
    }

    #[test]
    fn test_normalize_accepts_question_key() {
        let items = vec![json!({
            "question": "Which structure backs breadth-first search?",
            "options": ["Queue", "Stack"],
        })];
        let questions = normalize_questions(&items, "Graphs");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "Which structure backs breadth-first search?");
    }

    #[test]
    fn test_normalize_string_options_get_letter_ids() {
        let items = vec![json!({
            "text": "Which structure backs breadth-first search?",
            "options": ["Queue", "Stack", "Heap"],
        })];
        let questions = normalize_questions(&items, "Graphs");
        let ids: Vec<&str> = questions[0].options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(questions[0].options[0].text, "Queue");
        // No answer given: defaults to the first option
        assert_eq!(questions[0].correct_answer, "a");
    }

    #[test]
    fn test_normalize_option_without_text_uses_id() {
        let items = vec![json!({
            "text": "Pick the letter b if you can see it",
            "options": [{"id": "a", "text": "Visible text"}, {"id": "b"}],
        })];
        let questions = normalize_questions(&items, "General");
        assert_eq!(questions[0].options[1].text, "b");
    }

    #[test]
    fn test_normalize_drops_insufficient_options() {
        let items = vec![json!({
            "text": "A question that has only one usable option",
            "options": [{"id": "a", "text": "Lonely"}, 42],
        })];
        let questions = normalize_questions(&items, "General");
        assert!(questions.is_empty());
    }

    #[test]
    fn test_normalize_assigns_sequential_ids() {
        let items = vec![
            json!({"text": "short", "options": ["x", "y"]}),
            json!({"text": "First question that is long enough", "options": ["x", "y"]}),
            json!({"text": "Second question that is long enough", "options": ["x", "y"]}),
        ];
        let questions = normalize_questions(&items, "General");
        assert_eq!(questions[0].id, "1");
        assert_eq!(questions[1].id, "2");
    }

    #[test]
    fn test_normalize_keeps_numeric_id() {
        let items = vec![json!({
            "id": 4,
            "text": "A question carrying a numeric id value",
            "options": ["x", "y"],
        })];
        let questions = normalize_questions(&items, "General");
        assert_eq!(questions[0].id, "4");
    }

    #[test]
    fn test_normalize_snake_case_correct_answer() {
        let items = vec![json!({
            "text": "A question using the snake case answer key",
            "options": [{"id": "a", "text": "X"}, {"id": "b", "text": "Y"}],
            "correct_answer": "b",
        })];
        let questions = normalize_questions(&items, "General");
        assert_eq!(questions[0].correct_answer, "b");
    }

    #[test]
    fn test_randomize_keeps_answer_on_moved_option() {
        let mut questions = vec![QuizQuestion {
            id: "1".to_string(),
            text: "Which option is right?".to_string(),
            options: vec![
                QuizOption { id: "a".to_string(), text: "Wrong one".to_string() },
                QuizOption { id: "b".to_string(), text: "Right one".to_string() },
                QuizOption { id: "c".to_string(), text: "Also wrong".to_string() },
                QuizOption { id: "d".to_string(), text: "Not this".to_string() },
            ],
            correct_answer: "b".to_string(),
            explanation: String::new(),
            topic: "General".to_string(),
            image_url: None,
        }];

        randomize_options(&mut questions);

        let q = &questions[0];
        let ids: Vec<&str> = q.options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        let correct = q.options.iter().find(|o| o.id == q.correct_answer).unwrap();
        assert_eq!(correct.text, "Right one");
    }

    #[test]
    fn test_randomize_skips_unmatched_answer() {
        let mut questions = vec![QuizQuestion {
            id: "1".to_string(),
            text: "Whose answer id is bogus?".to_string(),
            options: vec![
                QuizOption { id: "a".to_string(), text: "First".to_string() },
                QuizOption { id: "b".to_string(), text: "Second".to_string() },
            ],
            correct_answer: "z".to_string(),
            explanation: String::new(),
            topic: "General".to_string(),
            image_url: None,
        }];

        randomize_options(&mut questions);

        assert_eq!(questions[0].correct_answer, "z");
        assert_eq!(questions[0].options[0].text, "First");
        assert_eq!(questions[0].options[1].text, "Second");
    }

    #[test]
    fn test_placeholder_question_shape() {
        let q = placeholder_question(Some("Graphs"));
        assert_eq!(q.id, "1");
        assert_eq!(q.text, "Test question about Graphs");
        assert_eq!(q.options.len(), 4);
        assert_eq!(q.correct_answer, "a");
        assert_eq!(q.topic, "Graphs");

        let fallback = placeholder_question(None);
        assert_eq!(fallback.text, "Test question about general topic");
        assert_eq!(fallback.topic, "General");
    }

    #[test]
    fn test_placeholder_questions_one_per_topic() {
        let topics = vec!["Sorting".to_string(), "Graphs".to_string(), "Heaps".to_string()];
        let questions = placeholder_questions(&topics, 2);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].id, "2");
        assert_eq!(questions[1].explanation, "This is a placeholder question about Graphs");
    }

    #[test]
    fn test_pad_rag_questions_cycles_topics() {
        let topics = vec!["Sorting".to_string(), "Graphs".to_string()];
        let mut questions = vec![json!({"id": "q1", "question": "existing"})];
        pad_rag_questions(&mut questions, &topics, 4);

        assert_eq!(questions.len(), 4);
        assert_eq!(questions[1]["id"], "q2");
        assert_eq!(questions[1]["topic"], "Graphs");
        assert_eq!(questions[2]["topic"], "Sorting");
        assert_eq!(questions[3]["question"], "Test your understanding of Graphs");
        assert_eq!(questions[3]["correctAnswer"], "Option A");
    }

    #[test]
    fn test_pad_rag_questions_truncates_extra() {
        let mut questions = vec![
            json!({"id": "q1"}),
            json!({"id": "q2"}),
            json!({"id": "q3"}),
        ];
        pad_rag_questions(&mut questions, &[], 2);
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn test_question_serializes_camel_case() {
        let q = placeholder_question(Some("Graphs"));
        let value = serde_json::to_value(&q).unwrap();
        assert_eq!(value["correctAnswer"], "a");
        assert!(value.get("imageUrl").is_none());
        assert!(value.get("correct_answer").is_none());
    }
}
