//! Completion reply parsing
//!
//! Replies are supposed to be bare JSON but routinely arrive fenced in
//! markdown, wrapped in prose, or truncated mid-array when the token
//! budget runs out. Parsing walks progressively more tolerant strategies
//! and keeps whatever recovers the most questions instead of failing the
//! request.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Minimum length for a bracketed candidate to be worth parsing
const MIN_ARRAY_CHARS: usize = 100;

/// Extract quiz questions from a model reply.
///
/// Returns raw JSON objects; shape validation happens in
/// [`crate::normalize::normalize_questions`]. An empty vec means nothing
/// usable was found and the caller should fall back to placeholders.
pub fn parse_quiz_questions(reply: &str) -> Vec<Value> {
    // Fenced code block first
    let fenced = Regex::new(r"(?s)```(?:json)?\s*(\[.*?\])\s*```").unwrap();
    if let Some(caps) = fenced.captures(reply) {
        if let Some(m) = caps.get(1) {
            if let Ok(Value::Array(items)) = serde_json::from_str(m.as_str()) {
                if !items.is_empty() {
                    debug!(count = items.len(), "Parsed questions from fenced block");
                    return items;
                }
            }
        }
    }

    // Scan every '[' for a balanced array and keep whichever candidate
    // yields the most questions
    let mut best: Vec<Value> = Vec::new();
    for (start, _) in reply.char_indices().filter(|(_, c)| *c == '[') {
        let Some(end) = balanced_span(reply, start, b'[', b']') else {
            continue;
        };
        let candidate = &reply[start..=end];
        if candidate.len() <= MIN_ARRAY_CHARS {
            continue;
        }
        let parsed = match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Array(items)) => items,
            _ => match serde_json::from_str::<Value>(&repair_json(candidate)) {
                Ok(Value::Array(items)) => items,
                _ => salvage_questions(candidate),
            },
        };
        if parsed.len() > best.len() {
            best = parsed;
        }
    }
    if !best.is_empty() {
        debug!(count = best.len(), "Parsed questions from JSON array");
        return best;
    }

    // Greedy span from the first '[' to the last ']' covers replies where
    // bracket balance is off
    let greedy = Regex::new(r"(?s)(\[.{100,}\])").unwrap();
    if let Some(caps) = greedy.captures(reply) {
        if let Some(m) = caps.get(1) {
            let raw = m.as_str();
            if let Ok(Value::Array(items)) = serde_json::from_str(raw) {
                if !items.is_empty() {
                    return items;
                }
            }
            if let Ok(Value::Array(items)) = serde_json::from_str(&repair_json(raw)) {
                if !items.is_empty() {
                    return items;
                }
            }
            let salvaged = salvage_questions(raw);
            if !salvaged.is_empty() {
                debug!(count = salvaged.len(), "Salvaged questions from broken array");
                return salvaged;
            }
        }
    }

    // Object wrapping a questions array
    let object = Regex::new(r#"(?s)(\{.*?"questions".*?\})"#).unwrap();
    if let Some(caps) = object.captures(reply) {
        if let Some(m) = caps.get(1) {
            if let Ok(value) = serde_json::from_str::<Value>(m.as_str()) {
                if let Some(items) = value.get("questions").and_then(Value::as_array) {
                    if !items.is_empty() {
                        return items.clone();
                    }
                }
            }
        }
    }

    // Last resort: salvage whatever complete objects exist anywhere in the
    // reply, which handles arrays truncated before the closing bracket
    let salvaged = salvage_questions(reply);
    if salvaged.is_empty() {
        warn!(
            reply_len = reply.len(),
            "Could not parse any quiz questions from reply"
        );
    }
    salvaged
}

/// Repair the JSON damage models most often produce: raw newlines inside
/// string literals, // comments, and trailing commas.
pub(crate) fn repair_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
            } else {
                match c {
                    '\\' => {
                        out.push(c);
                        escaped = true;
                    }
                    '"' => {
                        out.push(c);
                        in_string = false;
                    }
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    _ => out.push(c),
                }
            }
        } else if c == '"' {
            out.push(c);
            in_string = true;
        } else if c == '/' && chars.peek() == Some(&'/') {
            while chars.peek().is_some_and(|&next| next != '\n') {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }

    let trailing_comma = Regex::new(r",(\s*[}\]])").unwrap();
    trailing_comma.replace_all(&out, "$1").into_owned()
}

/// Walk a balanced bracket span starting at `start`, skipping brackets
/// inside string literals. Returns the byte index of the closing bracket.
fn balanced_span(text: &str, start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in text.as_bytes()[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

/// Pull complete question objects out of broken or truncated JSON.
///
/// An object qualifies when it has a `text` field and at least two
/// options; missing bookkeeping fields get defaults.
fn salvage_questions(raw: &str) -> Vec<Value> {
    let mut questions = Vec::new();
    let bytes = raw.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        let Some(end) = balanced_span(raw, i, b'{', b'}') else {
            i += 1;
            continue;
        };
        if let Ok(Value::Object(mut obj)) = serde_json::from_str::<Value>(&raw[i..=end]) {
            let has_text = obj.contains_key("text");
            let enough_options = obj
                .get("options")
                .and_then(Value::as_array)
                .is_some_and(|opts| opts.len() >= 2);
            if has_text && enough_options {
                fill_default(&mut obj, "id", || {
                    Value::String((questions.len() + 1).to_string())
                });
                fill_default(&mut obj, "correctAnswer", || Value::String("a".into()));
                fill_default(&mut obj, "explanation", || {
                    Value::String("Generated question".into())
                });
                fill_default(&mut obj, "topic", || Value::String("General".into()));
                questions.push(Value::Object(obj));
            }
        }
        i = end + 1;
    }
    questions
}

fn fill_default(obj: &mut Map<String, Value>, key: &str, default: impl FnOnce() -> Value) {
    let blank = match obj.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    };
    if blank {
        obj.insert(key.to_string(), default());
    }
}

/// Grading verdict for a single midterm question
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correctness {
    Correct,
    #[default]
    Incorrect,
    PartiallyCorrect,
}

impl Correctness {
    pub fn is_correct(self) -> bool {
        matches!(self, Correctness::Correct)
    }
}

/// One graded question from a midterm paper, normalized from model output.
///
/// Serializes with the camelCase keys the API and stored analyses use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MidtermError {
    pub question: i64,
    pub your_answer: String,
    pub correct_answer: String,
    pub topic: String,
    pub feedback: String,
    pub marks_received: Option<f64>,
    pub total_marks: Option<f64>,
    pub correctness: Correctness,
}

/// Extract graded questions from a midterm analysis reply.
///
/// Every entry is normalized: correctness labels are canonicalized (with
/// marks-based inference when the label is missing or unrecognized) and
/// absent fields get defaults. Returns an empty vec when no JSON can be
/// recovered.
pub fn parse_midterm_errors(reply: &str) -> Vec<MidtermError> {
    let Some(raw) = extract_midterm_json(reply) else {
        warn!("No JSON found in midterm grading reply");
        return Vec::new();
    };

    let repaired = repair_json(raw);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            let items: Vec<Value> = match value {
                Value::Array(items) => items,
                Value::Object(mut map) => {
                    if let Some(errors) = map.remove("errors") {
                        errors.as_array().cloned().unwrap_or_default()
                    } else {
                        vec![Value::Object(map)]
                    }
                }
                _ => Vec::new(),
            };
            items.iter().map(normalize_graded_question).collect()
        }
        Err(err) => {
            debug!(error = %err, "Midterm JSON parse failed, salvaging objects");
            salvage_graded_questions(&repaired)
        }
    }
}

fn extract_midterm_json(reply: &str) -> Option<&str> {
    let array = Regex::new(r"(?s)\[.*?\]").unwrap();
    if let Some(m) = array.find(reply) {
        return Some(m.as_str());
    }
    let errors_object = Regex::new(r#"(?s)\{.*?"errors".*?\}"#).unwrap();
    if let Some(m) = errors_object.find(reply) {
        return Some(m.as_str());
    }
    let any_json = Regex::new(r"(?s)\{.*?\}|\[.*?\]").unwrap();
    any_json.find(reply).map(|m| m.as_str())
}

fn normalize_graded_question(raw: &Value) -> MidtermError {
    let marks_received = number_field(raw, &["marksReceived", "marks_received"]);
    let total_marks = number_field(raw, &["totalMarks", "total_marks"]);
    let correctness = correctness_field(raw)
        .unwrap_or_else(|| infer_correctness(marks_received, total_marks));

    MidtermError {
        question: number_field(raw, &["question"]).map(|n| n as i64).unwrap_or(0),
        your_answer: string_field(raw, &["yourAnswer", "your_answer"]).unwrap_or_default(),
        correct_answer: string_field(raw, &["correctAnswer", "correct_answer"]).unwrap_or_default(),
        topic: string_field(raw, &["topic"]).unwrap_or_else(|| "Unknown".to_string()),
        feedback: string_field(raw, &["feedback"]).unwrap_or_default(),
        marks_received,
        total_marks,
        correctness,
    }
}

// The label arrives under several key names and spellings; the first key
// present decides, falling back to marks when it is unrecognized.
fn correctness_field(raw: &Value) -> Option<Correctness> {
    let label = ["correctness", "status", "correctness_status"]
        .iter()
        .find_map(|key| match raw.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.to_lowercase()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })?;

    match label.trim() {
        "correct" | "right" | "true" => Some(Correctness::Correct),
        "incorrect" | "wrong" | "false" => Some(Correctness::Incorrect),
        "partially_correct" | "partially correct" | "partial" | "partially" => {
            Some(Correctness::PartiallyCorrect)
        }
        _ => None,
    }
}

fn infer_correctness(received: Option<f64>, total: Option<f64>) -> Correctness {
    match (received, total) {
        (Some(received), Some(total)) if total > 0.0 => {
            if received >= total {
                Correctness::Correct
            } else if received > 0.0 {
                Correctness::PartiallyCorrect
            } else {
                Correctness::Incorrect
            }
        }
        _ => Correctness::Incorrect,
    }
}

fn string_field(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| raw.get(key).and_then(Value::as_str).map(str::to_string))
}

fn number_field(raw: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        raw.get(key).and_then(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    })
}

fn salvage_graded_questions(raw: &str) -> Vec<MidtermError> {
    let pattern = Regex::new(r#"\{"question"[^}]*\}"#).unwrap();
    pattern
        .find_iter(raw)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .map(|value| normalize_graded_question(&value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_question(id: &str, text: &str) -> String {
        json!({
            "id": id,
            "text": text,
            "options": [
                {"id": "a", "text": "A"},
                {"id": "b", "text": "B"},
                {"id": "c", "text": "C"},
                {"id": "d", "text": "D"},
            ],
            "correctAnswer": "b",
            "explanation": "Because it is",
            "topic": "Sorting",
        })
        .to_string()
    }

    #[test]
    fn test_parse_fenced_block() {
        let reply = format!(
            "Here is your quiz:\n```json\n[{}]\n```\nEnjoy!",
            sample_question("1", "What is the time complexity of merge sort?")
        );
        let questions = parse_quiz_questions(&reply);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0]["id"], "1");
    }

    #[test]
    fn test_parse_bare_array() {
        let reply = format!(
            "[{},{}]",
            sample_question("1", "What is the time complexity of merge sort?"),
            sample_question("2", "Which traversal visits the root first?")
        );
        let questions = parse_quiz_questions(&reply);
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn test_parse_keeps_largest_array() {
        let reply = format!(
            "Scores were [1, 2, 3] last week.\n[{},{}]",
            sample_question("1", "What is the time complexity of merge sort?"),
            sample_question("2", "Which traversal visits the root first?")
        );
        let questions = parse_quiz_questions(&reply);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1]["id"], "2");
    }

    #[test]
    fn test_parse_repairs_trailing_comma() {
        let reply = format!(
            "[{},]",
            sample_question("1", "What is the time complexity of merge sort?")
        );
        let questions = parse_quiz_questions(&reply);
        assert_eq!(questions.len(), 1);
    }

    #[test]
    fn test_parse_object_with_questions_key() {
        let reply = r#"{"questions": ["What is big-O notation?", "Define a stack"]}"#;
        let questions = parse_quiz_questions(reply);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0], "What is big-O notation?");
    }

    #[test]
    fn test_parse_salvages_objects_without_array() {
        let first = json!({
            "id": "7",
            "text": "Why does quicksort degrade on sorted input?",
            "options": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}],
            "correctAnswer": "b",
        })
        .to_string();
        let second = json!({
            "text": "Which structure backs a priority queue?",
            "options": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}],
        })
        .to_string();
        let reply = format!("{first}\n{second}");

        let questions = parse_quiz_questions(&reply);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0]["id"], "7");
        assert_eq!(questions[1]["id"], "2");
        assert_eq!(questions[1]["correctAnswer"], "a");
        assert_eq!(questions[1]["explanation"], "Generated question");
        assert_eq!(questions[1]["topic"], "General");
    }

    #[test]
    fn test_parse_salvages_truncated_array() {
        let reply = format!(
            "[{},\n{{\"id\": \"2\", \"text\": \"Truncated befo",
            sample_question("1", "What is the time complexity of merge sort?")
        );
        let questions = parse_quiz_questions(&reply);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0]["id"], "1");
    }

    #[test]
    fn test_parse_prose_reply_returns_empty() {
        let questions = parse_quiz_questions("I could not generate a quiz for that topic, sorry.");
        assert!(questions.is_empty());
    }

    #[test]
    fn test_repair_json_escapes_newlines_inside_strings() {
        let raw = "{\"text\": \"line one\nline two\"}";
        let repaired = repair_json(raw);
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["text"], "line one\nline two");
    }

    #[test]
    fn test_repair_json_strips_comments_but_keeps_urls() {
        let raw = "[\n  {\"text\": \"see https://example.com/docs\", \"options\": [\"a\", \"b\"]}, // note\n]";
        let repaired = repair_json(raw);
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value[0]["text"], "see https://example.com/docs");
    }

    #[test]
    fn test_parse_midterm_array() {
        let reply = r#"[
            {"question": 1, "yourAnswer": "O(n)", "correctAnswer": "O(log n)",
             "marksReceived": 0, "totalMarks": 5, "correctness": "incorrect",
             "topic": "Binary Search", "feedback": "Review the halving step"},
            {"question": 2, "yourAnswer": "stack", "correctAnswer": "stack",
             "marksReceived": 5, "totalMarks": 5, "correctness": "correct",
             "topic": "DFS", "feedback": "Correct"}
        ]"#;
        let errors = parse_midterm_errors(reply);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].question, 1);
        assert_eq!(errors[0].topic, "Binary Search");
        assert_eq!(errors[0].correctness, Correctness::Incorrect);
        assert_eq!(errors[1].correctness, Correctness::Correct);
        assert_eq!(errors[1].marks_received, Some(5.0));
    }

    #[test]
    fn test_midterm_correctness_synonyms() {
        let reply = r#"[
            {"question": 1, "correctness": "Right"},
            {"question": 2, "status": "WRONG"},
            {"question": 3, "correctness": "partially correct"}
        ]"#;
        let errors = parse_midterm_errors(reply);
        assert_eq!(errors[0].correctness, Correctness::Correct);
        assert_eq!(errors[1].correctness, Correctness::Incorrect);
        assert_eq!(errors[2].correctness, Correctness::PartiallyCorrect);
    }

    #[test]
    fn test_midterm_marks_inference() {
        let reply = r#"[
            {"question": 1, "marksReceived": 5, "totalMarks": 5},
            {"question": 2, "marksReceived": 2, "totalMarks": 5},
            {"question": 3, "marksReceived": 0, "totalMarks": 5},
            {"question": 4}
        ]"#;
        let errors = parse_midterm_errors(reply);
        assert_eq!(errors[0].correctness, Correctness::Correct);
        assert_eq!(errors[1].correctness, Correctness::PartiallyCorrect);
        assert_eq!(errors[2].correctness, Correctness::Incorrect);
        assert_eq!(errors[3].correctness, Correctness::Incorrect);
    }

    #[test]
    fn test_midterm_defaults() {
        let errors = parse_midterm_errors("[{}, {}]");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].question, 0);
        assert_eq!(errors[0].your_answer, "");
        assert_eq!(errors[0].topic, "Unknown");
        assert_eq!(errors[0].marks_received, None);
        assert_eq!(errors[0].correctness, Correctness::Incorrect);
    }

    #[test]
    fn test_midterm_salvages_broken_array() {
        let reply = r#"[{"question": 3, "topic": "Stoichiometry", "correctness": "incorrect"}, {"question": 4 BROKEN]"#;
        let errors = parse_midterm_errors(reply);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].question, 3);
        assert_eq!(errors[0].topic, "Stoichiometry");
    }

    #[test]
    fn test_midterm_snake_case_keys() {
        let reply = r#"[{"question": "2", "your_answer": "H2O", "correct_answer": "H2SO4",
                         "marks_received": "1", "total_marks": "4"}]"#;
        let errors = parse_midterm_errors(reply);
        assert_eq!(errors[0].question, 2);
        assert_eq!(errors[0].your_answer, "H2O");
        assert_eq!(errors[0].correct_answer, "H2SO4");
        assert_eq!(errors[0].marks_received, Some(1.0));
        assert_eq!(errors[0].correctness, Correctness::PartiallyCorrect);
    }

    #[test]
    fn test_midterm_error_serializes_camel_case() {
        let error = MidtermError {
            question: 1,
            your_answer: "x".to_string(),
            correct_answer: "y".to_string(),
            topic: "Algebra".to_string(),
            feedback: "close".to_string(),
            marks_received: Some(2.0),
            total_marks: Some(5.0),
            correctness: Correctness::PartiallyCorrect,
        };
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["yourAnswer"], "x");
        assert_eq!(value["marksReceived"], 2.0);
        assert_eq!(value["correctness"], "partially_correct");
    }
}
