//! Prompt templates for quiz generation and material analysis
//!
//! Every builder returns the full user prompt for a single completion
//! call. Embedded source text is clipped here so callers can pass raw
//! OCR output without worrying about prompt size.

use serde_json::Value;

/// Max characters of combined material text embedded in a quiz prompt
pub const MATERIALS_CHARS: usize = 1_500;
/// Max characters of OCR text embedded in a midterm grading prompt
pub const MIDTERM_TEXT_CHARS: usize = 5_000;
/// Max characters of OCR text embedded in a topic extraction prompt
pub const EXTRACTION_TEXT_CHARS: usize = 3_000;
/// Weak topics listed in a holistic quiz prompt
pub const RAG_PROMPT_TOPICS: usize = 10;
/// Recorded mistakes embedded in a holistic quiz prompt
pub const RAG_PROMPT_MISTAKES: usize = 20;

const QUIZ_EXAMPLE: &str = r#"[
{"id": "1", "text": "What is binary search time complexity?", "options": [{"id": "a", "text": "O(n)"}, {"id": "b", "text": "O(log n)"}, {"id": "c", "text": "O(n²)"}, {"id": "d", "text": "O(1)"}], "correctAnswer": "b", "explanation": "Binary search eliminates half the space each iteration", "topic": "Algorithms"},
{"id": "2", "text": "What data structure does DFS use?", "options": [{"id": "a", "text": "Queue"}, {"id": "b", "text": "Stack"}, {"id": "c", "text": "Heap"}, {"id": "d", "text": "Array"}], "correctAnswer": "b", "explanation": "DFS uses stack (recursion or explicit)", "topic": "Graphs"},
{"id": "3", "text": "What is the time complexity of bubble sort?", "options": [{"id": "a", "text": "O(n log n)"}, {"id": "b", "text": "O(n)"}, {"id": "c", "text": "O(n²)"}, {"id": "d", "text": "O(1)"}], "correctAnswer": "c", "explanation": "Bubble sort has quadratic time complexity", "topic": "Sorting"},
{"id": "4", "text": "Which algorithm uses divide and conquer?", "options": [{"id": "a", "text": "Merge sort"}, {"id": "b", "text": "Bubble sort"}, {"id": "c", "text": "Selection sort"}, {"id": "d", "text": "Insertion sort"}], "correctAnswer": "a", "explanation": "Merge sort uses divide and conquer strategy", "topic": "Algorithms"}
]"#;

// Each {topic} is substituted with the first error topic so the model sees
// the examples anchored to the subject it is being asked about.
const ERROR_QUIZ_EXAMPLE: &str = r#"[
{"id": "1", "text": "What is the time complexity of binary search?", "options": [{"id": "a", "text": "O(n)"}, {"id": "b", "text": "O(log n)"}, {"id": "c", "text": "O(n²)"}, {"id": "d", "text": "O(1)"}], "correctAnswer": "b", "explanation": "Binary search eliminates half the search space each iteration, resulting in O(log n) time complexity", "topic": "{topic}"},
{"id": "2", "text": "Which data structure does DFS use?", "options": [{"id": "a", "text": "Queue"}, {"id": "b", "text": "Stack"}, {"id": "c", "text": "Heap"}, {"id": "d", "text": "Array"}], "correctAnswer": "b", "explanation": "DFS uses a stack (either through recursion or an explicit stack) to track nodes to visit", "topic": "{topic}"},
{"id": "3", "text": "What is the worst-case time complexity of quicksort?", "options": [{"id": "a", "text": "O(n log n)"}, {"id": "b", "text": "O(n)"}, {"id": "c", "text": "O(n²)"}, {"id": "d", "text": "O(1)"}], "correctAnswer": "c", "explanation": "Quicksort has O(n²) worst-case time complexity", "topic": "{topic}"},
{"id": "4", "text": "Which algorithm uses divide and conquer?", "options": [{"id": "a", "text": "Merge sort"}, {"id": "b", "text": "Bubble sort"}, {"id": "c", "text": "Selection sort"}, {"id": "d", "text": "Insertion sort"}], "correctAnswer": "a", "explanation": "Merge sort uses divide and conquer strategy", "topic": "{topic}"}
]"#;

const RAG_QUIZ_FOOTER: &str = r#"Create questions that:
1. Cover the most critical weak topics
2. Test understanding at different difficulty levels
3. Address common mistakes the user has made
4. Include a mix of conceptual and application questions

Return ONLY a valid JSON array of questions. Each question should have:
{
    "id": "q1",
    "question": "question text",
    "options": ["option1", "option2", "option3", "option4"],
    "correctAnswer": "option1",
    "topic": "topic name",
    "difficulty": "easy/medium/hard",
    "explanation": "why this answer is correct"
}"#;

const MIDTERM_GRADING_HEADER: &str = r#"
You are analyzing a graded midterm exam paper. Extract ALL questions with their answers, marks, and correctness status.

For EACH question in the paper (including correct ones), identify:
1. Question number
2. Student's answer (what they wrote)
3. Marks received (points given)
4. Total marks for the question
5. Correctness status: MUST be one of "correct", "incorrect", or "partially_correct"
   - "correct" = student got full marks
   - "incorrect" = student got 0 marks or wrong answer
   - "partially_correct" = student got some marks but not full marks
6. Correct answer (always provide, even if student was correct)
7. Topic/subject area (e.g., "Algorithms", "Data Structures", "Calculus", etc.)
8. Detailed feedback (explain what was right/wrong)

Midterm paper content (extracted via OCR):"#;

const MIDTERM_GRADING_FOOTER: &str = r#"IMPORTANT: Return ONLY a valid JSON array. No markdown, no code blocks, no explanations. Just pure JSON starting with [ and ending with ].

Format each question as:
{
  "question": <number>,
  "yourAnswer": "<student's answer>",
  "marksReceived": <number>,
  "totalMarks": <number>,
  "correctness": "<correct|incorrect|partially_correct>",
  "correctAnswer": "<correct answer>",
  "topic": "<topic name>",
  "feedback": "<detailed explanation>"
}

Return ALL questions from the paper, including correct ones. The correctness field is critical - use "correct" if marksReceived equals totalMarks, "partially_correct" if marksReceived is between 0 and totalMarks, and "incorrect" if marksReceived is 0.

Return ONLY the JSON array, nothing else.
"#;

const TOPIC_EXTRACTION_HEADER: &str = r#"Analyze this study material and extract:
1. The main subject/category (e.g., "Data Structures & Algorithms", "Computer Science", "Chemistry", "Physics", "Mathematics")
2. The top 5 most important topics/subjects covered

Material content:"#;

const TOPIC_EXTRACTION_FOOTER: &str = r#"Return a JSON object with:
{
    "subject": "Main subject/category name (1-3 words)",
    "topics": ["Topic 1", "Topic 2", "Topic 3", "Topic 4", "Topic 5"]
}

Examples:
- If material is about sorting algorithms, trees, graphs: {"subject": "Data Structures & Algorithms", "topics": ["Merge Sort", "Binary Trees", "Graph Traversal", ...]}
- If material is about loops, functions, variables: {"subject": "Programming Fundamentals", "topics": ["Loops", "Functions", "Variables", ...]}
- If material is about chemical reactions: {"subject": "Chemistry", "topics": ["Chemical Reactions", "Stoichiometry", ...]}

Return ONLY the JSON object, nothing else."#;

/// Prompt for generating a quiz from a topic list plus optional material text.
///
/// The model is steered hard towards a bare JSON array because downstream
/// parsing degrades with every layer of markdown the model wraps around it.
pub fn quiz_prompt(num_questions: u32, topics: &[String], materials_text: &str) -> String {
    let topics_str = if topics.is_empty() {
        "General topics".to_string()
    } else {
        topics.join(", ")
    };
    let materials = if materials_text.is_empty() {
        "General knowledge"
    } else {
        clip(materials_text, MATERIALS_CHARS)
    };

    format!(
        "You are a quiz generator. Generate exactly {num_questions} quiz questions.

CRITICAL: Generate questions ONLY from these specific topics: {topics_str}
DO NOT include questions from other subjects or topics not listed above.
Focus exclusively on the provided topics and materials.

Topics to use: {topics_str}
Materials: {materials}

CRITICAL: Return ONLY a valid JSON array. No markdown, no code blocks, no explanations. Just pure JSON starting with [ and ending with ].

IMPORTANT: Randomize the position of the correct answer across options a, b, c, and d. Do NOT always place the correct answer in the same position. Vary it randomly for each question.

Example format (note how correct answers are in different positions):
{QUIZ_EXAMPLE}

Generate {num_questions} questions. Vary the correct answer position randomly (a, b, c, or d) for each question. Return ONLY the JSON array, nothing else."
    )
}

/// Prompt for a remedial quiz built from the topics a student got wrong.
///
/// Deliberately excludes any other known weaknesses: mixing in unrelated
/// weak topics produces quizzes that jump between subjects.
pub fn error_quiz_prompt(num_questions: u32, topics: &[String]) -> String {
    let topics_str = topics.join(", ");
    let example_topic = topics.first().map(String::as_str).unwrap_or("General");
    let example = ERROR_QUIZ_EXAMPLE.replace("{topic}", example_topic);

    format!(
        "You are a quiz generator. Generate exactly {num_questions} quiz questions focused on helping a student improve in areas where they made mistakes.

CRITICAL: Generate questions ONLY from these specific error topics: {topics_str}
DO NOT include questions from other subjects or topics not listed above.
Focus exclusively on the topics where the student made errors.

The student made errors in these topics: {topics_str}

Generate questions that:
1. Test understanding of these specific topics
2. Are at an intermediate difficulty level
3. Help reinforce concepts the student struggled with
4. Include clear explanations for each answer

CRITICAL: Return ONLY a valid JSON array. No markdown, no code blocks, no explanations. Just pure JSON starting with [ and ending with ].

IMPORTANT: Randomize the position of the correct answer across options a, b, c, and d. Do NOT always place the correct answer in the same position. Vary it randomly for each question.

Example format (note how correct answers are in different positions):
{example}

Generate {num_questions} questions covering these topics: {topics_str}.
Vary the correct answer position randomly (a, b, c, or d) for each question. Return ONLY the JSON array, nothing else."
    )
}

/// Prompt for the holistic weak-area quiz.
///
/// Questions come back in a looser shape than the standard quiz (plain
/// string options, answer given as option text), so replies from this
/// prompt skip normalization and are served as parsed.
pub fn rag_quiz_prompt(num_questions: u32, weak_topics: &[String], mistakes: &[Value]) -> String {
    let topics_str = weak_topics
        .iter()
        .take(RAG_PROMPT_TOPICS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let shown: Vec<&Value> = mistakes.iter().take(RAG_PROMPT_MISTAKES).collect();
    let mistakes_summary = serde_json::to_string_pretty(&shown).unwrap_or_default();

    format!(
        "Generate a comprehensive {num_questions}-question quiz that evaluates the user's understanding across their identified weak areas.

User's Weak Topics: {topics_str}

Common Mistakes Made:
{mistakes_summary}

{RAG_QUIZ_FOOTER}"
    )
}

/// Token budget for a holistic quiz reply, sized to the question count.
pub fn rag_quiz_max_tokens(num_questions: u32) -> u32 {
    (num_questions * 400).clamp(4_096, 8_192)
}

/// Prompt for grading a scanned midterm paper from its OCR text.
///
/// Asks for every question, correct ones included, so downstream stats can
/// compute accuracy instead of only listing mistakes.
pub fn midterm_grading_prompt(ocr_text: &str) -> String {
    format!(
        "{MIDTERM_GRADING_HEADER}\n{content}\n\n{MIDTERM_GRADING_FOOTER}",
        content = clip(ocr_text, MIDTERM_TEXT_CHARS),
    )
}

/// Prompt for pulling the subject and top topics out of uploaded material.
pub fn topic_extraction_prompt(material_text: &str) -> String {
    format!(
        "{TOPIC_EXTRACTION_HEADER}\n{content}\n\n{TOPIC_EXTRACTION_FOOTER}",
        content = clip(material_text, EXTRACTION_TEXT_CHARS),
    )
}

/// Clip to a character budget without splitting a code point.
pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quiz_prompt_includes_topics_and_count() {
        let topics = vec!["Sorting".to_string(), "Graphs".to_string()];
        let prompt = quiz_prompt(5, &topics, "");

        assert!(prompt.contains("Generate exactly 5 quiz questions"));
        assert!(prompt.contains("ONLY from these specific topics: Sorting, Graphs"));
        assert!(prompt.contains("Materials: General knowledge"));
    }

    #[test]
    fn test_quiz_prompt_defaults_empty_topics() {
        let prompt = quiz_prompt(3, &[], "some notes");
        assert!(prompt.contains("Topics to use: General topics"));
        assert!(prompt.contains("Materials: some notes"));
    }

    #[test]
    fn test_quiz_prompt_clips_materials() {
        let materials = "x".repeat(2_000);
        let prompt = quiz_prompt(3, &["Sorting".to_string()], &materials);

        let embedded = prompt
            .split("Materials: ")
            .nth(1)
            .and_then(|rest| rest.split('\n').next())
            .unwrap();
        assert_eq!(embedded.len(), MATERIALS_CHARS);
    }

    #[test]
    fn test_error_quiz_prompt_tags_examples_with_first_topic() {
        let topics = vec!["Stoichiometry".to_string(), "Acids".to_string()];
        let prompt = error_quiz_prompt(10, &topics);

        assert!(prompt.contains("error topics: Stoichiometry, Acids"));
        assert!(prompt.contains("\"topic\": \"Stoichiometry\""));
        assert!(!prompt.contains("\"topic\": \"Acids\""));
    }

    #[test]
    fn test_rag_quiz_prompt_limits_topics() {
        let topics: Vec<String> = (0..15).map(|i| format!("Topic{i}")).collect();
        let mistakes = vec![json!({"type": "quiz", "topic": "Topic0", "error": "b"})];
        let prompt = rag_quiz_prompt(10, &topics, &mistakes);

        let line = prompt
            .lines()
            .find(|l| l.starts_with("User's Weak Topics:"))
            .unwrap();
        assert!(line.ends_with("Topic9"));
        assert!(!line.contains("Topic10"));
        assert!(prompt.contains("\"type\": \"quiz\""));
    }

    #[test]
    fn test_rag_quiz_max_tokens_scales_with_count() {
        assert_eq!(rag_quiz_max_tokens(5), 4_096);
        assert_eq!(rag_quiz_max_tokens(15), 6_000);
        assert_eq!(rag_quiz_max_tokens(30), 8_192);
    }

    #[test]
    fn test_midterm_prompt_clips_ocr_text() {
        let text = "a".repeat(6_000);
        let prompt = midterm_grading_prompt(&text);

        assert!(prompt.contains("partially_correct"));
        assert!(!prompt.contains(&"a".repeat(5_001)));
        assert!(prompt.contains(&"a".repeat(5_000)));
    }

    #[test]
    fn test_topic_extraction_prompt_embeds_material() {
        let prompt = topic_extraction_prompt("Chapter 3: Chemical Reactions");
        assert!(prompt.contains("top 5 most important topics"));
        assert!(prompt.contains("Chapter 3: Chemical Reactions"));
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        assert_eq!(clip("héllo", 2), "hé");
        assert_eq!(clip("ab", 10), "ab");
    }
}
