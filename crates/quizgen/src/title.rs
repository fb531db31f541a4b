//! Quiz title generation
//!
//! Titles come from the completion model, constrained to 3-6 descriptive
//! words. A usable subject short-circuits the model call, and every
//! failure path degrades to a title assembled from topic keywords.

use studybuddy_common::clients::CompletionModel;
use tracing::{info, warn};

const TITLE_TEMPERATURE: f32 = 0.3;
const TITLE_MAX_TOKENS: u32 = 50;
const MAX_TITLE_WORDS: usize = 6;
/// Topics listed in the title prompt
const PROMPT_TOPICS: usize = 10;

// Subjects too generic to serve as a title on their own
const GENERIC_SUBJECTS: [&str; 4] = ["computer science", "cs", "general", "quiz"];

const TITLE_RULES: &str = r#"Generate a UNIQUE, DESCRIPTIVE 3-6 word title that accurately represents these EXACT topics.
The title should be specific and descriptive enough to distinguish this quiz from other quizzes on similar subjects.
Make it distinctive based on the actual topics provided - use enough words to be clear and specific.

Examples:
- Topics: "Merge Sort, Quick Sort, Bubble Sort" → Title: "Sorting Algorithms & Techniques" (NOT just "Algorithms" or "Computer Science")
- Topics: "Binary Trees, Graphs, Linked Lists" → Title: "Data Structures & Tree Algorithms" (NOT just "Data Structures" or "Computer Science")
- Topics: "Time Complexity, Space Complexity, Big O Notation" → Title: "Algorithm Complexity Analysis" (NOT just "Complexity" or "Computer Science")
- Topics: "DFS, BFS, Graph Traversal" → Title: "Graph Traversal Algorithms" (NOT just "Graph Algorithms" or "Computer Science")
- Topics: "Python Loops, While Loops, For Loops" → Title: "Loop Structures & Iteration" (NOT just "Loops" or "Computer Science")
- Topics: "Memoization, Dynamic Programming, Recursion" → Title: "Dynamic Programming & Recursion" (NOT just "Dynamic Programming" or "Computer Science")
- Topics: "Binary Search Tree, Balanced BST, Tree Traversal" → Title: "Binary Tree Structures & Traversal" (NOT just "Trees" or "Computer Science")
- Topics: "Hash Tables, Hash Functions, Collision Resolution" → Title: "Hash Tables & Collision Handling" (NOT just "Hash Tables" or "Computer Science")
- Topics: "Heap Sort, Priority Queue, Heap Operations" → Title: "Heap Data Structures & Sorting" (NOT just "Heaps" or "Computer Science")

IMPORTANT:
- Use 3-6 words to be descriptive and specific
- Include the main topic categories in the title
- If multiple related topics → combine them (e.g., "Sorting & Searching Algorithms")
- If topics are about complexity → use "Complexity Analysis" or "Algorithm Complexity"
- If topics are about data structures → specify which ones (e.g., "Tree & Graph Structures")
- DO NOT default to generic "Computer Science" or "Algorithms" - be specific!
- Make titles distinguishable: "Sorting Algorithms" vs "Graph Algorithms" vs "Complexity Analysis"

Return ONLY the title (3-6 words), nothing else. No quotes, no explanation, just the title."#;

/// Whether a caller-supplied title should be replaced with a generated
/// one. Titles that just concatenate the topic list, or run past 50
/// characters, get regenerated.
pub fn needs_regeneration(title: &str, topics: &[String]) -> bool {
    let title_lower = title.to_lowercase();
    let topic_mentions = topics
        .iter()
        .take(5)
        .filter(|t| title_lower.contains(&t.to_lowercase()))
        .count();
    topic_mentions >= 2 || title.chars().count() > 50
}

/// Produce a 3-6 word quiz title for a topic list.
///
/// A provided subject is used directly when it is specific enough (not in
/// the generic list, at most six words). Otherwise the model names the
/// quiz; on failure the title is assembled from topic keywords so quiz
/// creation never fails over naming.
pub async fn generate_quiz_title(
    model: &dyn CompletionModel,
    topics: &[String],
    subject: Option<&str>,
) -> String {
    let subject = subject.map(str::trim).filter(|s| !s.is_empty());
    if let Some(subject) = subject {
        let cleaned = subject.trim_matches('"').trim_matches('\'');
        if !GENERIC_SUBJECTS.contains(&cleaned.to_lowercase().as_str())
            && cleaned.split_whitespace().count() <= MAX_TITLE_WORDS
        {
            info!(title = cleaned, "Using provided subject as quiz title");
            return cleaned.to_string();
        }
    }

    if topics.is_empty() {
        return "General Quiz".to_string();
    }

    let prompt = title_prompt(topics, subject);
    match model
        .complete(&prompt, None, TITLE_TEMPERATURE, TITLE_MAX_TOKENS)
        .await
    {
        Ok(reply) => {
            let title = clean_title(&reply, topics);
            if title.chars().count() < 2 {
                keyword_title(topics)
            } else {
                info!(title = %title, "Generated quiz title");
                title
            }
        }
        Err(err) => {
            warn!(error = %err, "Title generation failed, using topic keywords");
            descriptive_fallback_title(topics)
        }
    }
}

fn title_prompt(topics: &[String], subject: Option<&str>) -> String {
    let topics_str = topics
        .iter()
        .take(PROMPT_TOPICS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let subject_context = subject
        .map(|s| format!("\nSubject context: {s}"))
        .unwrap_or_default();

    format!("Given these quiz topics: {topics_str}{subject_context}\n\n{TITLE_RULES}")
}

/// Strip quoting and trailing prose, then clamp to the word budget. A
/// too-short reply is padded with words from the first topic.
fn clean_title(reply: &str, topics: &[String]) -> String {
    let mut title = reply
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string();
    if let Some(first) = title.split(['.', '\n']).next() {
        title = first.trim().to_string();
    }

    let words: Vec<&str> = title.split_whitespace().collect();
    if words.len() > MAX_TITLE_WORDS {
        title = words[..MAX_TITLE_WORDS].join(" ");
    } else if !words.is_empty() && words.len() < 3 {
        if let Some(first_topic) = topics.first() {
            let extra: Vec<&str> = first_topic.split_whitespace().take(2).collect();
            title = format!("{} {}", title, extra.join(" "));
            let words: Vec<&str> = title.split_whitespace().collect();
            if words.len() > MAX_TITLE_WORDS {
                title = words[..MAX_TITLE_WORDS].join(" ");
            }
        }
    }
    title
}

// Used when the model replied but the cleaned title came out empty.
fn keyword_title(topics: &[String]) -> String {
    const STOPWORDS: [&str; 6] = ["the", "of", "and", "or", "a", "an"];

    let mut words: Vec<&str> = Vec::new();
    for topic in topics.iter().take(3) {
        let keys: Vec<&str> = topic
            .split_whitespace()
            .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
            .take(2)
            .collect();
        words.extend(keys);
    }

    if !words.is_empty() {
        words.truncate(MAX_TITLE_WORDS);
        words.join(" ")
    } else if let Some(first) = topics.first() {
        first.clone()
    } else {
        "General Quiz".to_string()
    }
}

// Used when the model call itself failed. Slightly richer than
// keyword_title: it appends a category word when the topics suggest one.
fn descriptive_fallback_title(topics: &[String]) -> String {
    const STOPWORDS: [&str; 9] = ["the", "of", "and", "or", "a", "an", "in", "on", "at"];

    let mut parts: Vec<&str> = Vec::new();
    for topic in topics.iter().take(3) {
        let meaningful: Vec<&str> = topic
            .split_whitespace()
            .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
            .take(2)
            .collect();
        parts.extend(meaningful);
    }

    if parts.is_empty() {
        return topics
            .first()
            .cloned()
            .unwrap_or_else(|| "General Quiz".to_string());
    }

    parts.truncate(MAX_TITLE_WORDS);
    let mut title = parts.join(" ");

    let title_lower = title.to_lowercase();
    let already_categorized = ["algorithm", "structure", "complexity"]
        .iter()
        .any(|w| title_lower.contains(w));
    if !already_categorized {
        let all_topics = topics
            .iter()
            .take(3)
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        if ["sort", "search", "traversal", "dfs", "bfs"]
            .iter()
            .any(|w| all_topics.contains(w))
        {
            title = format!("{title} Algorithms");
        } else if ["tree", "graph", "list", "array", "heap"]
            .iter()
            .any(|w| all_topics.contains(w))
        {
            title = format!("{title} Structures");
        }
    }

    title.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use studybuddy_common::clients::MockCompletionModel;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_specific_subject_used_directly() {
        let model = MockCompletionModel::failing();
        let title = generate_quiz_title(
            &model,
            &topics(&["Stoichiometry"]),
            Some("Organic Chemistry"),
        )
        .await;
        assert_eq!(title, "Organic Chemistry");
    }

    #[tokio::test]
    async fn test_generic_subject_goes_to_model() {
        let model = MockCompletionModel::new("Sorting Algorithms & Techniques");
        let title = generate_quiz_title(
            &model,
            &topics(&["Merge Sort", "Quick Sort"]),
            Some("Computer Science"),
        )
        .await;
        assert_eq!(title, "Sorting Algorithms & Techniques");
    }

    #[tokio::test]
    async fn test_quoted_subject_is_unquoted() {
        let model = MockCompletionModel::failing();
        let title = generate_quiz_title(&model, &[], Some("\"Linear Algebra\"")).await;
        assert_eq!(title, "Linear Algebra");
    }

    #[tokio::test]
    async fn test_empty_topics_give_general_quiz() {
        let model = MockCompletionModel::failing();
        let title = generate_quiz_title(&model, &[], None).await;
        assert_eq!(title, "General Quiz");
    }

    #[tokio::test]
    async fn test_reply_trimmed_to_six_words() {
        let model = MockCompletionModel::new("One Two Three Four Five Six Seven Eight");
        let title = generate_quiz_title(&model, &topics(&["Graphs"]), None).await;
        assert_eq!(title, "One Two Three Four Five Six");
    }

    #[tokio::test]
    async fn test_reply_cut_at_sentence_break() {
        let model = MockCompletionModel::new("Graph Traversal Basics. Let me explain why...");
        let title = generate_quiz_title(&model, &topics(&["DFS"]), None).await;
        assert_eq!(title, "Graph Traversal Basics");
    }

    #[tokio::test]
    async fn test_short_reply_padded_from_first_topic() {
        let model = MockCompletionModel::new("Recursion");
        let title =
            generate_quiz_title(&model, &topics(&["Dynamic Programming", "Memoization"]), None)
                .await;
        assert_eq!(title, "Recursion Dynamic Programming");
    }

    #[tokio::test]
    async fn test_model_failure_uses_topic_keywords() {
        let model = MockCompletionModel::failing();
        let title =
            generate_quiz_title(&model, &topics(&["Merge Sort", "Binary Trees"]), None).await;
        assert_eq!(title, "Merge Sort Binary Trees Algorithms");
    }

    #[tokio::test]
    async fn test_model_failure_structure_suffix() {
        let model = MockCompletionModel::failing();
        let title = generate_quiz_title(&model, &topics(&["Linked Lists", "Heaps"]), None).await;
        assert_eq!(title, "Linked Lists Heaps Structures");
    }

    #[test]
    fn test_needs_regeneration_on_topic_concatenation() {
        let topics = topics(&["Merge Sort", "Binary Trees", "Hash Tables"]);
        assert!(needs_regeneration("Merge Sort, Binary Trees Quiz", &topics));
        assert!(!needs_regeneration("Sorting Fundamentals", &topics));
    }

    #[test]
    fn test_needs_regeneration_on_long_title() {
        assert!(needs_regeneration(
            "An Extremely Verbose Quiz Title That Overflows The Card Layout",
            &[],
        ));
        assert!(!needs_regeneration("Short Title", &[]));
    }

    #[test]
    fn test_title_prompt_lists_topics_and_subject() {
        let prompt = title_prompt(&topics(&["DFS", "BFS"]), Some("Computer Science"));
        assert!(prompt.starts_with("Given these quiz topics: DFS, BFS\nSubject context: Computer Science"));
        assert!(prompt.contains("Return ONLY the title (3-6 words), nothing else."));
    }
}
