//! Quiz generation toolkit
//!
//! Builds completion prompts for quiz and midterm analysis, parses the
//! free-text replies back into structured questions, and normalizes the
//! result into a shape the API can serve.

pub mod normalize;
pub mod parse;
pub mod prompts;
pub mod title;

pub use normalize::{
    normalize_questions, pad_rag_questions, placeholder_question, placeholder_questions,
    randomize_options, QuizOption, QuizQuestion,
};
pub use parse::{parse_midterm_errors, parse_quiz_questions, Correctness, MidtermError};
pub use title::{generate_quiz_title, needs_regeneration};
