//! Raw submission parsing.
//!
//! Students sometimes paste their quiz as free text (an issue body, a chat
//! message). Text that already contains `[[questions]]` blocks is read
//! directly. Anything else goes through an LLM extraction call whose reply
//! uses numbered `QUESTION_<n>:` / `ANSWER_<n>:` lines, parsed here.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

use super::{Quiz, QuizEntry, QuizError, QuizFile};

/// Marker for an answer the student did not give.
pub const MISSING_ANSWER: &str = "MISSING";

lazy_static! {
    static ref QUESTION_LINE: Regex = Regex::new(r"^\s*QUESTION_(\d+)\s*:\s*(.*)$").unwrap();
    static ref ANSWER_LINE: Regex = Regex::new(r"^\s*ANSWER_(\d+)\s*:\s*(.*)$").unwrap();
    static ref ERROR_LINE: Regex = Regex::new(r"^\s*ERROR\s*:\s*(.*)$").unwrap();
    static ref KEY_VALUE_LINE: Regex =
        Regex::new(r#"^\s*(question|answer)\s*=\s*"(.*)"\s*$"#).unwrap();
}

/// Whether the text already uses the `[[questions]]` layout.
pub fn has_question_blocks(text: &str) -> bool {
    text.contains("[[questions]]")
}

/// Parse `[[questions]]` blocks out of a raw submission.
///
/// Valid TOML is parsed as such. Otherwise the blocks are read line by line,
/// which tolerates prose around them.
pub fn parse_question_blocks(text: &str) -> Result<Quiz, QuizError> {
    if let Ok(file) = toml::from_str::<QuizFile>(text) {
        if !file.questions.is_empty() {
            return Ok(Quiz::from_entries(file.title, file.questions));
        }
    }

    let mut entries: Vec<QuizEntry> = Vec::new();
    let mut in_block = false;

    for line in text.lines() {
        if line.trim() == "[[questions]]" {
            in_block = true;
            entries.push(QuizEntry {
                question: String::new(),
                answer: String::new(),
            });
            continue;
        }

        if !in_block {
            continue;
        }

        let Some(caps) = KEY_VALUE_LINE.captures(line) else {
            continue;
        };
        let value = unescape(&caps[2]);
        if let Some(entry) = entries.last_mut() {
            match &caps[1] {
                "question" => entry.question = value,
                _ => entry.answer = value,
            }
        }
    }

    entries.retain(|e| !e.question.trim().is_empty());
    Ok(Quiz::from_entries(None, entries))
}

/// Parse the reply of an extraction call.
///
/// An `ERROR:` line fails the extraction. Answers marked `MISSING` (or
/// absent) become empty reference answers. Questions are renumbered from 1
/// in the order of their labels.
pub fn parse_extraction_reply(reply: &str) -> Result<Quiz, QuizError> {
    let mut questions: BTreeMap<usize, String> = BTreeMap::new();
    let mut answers: BTreeMap<usize, String> = BTreeMap::new();

    for line in reply.lines() {
        if let Some(caps) = ERROR_LINE.captures(line) {
            return Err(QuizError::ExtractionFailed(caps[1].trim().to_string()));
        }

        if let Some(caps) = QUESTION_LINE.captures(line) {
            if let Ok(n) = caps[1].parse::<usize>() {
                questions.entry(n).or_insert_with(|| caps[2].trim().to_string());
            }
        } else if let Some(caps) = ANSWER_LINE.captures(line) {
            if let Ok(n) = caps[1].parse::<usize>() {
                answers.entry(n).or_insert_with(|| caps[2].trim().to_string());
            }
        }
    }

    if questions.is_empty() {
        return Err(QuizError::ExtractionFailed(
            "no questions found in extraction reply".to_string(),
        ));
    }

    let entries = questions
        .into_iter()
        .filter(|(_, q)| !q.is_empty())
        .map(|(n, question)| {
            let answer = answers
                .remove(&n)
                .filter(|a| !a.eq_ignore_ascii_case(MISSING_ANSWER))
                .unwrap_or_default();
            QuizEntry { question, answer }
        })
        .collect();

    Ok(Quiz::from_entries(None, entries))
}

fn unescape(value: &str) -> String {
    value.replace("\\\"", "\"").replace("\\n", "\n")
}
