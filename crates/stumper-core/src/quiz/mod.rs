//! Quiz sources.
//!
//! A quiz is an ordered list of questions with student-supplied reference
//! answers. Quizzes are loaded from TOML, YAML or JSON files, or recovered
//! from a raw free-form submission (see [`raw`]).

pub mod raw;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::types::Question;

/// Errors that can occur when loading a quiz.
#[derive(Error, Debug)]
pub enum QuizError {
    #[error("Failed to read quiz file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported quiz format: {0}")]
    UnsupportedFormat(String),

    #[error("Question extraction failed: {0}")]
    ExtractionFailed(String),
}

/// One entry as written in a quiz file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizEntry {
    /// The question text
    pub question: String,

    /// Reference answer (optional in the file)
    #[serde(default, alias = "reference_answer")]
    pub answer: String,
}

/// On-disk quiz layout shared by all formats.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuizFile {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub questions: Vec<QuizEntry>,
}

/// A loaded quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    /// Optional quiz title
    pub title: Option<String>,

    /// Questions numbered from 1 in file order
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Build a quiz, numbering questions from 1.
    ///
    /// Blank questions are kept so the run can record them as invalid.
    pub fn from_entries(title: Option<String>, entries: Vec<QuizEntry>) -> Self {
        let questions = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| Question::new(i + 1, entry.question.trim(), entry.answer.trim()))
            .collect();

        Quiz { title, questions }
    }

    /// Parse a quiz from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, QuizError> {
        let file: QuizFile = toml::from_str(toml_str)?;
        Ok(Self::from_entries(file.title, file.questions))
    }

    /// Parse a quiz from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, QuizError> {
        let file: QuizFile = serde_yaml::from_str(yaml)?;
        Ok(Self::from_entries(file.title, file.questions))
    }

    /// Parse a quiz from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, QuizError> {
        let file: QuizFile = serde_json::from_str(json)?;
        Ok(Self::from_entries(file.title, file.questions))
    }

    /// Load a quiz file, choosing the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, QuizError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let mut quiz = match extension.as_str() {
            "toml" => Self::from_toml(&content)?,
            "yaml" | "yml" => Self::from_yaml(&content)?,
            "json" => Self::from_json(&content)?,
            other => return Err(QuizError::UnsupportedFormat(other.to_string())),
        };

        if quiz.title.is_none() {
            quiz.title = path.file_stem().and_then(|s| s.to_str()).map(String::from);
        }
        Ok(quiz)
    }

    /// Questions whose text is blank.
    pub fn blank_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| !q.has_text())
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Questions without a reference answer.
    pub fn missing_answers(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| !q.has_reference_answer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML_QUIZ: &str = r#"
title = "Graph theory"

[[questions]]
question = "What distinguishes an Euler path from a Hamilton path?"
answer = "Euler visits every edge once, Hamilton every vertex once"

[[questions]]
question = "Is K5 planar?"
"#;

    #[test]
    fn test_toml_quiz_numbered_from_one() {
        let quiz = Quiz::from_toml(TOML_QUIZ).unwrap();
        assert_eq!(quiz.title.as_deref(), Some("Graph theory"));
        assert_eq!(quiz.len(), 2);
        assert_eq!(quiz.questions[0].number, 1);
        assert_eq!(quiz.questions[1].number, 2);
        assert!(quiz.questions[1].reference_answer.is_empty());
        assert_eq!(quiz.missing_answers().count(), 1);
    }

    #[test]
    fn test_yaml_and_json_quizzes() {
        let yaml = "questions:\n  - question: What is a bridge?\n    answer: An edge whose removal disconnects the graph\n";
        let quiz = Quiz::from_yaml(yaml).unwrap();
        assert_eq!(quiz.len(), 1);
        assert!(quiz.questions[0].has_reference_answer());

        let json = r#"{"questions": [{"question": "Q?", "reference_answer": "A"}]}"#;
        let quiz = Quiz::from_json(json).unwrap();
        assert_eq!(quiz.questions[0].reference_answer, "A");
    }

    #[test]
    fn test_empty_quiz_is_allowed() {
        let quiz = Quiz::from_toml("title = \"Nothing yet\"").unwrap();
        assert!(quiz.is_empty());
    }

    #[test]
    fn test_blank_question_is_kept() {
        let quiz = Quiz::from_toml(
            "[[questions]]\nquestion = \"Is K4 planar?\"\nanswer = \"Yes\"\n\n[[questions]]\nquestion = \"  \"\nanswer = \"x\"\n",
        )
        .unwrap();
        assert_eq!(quiz.len(), 2);
        assert_eq!(quiz.questions[1].number, 2);
        assert!(quiz.questions[1].text.is_empty());
        let blank: Vec<usize> = quiz.blank_questions().map(|q| q.number).collect();
        assert_eq!(blank, vec![2]);
    }

    #[test]
    fn test_from_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(TOML_QUIZ.as_bytes()).unwrap();
        let quiz = Quiz::from_file(file.path()).unwrap();
        assert_eq!(quiz.len(), 2);

        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(b"anything").unwrap();
        assert!(matches!(
            Quiz::from_file(file.path()),
            Err(QuizError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Quiz::from_file("/definitely/not/here/quiz.toml").unwrap_err();
        assert!(matches!(err, QuizError::IoError(_)));
    }
}
