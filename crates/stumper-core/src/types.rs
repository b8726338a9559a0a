//! Core types for quiz challenges.
//!
//! Every record here is created once by the component that owns it and is
//! never mutated afterwards. Constructors enforce the invariants the rest of
//! the pipeline relies on (a rejection always carries a reason, a winner is
//! always derived from the evaluation).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A student-authored quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 1-based position in the quiz
    pub number: usize,

    /// The question text
    pub text: String,

    /// Expected answer supplied by the student (may be empty)
    #[serde(default)]
    pub reference_answer: String,
}

impl Question {
    /// Create a new question.
    pub fn new(number: usize, text: impl Into<String>, reference_answer: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
            reference_answer: reference_answer.into(),
        }
    }

    /// Whether the question text is non-blank.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Whether the student supplied a non-blank reference answer.
    pub fn has_reference_answer(&self) -> bool {
        !self.reference_answer.trim().is_empty()
    }

    /// Copy of this question with the reference answer replaced.
    pub fn with_reference_answer(&self, answer: impl Into<String>) -> Self {
        Self {
            number: self.number,
            text: self.text.clone(),
            reference_answer: answer.into(),
        }
    }
}

/// Kinds of problems the validator can flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    HeavyMath,
    PromptInjection,
    AnswerQuality,
    ContextMismatch,
    OffTopic,
    ModuleMismatch,
}

impl IssueKind {
    pub const ALL: [IssueKind; 6] = [
        IssueKind::HeavyMath,
        IssueKind::PromptInjection,
        IssueKind::AnswerQuality,
        IssueKind::ContextMismatch,
        IssueKind::OffTopic,
        IssueKind::ModuleMismatch,
    ];

    /// Wire tag, as used in structured output.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::HeavyMath => "heavy_math",
            IssueKind::PromptInjection => "prompt_injection",
            IssueKind::AnswerQuality => "answer_quality",
            IssueKind::ContextMismatch => "context_mismatch",
            IssueKind::OffTopic => "off_topic",
            IssueKind::ModuleMismatch => "module_mismatch",
        }
    }

    /// Look up a kind by its wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(tag.trim()))
    }

    /// Human-readable label ("Heavy Math").
    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::HeavyMath => "Heavy Math",
            IssueKind::PromptInjection => "Prompt Injection",
            IssueKind::AnswerQuality => "Answer Quality",
            IssueKind::ContextMismatch => "Context Mismatch",
            IssueKind::OffTopic => "Off Topic",
            IssueKind::ModuleMismatch => "Module Mismatch",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of issue kinds a validator is allowed to report.
///
/// The standard taxonomy is used for context-material quizzes; the module
/// taxonomy adds topic checks against a selected course module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueTaxonomy {
    #[default]
    Standard,
    Module,
}

impl IssueTaxonomy {
    /// Issue kinds in this taxonomy, in wire order.
    pub fn kinds(&self) -> &'static [IssueKind] {
        match self {
            IssueTaxonomy::Standard => &IssueKind::ALL[..4],
            IssueTaxonomy::Module => &IssueKind::ALL,
        }
    }

    /// Whether the taxonomy includes a kind.
    pub fn allows(&self, kind: IssueKind) -> bool {
        self.kinds().contains(&kind)
    }
}

/// Confidence reported by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    /// Lenient parse of free text ("High", "MEDIUM confidence").
    pub fn from_text(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();
        if upper.contains("HIGH") {
            Some(Confidence::High)
        } else if upper.contains("MEDIUM") {
            Some(Confidence::Medium)
        } else if upper.contains("LOW") {
            Some(Confidence::Low)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason recorded when a rejection arrives without one.
pub const DEFAULT_REJECTION_REASON: &str = "Question rejected by validator";

/// Outcome of validating one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the question may proceed to answering
    pub valid: bool,

    /// Specific problems found (may be empty even when invalid)
    #[serde(default)]
    pub issues: BTreeSet<IssueKind>,

    /// Explanation of the decision; never empty when `valid` is false
    pub reason: String,

    /// Validator confidence
    #[serde(default)]
    pub confidence: Confidence,

    /// Raw model output, kept for audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl ValidationResult {
    /// Create a validation result, filling in a reason for bare rejections.
    pub fn new(
        valid: bool,
        issues: BTreeSet<IssueKind>,
        reason: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        let mut reason = reason.into().trim().to_string();
        if !valid && reason.is_empty() {
            reason = DEFAULT_REJECTION_REASON.to_string();
        }

        Self {
            valid,
            issues,
            reason,
            confidence,
            raw_response: None,
        }
    }

    /// The validator could not be reached.
    pub fn unavailable(error: impl fmt::Display) -> Self {
        Self::new(
            false,
            BTreeSet::new(),
            format!("Validation system unavailable: {}", error),
            Confidence::Low,
        )
    }

    /// The validator answered but its output could not be interpreted.
    pub fn parse_failure(detail: impl fmt::Display, raw: impl Into<String>) -> Self {
        Self::new(
            false,
            BTreeSet::new(),
            format!("Validation parsing error: {}", detail),
            Confidence::Low,
        )
        .with_raw(raw)
    }

    /// No reference answer was provided and none could be obtained.
    pub fn missing_answer() -> Self {
        Self::new(
            false,
            BTreeSet::new(),
            "No reference answer provided",
            Confidence::High,
        )
    }

    /// The question itself is blank.
    pub fn blank_question() -> Self {
        Self::new(false, BTreeSet::new(), "Question has no text", Confidence::High)
    }

    /// Attach the raw model output.
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }
}

/// Judge decision on a candidate answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Correct,
    Incorrect,
}

impl Verdict {
    /// Read a verdict out of free text.
    ///
    /// "INCORRECT" is tested first because it contains "CORRECT".
    pub fn from_text(text: &str) -> Option<Self> {
        let upper = text.to_uppercase();
        if upper.contains("INCORRECT") {
            Some(Verdict::Incorrect)
        } else if upper.contains("CORRECT") {
            Some(Verdict::Correct)
        } else {
            None
        }
    }

    /// The student wins when the model answered incorrectly.
    pub fn student_wins(&self) -> bool {
        matches!(self, Verdict::Incorrect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Correct => "CORRECT",
            Verdict::Incorrect => "INCORRECT",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of judging a candidate answer against the reference answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// The judge's verdict
    pub verdict: Verdict,

    /// Whether the student stumped the model
    pub student_wins: bool,

    /// Judge reasoning
    pub explanation: String,

    /// Judge confidence
    pub confidence: Confidence,

    /// False when the judge call or its parsing failed
    pub success: bool,

    /// Failure description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The judge's explicit `student_wins` disagreed with its verdict
    #[serde(default)]
    pub verdict_conflict: bool,

    /// Raw model output, kept for audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl EvaluationResult {
    /// A verdict produced by the judge.
    ///
    /// An explicit `student_wins` from the judge takes precedence over the
    /// value derived from the verdict; disagreement is recorded.
    pub fn judged(
        verdict: Verdict,
        explicit_student_wins: Option<bool>,
        explanation: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        let derived = verdict.student_wins();
        let student_wins = explicit_student_wins.unwrap_or(derived);

        Self {
            verdict,
            student_wins,
            explanation: explanation.into(),
            confidence,
            success: true,
            error: None,
            verdict_conflict: student_wins != derived,
            raw_response: None,
        }
    }

    /// The judge could not be reached or its output was unusable.
    ///
    /// Counts as INCORRECT with low confidence, but never as a student win.
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            verdict: Verdict::Incorrect,
            student_wins: false,
            explanation: format!("Evaluation failed: {}", error),
            confidence: Confidence::Low,
            success: false,
            error: Some(error),
            verdict_conflict: false,
            raw_response: None,
        }
    }

    /// Attach the raw model output.
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }
}

/// The answer produced by the model under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAnswer {
    /// Whether the model produced an answer
    pub success: bool,

    /// The answer text (empty on failure)
    pub answer: String,

    /// Failure description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CandidateAnswer {
    pub fn answered(answer: impl Into<String>) -> Self {
        Self {
            success: true,
            answer: answer.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            answer: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Who won a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    #[serde(rename = "Student")]
    Student,

    #[serde(rename = "LLM")]
    Llm,

    #[serde(rename = "Invalid Question")]
    InvalidQuestion,

    #[serde(rename = "System Error")]
    SystemError,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Student => "Student",
            Winner::Llm => "LLM",
            Winner::InvalidQuestion => "Invalid Question",
            Winner::SystemError => "System Error",
        }
    }

    /// Whether the question counts toward the win-rate denominator.
    pub fn is_evaluated(&self) -> bool {
        matches!(self, Winner::Student | Winner::Llm)
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything recorded about one question.
///
/// Built only through the constructors below, which derive `winner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question: Question,

    pub validation: ValidationResult,

    /// Candidate answer, when the model under test was asked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_answer: Option<String>,

    /// Judge outcome, when the answer was evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,

    pub winner: Winner,

    /// Infrastructure failure that ended processing of this question
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QuestionResult {
    /// The question was rejected before answering.
    pub fn invalid(question: Question, validation: ValidationResult) -> Self {
        Self {
            question,
            validation,
            llm_answer: None,
            evaluation: None,
            winner: Winner::InvalidQuestion,
            error: None,
        }
    }

    /// The model under test could not be reached.
    pub fn system_error(
        question: Question,
        validation: ValidationResult,
        error: impl Into<String>,
    ) -> Self {
        Self {
            question,
            validation,
            llm_answer: None,
            evaluation: None,
            winner: Winner::SystemError,
            error: Some(error.into()),
        }
    }

    /// The answer was judged.
    pub fn evaluated(
        question: Question,
        validation: ValidationResult,
        llm_answer: impl Into<String>,
        evaluation: EvaluationResult,
    ) -> Self {
        let winner = if evaluation.student_wins {
            Winner::Student
        } else {
            Winner::Llm
        };
        let error = evaluation.error.clone();

        Self {
            question,
            validation,
            llm_answer: Some(llm_answer.into()),
            evaluation: Some(evaluation),
            winner,
            error,
        }
    }

    /// Whether the student won this question.
    pub fn student_wins(&self) -> bool {
        matches!(self.winner, Winner::Student)
    }

    /// Whether the judge failed on this question (counted as an LLM win).
    pub fn evaluator_failed(&self) -> bool {
        self.evaluation.as_ref().is_some_and(|e| !e.success)
    }
}
