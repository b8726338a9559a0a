//! Tally: aggregates per-question outcomes into the final challenge result.
//!
//! The pass policy is strict and not configurable:
//! 1. Only Student and LLM outcomes count toward the win rate
//! 2. Invalid questions and system errors are excluded from the denominator
//! 3. The student passes only with at least one valid, evaluated question
//!    and a 100% win rate over evaluated questions
//! 4. An interrupted run never passes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::statistics::ChallengeStatistics;
use crate::types::{QuestionResult, Winner};

/// Printed and persisted when the student stumped the model on every question.
pub const WIN_MARKER: &str = "STUDENTS_QUIZ_KEIKO_WIN";

/// Printed and persisted otherwise.
pub const LOSE_MARKER: &str = "STUDENTS_QUIZ_KEIKO_LOSE";

/// Human-readable pass criteria, persisted with every result.
pub const PASS_CRITERIA: &str = "At least one valid question AND win rate = 100% \
(stump the model on ALL evaluated questions; invalid questions and system errors excluded)";

/// Errors from persisting or loading results.
#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Failed to access results file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to (de)serialize results: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Inconsistent results: {0}")]
    Inconsistent(String),
}

/// Counts over processed questions.
///
/// All derived values (`evaluated_total`, `success_rate`, `passes`) are
/// computed from the counts, never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scoreboard {
    /// Questions that passed validation
    pub valid_questions: usize,

    /// Questions rejected by validation (or missing an answer)
    pub invalid_questions: usize,

    /// Valid questions the model under test never answered
    pub system_errors: usize,

    /// Evaluations that failed and were counted as LLM wins
    pub evaluator_failures: usize,

    pub student_wins: usize,

    pub llm_wins: usize,
}

impl Scoreboard {
    /// Record one question outcome.
    pub fn record(&mut self, result: &QuestionResult) {
        match result.winner {
            Winner::InvalidQuestion => self.invalid_questions += 1,
            Winner::SystemError => {
                self.valid_questions += 1;
                self.system_errors += 1;
            }
            Winner::Student => {
                self.valid_questions += 1;
                self.student_wins += 1;
            }
            Winner::Llm => {
                self.valid_questions += 1;
                self.llm_wins += 1;
                if result.evaluator_failed() {
                    self.evaluator_failures += 1;
                }
            }
        }
    }

    /// Questions that reached a verdict.
    pub fn evaluated_total(&self) -> usize {
        self.student_wins + self.llm_wins
    }

    /// Fraction of evaluated questions the student won; 0.0 when none were.
    pub fn success_rate(&self) -> f64 {
        match self.evaluated_total() {
            0 => 0.0,
            total => self.student_wins as f64 / total as f64,
        }
    }

    /// All-or-nothing pass rule.
    pub fn passes(&self) -> bool {
        self.valid_questions > 0 && self.evaluated_total() > 0 && self.llm_wins == 0
    }

    /// Total questions processed.
    pub fn processed(&self) -> usize {
        self.valid_questions + self.invalid_questions
    }
}

/// Final outcome token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeMarker {
    #[serde(rename = "STUDENTS_QUIZ_KEIKO_WIN")]
    Win,

    #[serde(rename = "STUDENTS_QUIZ_KEIKO_LOSE")]
    Lose,
}

impl OutcomeMarker {
    pub fn from_passes(passes: bool) -> Self {
        if passes {
            OutcomeMarker::Win
        } else {
            OutcomeMarker::Lose
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeMarker::Win => WIN_MARKER,
            OutcomeMarker::Lose => LOSE_MARKER,
        }
    }
}

impl fmt::Display for OutcomeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulates question results during a run.
#[derive(Debug, Clone)]
pub struct ChallengeTally {
    title: Option<String>,
    quiz_model: String,
    evaluator_model: String,
    total_questions: usize,
    started_at: DateTime<Utc>,
    scoreboard: Scoreboard,
    results: Vec<QuestionResult>,
}

impl ChallengeTally {
    /// Start a tally for a quiz of `total_questions`.
    pub fn new(
        title: Option<String>,
        quiz_model: impl Into<String>,
        evaluator_model: impl Into<String>,
        total_questions: usize,
    ) -> Self {
        Self {
            title,
            quiz_model: quiz_model.into(),
            evaluator_model: evaluator_model.into(),
            total_questions,
            started_at: Utc::now(),
            scoreboard: Scoreboard::default(),
            results: Vec::with_capacity(total_questions),
        }
    }

    /// Append one question's outcome.
    pub fn record(&mut self, result: QuestionResult) {
        self.scoreboard.record(&result);
        self.results.push(result);
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }

    /// Finalize the run.
    ///
    /// The run is complete when every question in the quiz was processed.
    pub fn finish(self) -> ChallengeResults {
        let completed = self.results.len() == self.total_questions;
        self.finalize(completed)
    }

    /// Finalize a run that was stopped early.
    pub fn finish_interrupted(self) -> ChallengeResults {
        self.finalize(false)
    }

    fn finalize(self, completed: bool) -> ChallengeResults {
        let passes = completed && self.scoreboard.passes();
        let statistics =
            ChallengeStatistics::compute(&self.scoreboard, self.total_questions, &self.results);

        ChallengeResults {
            quiz_title: self.title,
            quiz_model: self.quiz_model,
            evaluator_model: self.evaluator_model,
            total_questions: self.total_questions,
            scoreboard: self.scoreboard,
            evaluated_total: self.scoreboard.evaluated_total(),
            success_rate: self.scoreboard.success_rate(),
            passes,
            marker: OutcomeMarker::from_passes(passes),
            pass_criteria: PASS_CRITERIA.to_string(),
            completed,
            started_at: self.started_at,
            finished_at: Utc::now(),
            metadata: BTreeMap::new(),
            statistics,
            question_results: self.results,
        }
    }
}

/// The final, persisted result of a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quiz_title: Option<String>,

    quiz_model: String,

    evaluator_model: String,

    /// Questions in the quiz (processed or not)
    total_questions: usize,

    #[serde(flatten)]
    scoreboard: Scoreboard,

    evaluated_total: usize,

    success_rate: f64,

    passes: bool,

    marker: OutcomeMarker,

    pass_criteria: String,

    /// False when the run was interrupted
    completed: bool,

    started_at: DateTime<Utc>,

    finished_at: DateTime<Utc>,

    /// Run metadata (token usage, response mode)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,

    /// Derived from `question_results`; recomputed on load
    #[serde(default)]
    statistics: ChallengeStatistics,

    question_results: Vec<QuestionResult>,
}

impl ChallengeResults {
    pub fn quiz_title(&self) -> Option<&str> {
        self.quiz_title.as_deref()
    }

    pub fn quiz_model(&self) -> &str {
        &self.quiz_model
    }

    pub fn evaluator_model(&self) -> &str {
        &self.evaluator_model
    }

    pub fn total_questions(&self) -> usize {
        self.total_questions
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    pub fn valid_questions(&self) -> usize {
        self.scoreboard.valid_questions
    }

    pub fn invalid_questions(&self) -> usize {
        self.scoreboard.invalid_questions
    }

    pub fn system_errors(&self) -> usize {
        self.scoreboard.system_errors
    }

    pub fn evaluator_failures(&self) -> usize {
        self.scoreboard.evaluator_failures
    }

    pub fn student_wins(&self) -> usize {
        self.scoreboard.student_wins
    }

    pub fn llm_wins(&self) -> usize {
        self.scoreboard.llm_wins
    }

    pub fn evaluated_total(&self) -> usize {
        self.evaluated_total
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate
    }

    pub fn passes(&self) -> bool {
        self.passes
    }

    pub fn marker(&self) -> OutcomeMarker {
        self.marker
    }

    pub fn pass_criteria(&self) -> &str {
        &self.pass_criteria
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn question_results(&self) -> &[QuestionResult] {
        &self.question_results
    }

    pub fn statistics(&self) -> &ChallengeStatistics {
        &self.statistics
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Mutable access to metadata (for runtime extensions).
    pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.metadata
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ResultsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON, rejecting records whose derived fields
    /// disagree with their per-question results.
    pub fn from_json(json: &str) -> Result<Self, ResultsError> {
        let mut results: ChallengeResults = serde_json::from_str(json)?;
        results.check_consistency()?;
        results.statistics = ChallengeStatistics::compute(
            &results.scoreboard,
            results.total_questions,
            &results.question_results,
        );
        Ok(results)
    }

    /// Write to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ResultsError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResultsError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn check_consistency(&self) -> Result<(), ResultsError> {
        let mut recount = Scoreboard::default();
        for result in &self.question_results {
            recount.record(result);
        }

        if recount != self.scoreboard {
            return Err(ResultsError::Inconsistent(format!(
                "counts {:?} do not match question results {:?}",
                self.scoreboard, recount
            )));
        }

        let expected_passes = self.completed && recount.passes();
        if self.passes != expected_passes
            || self.marker != OutcomeMarker::from_passes(expected_passes)
            || self.evaluated_total != recount.evaluated_total()
        {
            return Err(ResultsError::Inconsistent(
                "pass decision does not follow from counts".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::PerformanceLevel;
    use crate::types::{Confidence, EvaluationResult, Question, ValidationResult, Verdict};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn question(n: usize) -> Question {
        Question::new(n, format!("Question {}", n), format!("Answer {}", n))
    }

    fn accepted() -> ValidationResult {
        ValidationResult::new(true, BTreeSet::new(), "ok", Confidence::High)
    }

    fn outcome(n: usize, winner: Winner) -> QuestionResult {
        match winner {
            Winner::Student => QuestionResult::evaluated(
                question(n),
                accepted(),
                "wrong answer",
                EvaluationResult::judged(Verdict::Incorrect, None, "missed", Confidence::High),
            ),
            Winner::Llm => QuestionResult::evaluated(
                question(n),
                accepted(),
                "right answer",
                EvaluationResult::judged(Verdict::Correct, None, "matches", Confidence::High),
            ),
            Winner::InvalidQuestion => QuestionResult::invalid(
                question(n),
                ValidationResult::new(false, BTreeSet::new(), "too mathematical", Confidence::High),
            ),
            Winner::SystemError => {
                QuestionResult::system_error(question(n), accepted(), "connection refused")
            }
        }
    }

    fn run(winners: &[Winner]) -> ChallengeResults {
        let mut tally = ChallengeTally::new(None, "quiz-model", "judge-model", winners.len());
        for (i, winner) in winners.iter().enumerate() {
            tally.record(outcome(i + 1, *winner));
        }
        tally.finish()
    }

    fn winner_strategy() -> impl Strategy<Value = Winner> {
        prop_oneof![
            Just(Winner::Student),
            Just(Winner::Llm),
            Just(Winner::InvalidQuestion),
            Just(Winner::SystemError),
        ]
    }

    #[test]
    fn test_all_student_wins_pass() {
        let results = run(&[Winner::Student, Winner::Student, Winner::Student]);
        assert!(results.passes());
        assert_eq!(results.marker(), OutcomeMarker::Win);
        assert_eq!(results.success_rate(), 1.0);
        assert!(results.completed());
    }

    #[test]
    fn test_one_llm_win_fails() {
        let results = run(&[Winner::Student, Winner::Student, Winner::Llm]);
        assert!(!results.passes());
        assert_eq!(results.marker(), OutcomeMarker::Lose);
        assert!((results.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_system_error_excluded_from_rate() {
        let results = run(&[Winner::Student, Winner::SystemError]);
        assert_eq!(results.valid_questions(), 2);
        assert_eq!(results.system_errors(), 1);
        assert_eq!(results.evaluated_total(), 1);
        assert_eq!(results.success_rate(), 1.0);
        assert!(results.passes());
    }

    #[test]
    fn test_only_system_errors_never_pass() {
        let results = run(&[Winner::SystemError, Winner::SystemError]);
        assert_eq!(results.evaluated_total(), 0);
        assert_eq!(results.success_rate(), 0.0);
        assert!(!results.passes());
    }

    #[test]
    fn test_empty_quiz_never_passes() {
        let results = run(&[]);
        assert_eq!(results.total_questions(), 0);
        assert!(!results.passes());
        assert_eq!(results.marker(), OutcomeMarker::Lose);
    }

    #[test]
    fn test_interrupted_run_never_passes() {
        let mut tally = ChallengeTally::new(None, "m", "j", 3);
        tally.record(outcome(1, Winner::Student));
        let results = tally.finish_interrupted();
        assert!(!results.completed());
        assert!(!results.passes());

        let mut tally = ChallengeTally::new(None, "m", "j", 3);
        tally.record(outcome(1, Winner::Student));
        let results = tally.finish();
        assert!(!results.completed());
        assert!(!results.passes());
    }

    #[test]
    fn test_evaluator_failure_counted_as_llm_win() {
        let failed = QuestionResult::evaluated(
            question(1),
            accepted(),
            "some answer",
            EvaluationResult::failed("judge timed out"),
        );
        let mut tally = ChallengeTally::new(None, "m", "j", 1);
        tally.record(failed);
        let results = tally.finish();
        assert_eq!(results.llm_wins(), 1);
        assert_eq!(results.evaluator_failures(), 1);
        assert!(!results.passes());
    }

    #[test]
    fn test_json_round_trip() {
        let mut results = run(&[
            Winner::Student,
            Winner::InvalidQuestion,
            Winner::SystemError,
            Winner::Llm,
        ]);
        results
            .metadata_mut()
            .insert("total_tokens".to_string(), "1234".to_string());

        let json = results.to_json().unwrap();
        assert!(json.contains(LOSE_MARKER));
        assert!(json.contains("\"Invalid Question\""));

        let restored = ChallengeResults::from_json(&json).unwrap();
        assert_eq!(restored, results);
    }

    #[test]
    fn test_statistics_persisted_and_recomputed() {
        let results = run(&[Winner::Student, Winner::Student, Winner::InvalidQuestion]);
        assert_eq!(results.statistics().performance_level, PerformanceLevel::Excellent);
        assert_eq!(results.statistics().errors.validation, 1);

        let mut value: serde_json::Value = serde_json::from_str(&results.to_json().unwrap()).unwrap();
        assert_eq!(value["statistics"]["performance_level"], "excellent");
        assert_eq!(value["statistics"]["difficulty"], "very_challenging");

        value["statistics"]["performance_level"] = serde_json::json!("poor");
        let restored = ChallengeResults::from_json(&value.to_string()).unwrap();
        assert_eq!(restored.statistics(), results.statistics());
    }

    #[test]
    fn test_tampered_json_rejected() {
        let results = run(&[Winner::Student, Winner::Llm]);
        let mut value: serde_json::Value = serde_json::from_str(&results.to_json().unwrap()).unwrap();
        value["llm_wins"] = serde_json::json!(0);
        value["passes"] = serde_json::json!(true);

        let err = ChallengeResults::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, ResultsError::Inconsistent(_)));
    }

    #[test]
    fn test_save_and_load() {
        let results = run(&[Winner::Student]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        results.save(&path).unwrap();
        assert_eq!(ChallengeResults::load(&path).unwrap(), results);
    }

    proptest! {
        #[test]
        fn prop_zero_valid_never_passes(invalid in 0usize..20) {
            let winners = vec![Winner::InvalidQuestion; invalid];
            let results = run(&winners);
            prop_assert_eq!(results.valid_questions(), 0);
            prop_assert!(!results.passes());
        }

        #[test]
        fn prop_any_llm_win_fails(winners in proptest::collection::vec(winner_strategy(), 0..30)) {
            let results = run(&winners);
            if winners.contains(&Winner::Llm) {
                prop_assert!(!results.passes());
            }
        }

        #[test]
        fn prop_passes_matches_definition(winners in proptest::collection::vec(winner_strategy(), 0..30)) {
            let results = run(&winners);
            let expected = results.valid_questions() > 0
                && results.evaluated_total() > 0
                && results.success_rate() >= 1.0;
            prop_assert_eq!(results.passes(), expected);
            prop_assert_eq!(results.marker() == OutcomeMarker::Win, expected);
        }

        #[test]
        fn prop_system_errors_do_not_change_rate(
            winners in proptest::collection::vec(winner_strategy(), 0..20),
            extra_errors in 0usize..5,
        ) {
            let base = run(&winners);
            let mut padded = winners.clone();
            padded.extend(std::iter::repeat(Winner::SystemError).take(extra_errors));
            let with_errors = run(&padded);

            prop_assert_eq!(base.evaluated_total(), with_errors.evaluated_total());
            prop_assert_eq!(base.success_rate(), with_errors.success_rate());
        }

        #[test]
        fn prop_counts_partition_processed(winners in proptest::collection::vec(winner_strategy(), 0..30)) {
            let results = run(&winners);
            prop_assert_eq!(results.valid_questions() + results.invalid_questions(), winners.len());
            prop_assert!(results.system_errors() <= results.valid_questions());
            prop_assert_eq!(
                results.valid_questions(),
                results.evaluated_total() + results.system_errors()
            );
        }

        #[test]
        fn prop_json_round_trip_preserves_counts(winners in proptest::collection::vec(winner_strategy(), 0..12)) {
            let results = run(&winners);
            let restored = ChallengeResults::from_json(&results.to_json().unwrap()).unwrap();
            prop_assert_eq!(restored.scoreboard(), results.scoreboard());
            let original: Vec<Winner> = results.question_results().iter().map(|r| r.winner).collect();
            let round_tripped: Vec<Winner> = restored.question_results().iter().map(|r| r.winner).collect();
            prop_assert_eq!(original, round_tripped);
        }
    }
}
