//! # stumper-core
//!
//! Result types, response parsing and pass/fail policy for LLM quiz
//! challenges.
//!
//! A student writes quiz questions with reference answers. Each question is
//! validated for fairness, answered by a model under test, and the answer is
//! judged against the reference. The student wins a question when the model
//! gets it wrong, and passes the challenge only by winning every evaluated
//! question.
//!
//! ## Key Guarantees
//!
//! 1. **No network**: Everything here is pure; LLM calls live in `stumper-runtime`
//! 2. **Never panics on model output**: Unreadable replies degrade to an
//!    invalid question or a failed evaluation, never to a student win
//! 3. **Derived outcomes**: Winners, rates and the pass decision are computed
//!    from recorded results, never set directly
//!
//! ## Example
//!
//! ```rust,ignore
//! use stumper_core::{ChallengeTally, Quiz, QuestionResult, response};
//!
//! let quiz = Quiz::from_file("quiz.toml")?;
//! let mut tally = ChallengeTally::new(quiz.title.clone(), "gpt-4o-mini", "gpt-4o", quiz.len());
//!
//! for question in quiz.questions {
//!     let validation = response::parse_validation(mode, &validator_reply, taxonomy, true);
//!     if !validation.valid {
//!         tally.record(QuestionResult::invalid(question, validation));
//!         continue;
//!     }
//!     // ... answer and evaluate ...
//! }
//!
//! let results = tally.finish();
//! println!("{}", results.marker());
//! ```

pub mod quiz;
pub mod response;
pub mod schema;
pub mod statistics;
pub mod summary;
pub mod tally;
pub mod types;

// Re-export main types at crate root
pub use quiz::{Quiz, QuizEntry, QuizError};
pub use response::{ResponseMode, StructuredParseError};
pub use schema::{ResponseSchema, SchemaError};
pub use statistics::{
    ChallengeStatistics, ConfidenceCounts, DifficultyLevel, ErrorCounts, PerformanceLevel,
};
pub use summary::ValidationSummary;
pub use tally::{
    ChallengeResults, ChallengeTally, OutcomeMarker, ResultsError, Scoreboard, LOSE_MARKER,
    PASS_CRITERIA, WIN_MARKER,
};
pub use types::{
    CandidateAnswer, Confidence, EvaluationResult, IssueKind, IssueTaxonomy, Question,
    QuestionResult, ValidationResult, Verdict, Winner,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Any reply whose verdict line mentions INCORRECT is INCORRECT, even
        // when it also mentions CORRECT.
        #[test]
        fn prop_incorrect_takes_precedence(prefix in "[a-z ]{0,10}", suffix in "[A-Za-z ]{0,20}") {
            let reply = format!("VERDICT: {}INCORRECT{}", prefix, suffix);
            let result = response::text::parse_evaluation(&reply);
            prop_assert_eq!(result.verdict, Verdict::Incorrect);
            prop_assert!(result.student_wins);
        }

        // Transport-level validation failures are never valid.
        #[test]
        fn prop_unavailable_is_invalid(error in ".{0,40}") {
            let result = ValidationResult::unavailable(&error);
            prop_assert!(!result.valid);
            prop_assert!(!result.reason.is_empty());
        }

        // Free text without a VALIDATION line follows the fail_closed flag.
        #[test]
        fn prop_missing_validation_line_follows_flag(body in "[a-z ]{1,40}", fail_closed in any::<bool>()) {
            let result = response::text::parse_validation(&body, IssueTaxonomy::Standard, fail_closed);
            if body.trim().is_empty() {
                prop_assert!(!result.valid);
            } else {
                prop_assert_eq!(result.valid, !fail_closed);
            }
        }
    }

    #[test]
    fn test_end_to_end_tally_from_replies() {
        let question = Question::new(1, "Why does BFS find shortest paths in unweighted graphs?", "Layers");
        let validation = response::parse_validation(
            ResponseMode::Text,
            "VALIDATION: PASS\nISSUES: none\nREASON: Fair\nCONFIDENCE: HIGH",
            IssueTaxonomy::Standard,
            true,
        );
        assert!(validation.valid);

        let evaluation = response::parse_evaluation(
            ResponseMode::Structured,
            r#"{"explanation": "Missed the layering argument", "verdict": "INCORRECT", "confidence": "HIGH", "student_wins": true}"#,
        );

        let mut tally = ChallengeTally::new(None, "quiz", "judge", 1);
        tally.record(QuestionResult::evaluated(question, validation, "Because it is greedy", evaluation));
        let results = tally.finish();

        assert!(results.passes());
        assert_eq!(results.marker().as_str(), WIN_MARKER);
    }
}
