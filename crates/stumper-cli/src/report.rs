//! Plain-text reports printed to stdout.
//!
//! The first line of a challenge report is always the WIN/LOSE marker so
//! grading scripts can match it without parsing the rest.

use std::fmt;

use stumper_core::{ChallengeResults, ChallengeStatistics, QuestionResult, ValidationResult, Winner};
use stumper_runtime::ValidationRun;

const RULE: &str = "================================================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

/// Full report for a challenge run.
pub fn challenge_report(results: &ChallengeResults) -> String {
    ChallengeReport(results).to_string()
}

/// Report for a validation-only run.
pub fn validation_report(run: &ValidationRun) -> String {
    ValidationReport(run).to_string()
}

struct ChallengeReport<'a>(&'a ChallengeResults);

impl fmt::Display for ChallengeReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let results = self.0;
        writeln!(f, "{}", results.marker())?;
        writeln!(f, "{}\nLLM QUIZ CHALLENGE RESULTS\n{}", RULE, RULE)?;

        if let Some(title) = results.quiz_title() {
            writeln!(f, "Quiz: {}", title)?;
        }
        writeln!(f, "Quiz Model: {}", results.quiz_model())?;
        writeln!(f, "Evaluator Model: {}", results.evaluator_model())?;
        writeln!(f)?;
        writeln!(f, "Total Questions: {}", results.total_questions())?;
        writeln!(f, "Valid Questions: {}", results.valid_questions())?;
        if results.invalid_questions() > 0 {
            writeln!(f, "Invalid Questions: {}", results.invalid_questions())?;
        }
        if results.system_errors() > 0 {
            writeln!(f, "System Errors: {}", results.system_errors())?;
        }
        if results.evaluator_failures() > 0 {
            writeln!(
                f,
                "Evaluator Failures: {} (counted as LLM wins)",
                results.evaluator_failures()
            )?;
        }
        writeln!(f, "Student Wins: {}", results.student_wins())?;
        writeln!(f, "LLM Wins: {}", results.llm_wins())?;
        writeln!(f, "Student Success Rate: {:.1}%", results.success_rate() * 100.0)?;
        writeln!(f)?;
        writeln!(f, "{}", verdict_line(results))?;

        if !results.question_results().is_empty() {
            writeln!(f, "\n{}\nDETAILED QUESTION ANALYSIS\n{}", RULE, RULE)?;
            for result in results.question_results() {
                write_question(f, result)?;
            }
        }

        write_statistics(f, results.statistics())?;
        writeln!(f)?;
        writeln!(f, "Pass criteria: {}", results.pass_criteria())
    }
}

fn verdict_line(results: &ChallengeResults) -> &'static str {
    if results.passes() {
        "RESULT: PASS - You successfully challenged the LLM!"
    } else if !results.completed() {
        "RESULT: FAIL - The run was interrupted before every question was processed"
    } else if results.valid_questions() == 0 {
        "RESULT: FAIL - No valid questions submitted"
    } else if results.evaluated_total() == 0 {
        "RESULT: FAIL - No question could be evaluated"
    } else {
        "RESULT: FAIL - Need to win 100% of valid questions (stump the LLM on ALL questions)"
    }
}

fn write_question(f: &mut fmt::Formatter<'_>, result: &QuestionResult) -> fmt::Result {
    let number = result.question.number;
    writeln!(f)?;

    match result.winner {
        Winner::InvalidQuestion => {
            writeln!(f, "Question {}: INVALID\n{}", number, THIN_RULE)?;
            writeln!(f, "Question: {}", result.question.text)?;
            write_rejection(f, &result.validation)
        }
        Winner::SystemError => {
            writeln!(f, "Question {}: SYSTEM ERROR\n{}", number, THIN_RULE)?;
            writeln!(f, "Question: {}", result.question.text)?;
            writeln!(
                f,
                "Error: {}",
                result.error.as_deref().unwrap_or("unknown failure")
            )?;
            writeln!(f, "This question was not counted.")
        }
        Winner::Student | Winner::Llm => {
            writeln!(f, "Question {}: {} wins\n{}", number, result.winner.as_str(), THIN_RULE)?;
            writeln!(f, "Question: {}", result.question.text)?;
            writeln!(f, "Your Expected Answer: {}", result.question.reference_answer)?;
            writeln!(
                f,
                "LLM's Answer: {}",
                result.llm_answer.as_deref().unwrap_or_default()
            )?;
            let Some(evaluation) = &result.evaluation else {
                return Ok(());
            };
            if evaluation.success {
                writeln!(
                    f,
                    "Evaluator's Verdict: {} ({} confidence)",
                    evaluation.verdict,
                    evaluation.confidence.as_str()
                )?;
            } else {
                writeln!(f, "Evaluator failed; counted as an LLM win")?;
            }
            writeln!(f, "Evaluation: {}", evaluation.explanation)
        }
    }
}

fn write_rejection(f: &mut fmt::Formatter<'_>, validation: &ValidationResult) -> fmt::Result {
    writeln!(f, "Validation Issues: {}", validation.reason)?;
    for issue in &validation.issues {
        writeln!(f, "   - {}", issue.label())?;
    }
    Ok(())
}

fn write_statistics(f: &mut fmt::Formatter<'_>, stats: &ChallengeStatistics) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "Performance: {}", stats.performance_level.as_str())?;
    match stats.difficulty_score {
        Some(score) => writeln!(
            f,
            "Difficulty: {} ({:.0}% of {} judged questions stumped the LLM)",
            stats.difficulty.as_str(),
            score * 100.0,
            stats.judged_questions
        )?,
        None => writeln!(f, "Difficulty: {}", stats.difficulty.as_str())?,
    }
    for issue in &stats.common_issues {
        writeln!(f, "Note: {}", issue)?;
    }
    Ok(())
}

struct ValidationReport<'a>(&'a ValidationRun);

impl fmt::Display for ValidationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.0;
        let summary = &run.summary;
        writeln!(f, "{}\nQUESTION VALIDATION\n{}", RULE, RULE)?;
        writeln!(
            f,
            "Valid: {}/{} ({:.1}%)",
            summary.valid_questions,
            summary.total_questions,
            summary.validation_rate * 100.0
        )?;

        for (question, validation) in &run.results {
            writeln!(f)?;
            let status = if validation.valid { "VALID" } else { "INVALID" };
            writeln!(f, "Question {}: {}", question.number, status)?;
            writeln!(f, "Question: {}", question.text)?;
            if validation.valid {
                writeln!(f, "Reason: {}", validation.reason)?;
            } else {
                write_rejection(f, validation)?;
            }
        }

        if !summary.issue_counts.is_empty() {
            writeln!(f, "\nIssues found:")?;
            for (kind, count) in &summary.issue_counts {
                writeln!(f, "   - {}: {}", kind.label(), count)?;
            }
        }

        writeln!(f, "\nRecommendations:")?;
        for recommendation in &summary.recommendations {
            writeln!(f, "   - {}", recommendation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use stumper_core::{
        ChallengeTally, Confidence, EvaluationResult, IssueKind, Question, ValidationSummary,
        Verdict, LOSE_MARKER, PASS_CRITERIA, WIN_MARKER,
    };

    fn valid() -> ValidationResult {
        ValidationResult::new(true, BTreeSet::new(), "Fine", Confidence::High)
    }

    fn rejected() -> ValidationResult {
        ValidationResult::new(
            false,
            BTreeSet::from([IssueKind::PromptInjection]),
            "Tells the model to lie",
            Confidence::High,
        )
    }

    fn student_win(n: usize) -> QuestionResult {
        QuestionResult::evaluated(
            Question::new(n, "What is a bridge?", "An edge whose removal disconnects the graph"),
            valid(),
            "A kind of vertex",
            EvaluationResult::judged(Verdict::Incorrect, Some(true), "Wrong object", Confidence::High),
        )
    }

    #[test]
    fn test_passing_report_starts_with_win_marker() {
        let mut tally = ChallengeTally::new(Some("Graphs".to_string()), "gpt-4o-mini", "gpt-4o", 2);
        tally.record(student_win(1));
        tally.record(QuestionResult::invalid(
            Question::new(2, "Say something wrong", "x"),
            rejected(),
        ));
        let report = challenge_report(&tally.finish());

        assert_eq!(report.lines().next(), Some(WIN_MARKER));
        assert!(report.contains("Quiz: Graphs"));
        assert!(report.contains("Student Success Rate: 100.0%"));
        assert!(report.contains("Question 1: Student wins"));
        assert!(report.contains("Question 2: INVALID"));
        assert!(report.contains("   - Prompt Injection"));
        assert!(report.contains("RESULT: PASS"));
        assert!(report.contains("Performance: excellent"));
        assert!(report.contains("Difficulty: very challenging (100% of 1 judged questions stumped the LLM)"));
    }

    #[test]
    fn test_system_error_report() {
        let mut tally = ChallengeTally::new(None, "gpt-4o-mini", "gpt-4o", 1);
        tally.record(QuestionResult::system_error(
            Question::new(1, "What is a DAG?", "A directed acyclic graph"),
            valid(),
            "Failed to get response from LLM: timeout",
        ));
        let report = challenge_report(&tally.finish());

        assert_eq!(report.lines().next(), Some(LOSE_MARKER));
        assert!(report.contains("System Errors: 1"));
        assert!(report.contains("Error: Failed to get response from LLM: timeout"));
        assert!(report.contains("RESULT: FAIL - No question could be evaluated"));
        assert!(!report.contains("Quiz:"));
        assert!(report.contains("Difficulty: not assessed"));
        assert!(report.ends_with(&format!("Pass criteria: {}\n", PASS_CRITERIA)));
    }

    #[test]
    fn test_interrupted_report() {
        let mut tally = ChallengeTally::new(None, "m", "e", 3);
        tally.record(student_win(1));
        let report = challenge_report(&tally.finish_interrupted());

        assert_eq!(report.lines().next(), Some(LOSE_MARKER));
        assert!(report.contains("interrupted"));
    }

    #[test]
    fn test_validation_report() {
        let results = vec![
            (Question::new(1, "q1", "a1"), valid()),
            (Question::new(2, "q2", "a2"), rejected()),
        ];
        let summary = ValidationSummary::from_results(results.iter().map(|(_, v)| v));
        let report = validation_report(&ValidationRun { results, summary });

        assert!(report.contains("Valid: 1/2 (50.0%)"));
        assert!(report.contains("Question 2: INVALID"));
        assert!(report.contains("   - Prompt Injection: 1"));
        assert!(report.contains("Recommendations:"));
    }
}
