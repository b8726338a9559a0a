//! Run statistics for instructors.
//!
//! Everything here is derived from per-question results and recomputed on
//! load, like the scoreboard.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tally::Scoreboard;
use crate::types::{Confidence, IssueKind, QuestionResult, Winner};

/// Banding of the student's win rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Moderate,
    NeedsImprovement,
    #[default]
    Poor,
}

impl PerformanceLevel {
    pub fn from_success_rate(rate: f64) -> Self {
        if rate >= 1.0 {
            PerformanceLevel::Excellent
        } else if rate >= 0.7 {
            PerformanceLevel::Good
        } else if rate >= 0.4 {
            PerformanceLevel::Moderate
        } else if rate > 0.0 {
            PerformanceLevel::NeedsImprovement
        } else {
            PerformanceLevel::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceLevel::Excellent => "excellent",
            PerformanceLevel::Good => "good",
            PerformanceLevel::Moderate => "moderate",
            PerformanceLevel::NeedsImprovement => "needs improvement",
            PerformanceLevel::Poor => "poor",
        }
    }
}

/// How hard the judged questions were for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    VeryChallenging,
    ModeratelyChallenging,
    SomewhatChallenging,
    TooEasy,
    #[default]
    NotAssessed,
}

impl DifficultyLevel {
    /// `score` is the share of cleanly judged questions that stumped the model.
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => DifficultyLevel::NotAssessed,
            Some(s) if s >= 0.8 => DifficultyLevel::VeryChallenging,
            Some(s) if s >= 0.5 => DifficultyLevel::ModeratelyChallenging,
            Some(s) if s >= 0.2 => DifficultyLevel::SomewhatChallenging,
            Some(_) => DifficultyLevel::TooEasy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::VeryChallenging => "very challenging",
            DifficultyLevel::ModeratelyChallenging => "moderately challenging",
            DifficultyLevel::SomewhatChallenging => "somewhat challenging",
            DifficultyLevel::TooEasy => "too easy",
            DifficultyLevel::NotAssessed => "not assessed",
        }
    }
}

/// Judge confidence over successful evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfidenceCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ConfidenceCounts {
    fn add(&mut self, confidence: Confidence) {
        match confidence {
            Confidence::High => self.high += 1,
            Confidence::Medium => self.medium += 1,
            Confidence::Low => self.low += 1,
        }
    }
}

/// Where processing stopped short of a clean verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorCounts {
    /// Rejected by validation, blank, or missing an answer
    pub validation: usize,

    /// Model under test unreachable
    pub system: usize,

    /// Judge failed; counted as an LLM win
    pub evaluation: usize,
}

/// Derived view of a run for instructors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChallengeStatistics {
    pub performance_level: PerformanceLevel,

    /// valid / total questions in the quiz
    pub validation_rate: f64,

    /// 1 - system errors / total questions
    pub system_reliability: f64,

    pub difficulty: DifficultyLevel,

    /// Share of cleanly judged questions the student won
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_score: Option<f64>,

    /// Questions with a verdict from a working judge
    pub judged_questions: usize,

    /// Mean length of the model's answers, in characters
    pub average_answer_chars: f64,

    pub confidence: ConfidenceCounts,

    pub errors: ErrorCounts,

    /// Issue tags on rejected questions
    pub issue_counts: BTreeMap<IssueKind, usize>,

    /// Patterns worth an instructor's attention
    pub common_issues: Vec<String>,

    pub recommendations: Vec<String>,
}

impl ChallengeStatistics {
    pub fn compute(scoreboard: &Scoreboard, total_questions: usize, results: &[QuestionResult]) -> Self {
        let mut confidence = ConfidenceCounts::default();
        let mut issue_counts: BTreeMap<IssueKind, usize> = BTreeMap::new();
        let mut answer_chars = 0usize;
        let mut answers = 0usize;
        let mut judged = 0usize;
        let mut stumped = 0usize;

        for result in results {
            if result.winner == Winner::InvalidQuestion {
                for issue in &result.validation.issues {
                    *issue_counts.entry(*issue).or_default() += 1;
                }
            }

            if let Some(answer) = &result.llm_answer {
                answer_chars += answer.chars().count();
                answers += 1;
            }

            if let Some(evaluation) = result.evaluation.as_ref().filter(|e| e.success) {
                confidence.add(evaluation.confidence);
                judged += 1;
                if result.student_wins() {
                    stumped += 1;
                }
            }
        }

        let ratio = |part: usize, whole: usize| if whole == 0 { 0.0 } else { part as f64 / whole as f64 };
        let difficulty_score = (judged > 0).then(|| ratio(stumped, judged));
        let success_rate = scoreboard.success_rate();

        Self {
            performance_level: PerformanceLevel::from_success_rate(success_rate),
            validation_rate: ratio(scoreboard.valid_questions, total_questions),
            system_reliability: if total_questions == 0 {
                1.0
            } else {
                1.0 - ratio(scoreboard.system_errors, total_questions)
            },
            difficulty: DifficultyLevel::from_score(difficulty_score),
            difficulty_score,
            judged_questions: judged,
            average_answer_chars: ratio(answer_chars, answers),
            confidence,
            errors: ErrorCounts {
                validation: scoreboard.invalid_questions,
                system: scoreboard.system_errors,
                evaluation: scoreboard.evaluator_failures,
            },
            issue_counts,
            common_issues: common_issues(scoreboard),
            recommendations: recommendations(scoreboard),
        }
    }
}

fn common_issues(scoreboard: &Scoreboard) -> Vec<String> {
    let mut issues = Vec::new();
    if scoreboard.invalid_questions > scoreboard.valid_questions {
        issues.push("High validation failure rate; focus on question quality".to_string());
    }
    if scoreboard.system_errors > 0 {
        issues.push("The model under test was unreachable for some questions".to_string());
    }
    if scoreboard.evaluator_failures > 0 {
        issues.push("The judge failed on some questions; those count as LLM wins".to_string());
    }
    if scoreboard.evaluated_total() > 0 && scoreboard.student_wins == 0 {
        issues.push("Questions too easy for the model; increase difficulty".to_string());
    }
    issues
}

fn recommendations(scoreboard: &Scoreboard) -> Vec<String> {
    let mut advice = Vec::new();
    if scoreboard.invalid_questions > 0 {
        advice.push("Provide clearer guidelines on what makes a question valid".to_string());
    }
    if scoreboard.evaluated_total() > 0 && scoreboard.success_rate() < 0.3 {
        advice.push(
            "Encourage students to target edge cases and counterintuitive results".to_string(),
        );
    }
    if scoreboard.system_errors > 0 || scoreboard.evaluator_failures > 0 {
        advice.push("Check the model endpoint configuration and rate limits".to_string());
    }
    advice
}
