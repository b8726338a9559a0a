//! Validation summary for pre-flight checks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{IssueKind, ValidationResult};

/// Aggregate view over a batch of validation results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_questions: usize,
    pub valid_questions: usize,
    pub invalid_questions: usize,

    /// valid / total, 0.0 for an empty batch
    pub validation_rate: f64,

    /// How many questions were flagged with each issue kind
    pub issue_counts: BTreeMap<IssueKind, usize>,

    /// Advice for the student, one line per issue kind found
    pub recommendations: Vec<String>,
}

impl ValidationSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ValidationResult>) -> Self {
        let mut total = 0;
        let mut valid = 0;
        let mut issue_counts: BTreeMap<IssueKind, usize> = BTreeMap::new();

        for result in results {
            total += 1;
            if result.valid {
                valid += 1;
            }
            for issue in &result.issues {
                *issue_counts.entry(*issue).or_default() += 1;
            }
        }

        let recommendations = if issue_counts.is_empty() && valid == total {
            vec!["All questions passed validation.".to_string()]
        } else {
            issue_counts.keys().map(|kind| recommendation(*kind).to_string()).collect()
        };

        Self {
            total_questions: total,
            valid_questions: valid,
            invalid_questions: total - valid,
            validation_rate: if total == 0 { 0.0 } else { valid as f64 / total as f64 },
            issue_counts,
            recommendations,
        }
    }

    pub fn all_valid(&self) -> bool {
        self.total_questions > 0 && self.invalid_questions == 0
    }
}

fn recommendation(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::HeavyMath => {
            "Focus on conceptual understanding rather than complex calculations."
        }
        IssueKind::PromptInjection => {
            "Ask straightforward questions; do not instruct the model how to answer."
        }
        IssueKind::AnswerQuality => {
            "Double-check your reference answers against the course material."
        }
        IssueKind::ContextMismatch => {
            "Make sure questions relate to the provided course materials."
        }
        IssueKind::OffTopic => "Keep questions within the subject of the course.",
        IssueKind::ModuleMismatch => {
            "Make sure questions cover the topics of the selected module."
        }
    }
}
