//! Free-text response parsing.
//!
//! Models are asked to reply with one `FIELD: value` line per field. For each
//! field the first matching line wins; later duplicates are ignored. Missing
//! fields fall back to the defaults documented on each parser.

use crate::response::issues::classify_issues;
use crate::types::{
    Confidence, EvaluationResult, IssueTaxonomy, ValidationResult, Verdict,
};

pub const VALIDATION_FIELD: &str = "VALIDATION:";
pub const ISSUES_FIELD: &str = "ISSUES:";
pub const REASON_FIELD: &str = "REASON:";
pub const CONFIDENCE_FIELD: &str = "CONFIDENCE:";
pub const VERDICT_FIELD: &str = "VERDICT:";
pub const EXPLANATION_FIELD: &str = "EXPLANATION:";
pub const STUDENT_WINS_FIELD: &str = "STUDENT_WINS:";

/// Value of the first line starting with `prefix`.
///
/// Leading whitespace and markdown emphasis (`**VERDICT:** X`) are tolerated.
pub fn first_field<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let line = line.trim_start().trim_start_matches(['*', '#', '-', ' ']);
        line.strip_prefix(prefix)
            .map(|value| value.trim().trim_start_matches('*').trim())
    })
}

/// Parse a free-text validation reply.
///
/// Defaults:
/// - no `VALIDATION:` line: `valid = !fail_closed`
/// - `VALIDATION:` present: valid only if the value contains PASS and not
///   FAIL (FAIL is checked first)
/// - no `REASON:` line: the whole reply is the reason
/// - no `CONFIDENCE:` line: MEDIUM
///
/// An empty reply is a parse failure and is always invalid.
pub fn parse_validation(text: &str, taxonomy: IssueTaxonomy, fail_closed: bool) -> ValidationResult {
    let raw = text.trim();
    if raw.is_empty() {
        return ValidationResult::parse_failure("empty validator response", text);
    }

    let valid = match first_field(raw, VALIDATION_FIELD) {
        Some(value) => {
            let upper = value.to_uppercase();
            !upper.contains("FAIL") && upper.contains("PASS")
        }
        None => !fail_closed,
    };

    let issues = first_field(raw, ISSUES_FIELD)
        .map(|value| classify_issues(value, taxonomy))
        .unwrap_or_default();

    let reason = first_field(raw, REASON_FIELD)
        .filter(|value| !value.is_empty())
        .unwrap_or(raw);

    let confidence = first_field(raw, CONFIDENCE_FIELD)
        .and_then(Confidence::from_text)
        .unwrap_or_default();

    ValidationResult::new(valid, issues, reason, confidence).with_raw(text)
}

/// Parse a free-text evaluation reply.
///
/// Defaults:
/// - no recognizable `VERDICT:` line: INCORRECT
/// - no `EXPLANATION:` line: the whole reply is the explanation
/// - no `CONFIDENCE:` line: MEDIUM
/// - `STUDENT_WINS:` containing TRUE or FALSE overrides the verdict-derived value
///
/// An empty reply is a failed evaluation.
pub fn parse_evaluation(text: &str) -> EvaluationResult {
    let raw = text.trim();
    if raw.is_empty() {
        return EvaluationResult::failed("Empty evaluator response").with_raw(text);
    }

    let verdict = first_field(raw, VERDICT_FIELD)
        .and_then(Verdict::from_text)
        .unwrap_or(Verdict::Incorrect);

    let explanation = first_field(raw, EXPLANATION_FIELD)
        .filter(|value| !value.is_empty())
        .unwrap_or(raw);

    let confidence = first_field(raw, CONFIDENCE_FIELD)
        .and_then(Confidence::from_text)
        .unwrap_or_default();

    let explicit = first_field(raw, STUDENT_WINS_FIELD).and_then(|value| {
        let upper = value.to_uppercase();
        if upper.contains("TRUE") {
            Some(true)
        } else if upper.contains("FALSE") {
            Some(false)
        } else {
            None
        }
    });

    EvaluationResult::judged(verdict, explicit, explanation, confidence).with_raw(text)
}
