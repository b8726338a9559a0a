//! Structured (JSON) response parsing.
//!
//! Replies are checked against the embedded schemas before deserializing,
//! so a reply that parses as JSON but violates the contract (unknown issue
//! tag, missing field, extra field) is rejected rather than half-read.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::schema::{ResponseSchema, SchemaError};
use crate::types::{
    Confidence, EvaluationResult, IssueKind, IssueTaxonomy, ValidationResult, Verdict,
};

lazy_static! {
    /// A fenced ```json block
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*\})\s*```").unwrap();
}

/// Errors from structured parsing.
#[derive(Error, Debug)]
pub enum StructuredParseError {
    #[error("No JSON object in response")]
    NoJson,

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Schema violation: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Deserialize)]
struct ValidationPayload {
    valid: bool,
    issues: Vec<IssueKind>,
    reason: String,
    confidence: Confidence,
}

#[derive(Debug, Deserialize)]
struct EvaluationPayload {
    explanation: String,
    verdict: Verdict,
    confidence: Confidence,
    student_wins: bool,
}

/// Locate the JSON object in a reply.
///
/// Accepts a bare object, a fenced block, or an object embedded in prose.
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(caps) = FENCED_JSON.captures(trimmed) {
        return caps.get(1).map(|m| m.as_str());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn checked_value(text: &str, schema: ResponseSchema) -> Result<serde_json::Value, StructuredParseError> {
    let json = extract_json(text).ok_or(StructuredParseError::NoJson)?;
    let value: serde_json::Value = serde_json::from_str(json)?;
    schema
        .validate(&value)
        .map_err(StructuredParseError::SchemaViolation)?;
    Ok(value)
}

/// Parse a structured validation reply.
pub fn parse_validation(
    text: &str,
    taxonomy: IssueTaxonomy,
) -> Result<ValidationResult, StructuredParseError> {
    let value = checked_value(text, ResponseSchema::Validation(taxonomy))?;
    let payload: ValidationPayload = serde_json::from_value(value)?;

    let issues: BTreeSet<IssueKind> = payload.issues.into_iter().collect();
    Ok(
        ValidationResult::new(payload.valid, issues, payload.reason, payload.confidence)
            .with_raw(text),
    )
}

/// Parse a structured evaluation reply.
pub fn parse_evaluation(text: &str) -> Result<EvaluationResult, StructuredParseError> {
    let value = checked_value(text, ResponseSchema::Evaluation)?;
    let payload: EvaluationPayload = serde_json::from_value(value)?;

    Ok(EvaluationResult::judged(
        payload.verdict,
        Some(payload.student_wins),
        payload.explanation,
        payload.confidence,
    )
    .with_raw(text))
}
