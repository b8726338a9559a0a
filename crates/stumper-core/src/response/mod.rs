//! Response parsing for validator and evaluator replies.
//!
//! Two formats are understood:
//! - **Structured**: JSON checked against the embedded schemas
//! - **Text**: one `FIELD: value` line per field (legacy)
//!
//! The functions at this level never fail. Anything that cannot be read
//! degrades to a safe result: an invalid question, or a failed evaluation
//! that does not count as a student win.

pub mod issues;
pub mod structured;
pub mod text;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{EvaluationResult, IssueTaxonomy, ValidationResult};

pub use structured::StructuredParseError;

/// Reply format requested from the models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    Structured,
    Text,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Structured => f.write_str("structured"),
            ResponseMode::Text => f.write_str("text"),
        }
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" | "json" => Ok(ResponseMode::Structured),
            "text" | "legacy" => Ok(ResponseMode::Text),
            other => Err(format!("unknown response mode: {}", other)),
        }
    }
}

/// Parse a validator reply.
///
/// `fail_closed` only affects text replies with no `VALIDATION:` line.
pub fn parse_validation(
    mode: ResponseMode,
    reply: &str,
    taxonomy: IssueTaxonomy,
    fail_closed: bool,
) -> ValidationResult {
    match mode {
        ResponseMode::Text => text::parse_validation(reply, taxonomy, fail_closed),
        ResponseMode::Structured => match structured::parse_validation(reply, taxonomy) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Structured validation reply rejected");
                ValidationResult::parse_failure(format!("JSON parsing failed: {}", e), reply)
            }
        },
    }
}

/// Parse an evaluator reply.
pub fn parse_evaluation(mode: ResponseMode, reply: &str) -> EvaluationResult {
    match mode {
        ResponseMode::Text => text::parse_evaluation(reply),
        ResponseMode::Structured => match structured::parse_evaluation(reply) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Structured evaluation reply rejected");
                EvaluationResult::failed(format!("JSON parsing failed: {}", e)).with_raw(reply)
            }
        },
    }
}
