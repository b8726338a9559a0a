//! JSON Schemas for structured model output.
//!
//! The validator and the evaluator can be asked to reply with JSON that
//! conforms to the schemas in `schemas/`. The same schemas are sent to the
//! provider as a `response_format` and used to check the reply before it is
//! deserialized.

use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

use crate::types::IssueTaxonomy;

/// Embedded validation schema (all issue kinds).
const VALIDATION_SCHEMA_JSON: &str = include_str!("../schemas/validation_result.schema.json");

/// Embedded evaluation schema.
const EVALUATION_SCHEMA_JSON: &str = include_str!("../schemas/evaluation_result.schema.json");

static STANDARD_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static MODULE_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static EVALUATION_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

/// Which structured reply is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    /// Question validation, restricted to a taxonomy's issue kinds
    Validation(IssueTaxonomy),

    /// Answer evaluation
    Evaluation,
}

impl ResponseSchema {
    /// Schema name sent to the provider.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseSchema::Validation(_) => "validation_result",
            ResponseSchema::Evaluation => "evaluation_result",
        }
    }

    /// The JSON Schema document.
    pub fn schema(&self) -> Result<Value, SchemaError> {
        match self {
            ResponseSchema::Validation(taxonomy) => {
                let mut schema = parse_embedded(VALIDATION_SCHEMA_JSON)?;
                let tags: Vec<Value> = taxonomy
                    .kinds()
                    .iter()
                    .map(|kind| Value::String(kind.as_str().to_string()))
                    .collect();

                match schema.pointer_mut("/properties/issues/items/enum") {
                    Some(slot) => *slot = Value::Array(tags),
                    None => {
                        return Err(SchemaError::LoadError(
                            "validation schema has no issues enum".to_string(),
                        ))
                    }
                }
                Ok(schema)
            }
            ResponseSchema::Evaluation => parse_embedded(EVALUATION_SCHEMA_JSON),
        }
    }

    /// Provider `response_format` payload requesting strict schema output.
    ///
    /// Annotation keywords are stripped; strict mode providers reject them.
    pub fn response_format(&self) -> Result<Value, SchemaError> {
        let mut schema = self.schema()?;
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
        }

        Ok(serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name(),
                "strict": true,
                "schema": schema,
            }
        }))
    }

    /// Validate a reply against the schema.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Reply conforms
    /// * `Err(Vec<String>)` - Validation errors with their instance paths
    pub fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        let validator = self.validator().map_err(|e| vec![e.to_string()])?;

        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether a reply conforms. Use `validate` for detailed errors.
    pub fn is_valid(&self, value: &Value) -> bool {
        self.validator()
            .map(|v| v.is_valid(value))
            .unwrap_or(false)
    }

    fn validator(&self) -> Result<&'static jsonschema::Validator, SchemaError> {
        let cell = match self {
            ResponseSchema::Validation(IssueTaxonomy::Standard) => &STANDARD_VALIDATOR,
            ResponseSchema::Validation(IssueTaxonomy::Module) => &MODULE_VALIDATOR,
            ResponseSchema::Evaluation => &EVALUATION_VALIDATOR,
        };

        let compiled = cell.get_or_init(|| {
            let schema = self.schema().map_err(|e| e.to_string())?;
            jsonschema::options()
                .build(&schema)
                .map_err(|e| format!("Failed to compile schema: {}", e))
        });

        match compiled {
            Ok(v) => Ok(v),
            Err(e) => Err(SchemaError::LoadError(e.clone())),
        }
    }
}

fn parse_embedded(raw: &str) -> Result<Value, SchemaError> {
    serde_json::from_str(raw).map_err(|e| SchemaError::LoadError(format!("Invalid schema JSON: {}", e)))
}
