//! Structural validation of rendered documents.

use serde_json::Value;

use crate::error::{ValidateError, Violation};

/// JSON Schema (draft-07) for the top-level shape of a JSON:API document.
pub const DOCUMENT_SCHEMA: &str = include_str!("../schemas/jsonapi.json");

/// Validate `document` against the built-in JSON:API document schema.
///
/// Checks shape only: member names and types, resource identifiers and
/// relationship objects. It does not check that linkage targets appear in
/// `included`.
///
/// # Errors
///
/// Returns `ValidateError::Invalid` listing every violation.
pub fn validate_document(document: &Value) -> Result<(), ValidateError> {
    let schema: Value =
        serde_json::from_str(DOCUMENT_SCHEMA).map_err(|e| ValidateError::InvalidSchema {
            message: e.to_string(),
        })?;
    validate_against_schema(&schema, document)
}

/// Validate `document` against an arbitrary JSON Schema.
pub fn validate_against_schema(schema: &Value, document: &Value) -> Result<(), ValidateError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ValidateError::InvalidSchema {
        message: e.to_string(),
    })?;

    let errors: Vec<Violation> = validator
        .iter_errors(document)
        .map(|e| Violation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(violations = errors.len(), "document failed validation");
        Err(ValidateError::Invalid { errors })
    }
}
