//! # Validation
//!
//! Runs one compiled schema against one instance document.
//!
//! Every violation is collected in a single pass; nothing stops at the first
//! error. Each violation becomes a [`ValidationError`] carrying the document
//! path where it occurred, the schema keyword path that rejected it, and the
//! validator's human-readable message (`"address" is a required property`,
//! `42 is not of type "string"`).
//!
//! Errors are ordered by document traversal: root before children, siblings
//! in declaration order. Several violations at the same location keep the
//! validator's order. The result is a pure function of (schema, document).

use std::fmt;
use std::path::{Path, PathBuf};

use enforcer_core::{DocumentPath, SchemaId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Schema;

/// Outcome of checking one document against one schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The document conforms.
    Pass,
    /// At least one violation.
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail => f.write_str("FAIL"),
        }
    }
}

/// A single located violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Keys and indices from the document root to the offending value.
    pub path: DocumentPath,
    /// Human-readable description of the violated rule.
    pub message: String,
    /// JSON Pointer to the schema keyword that rejected the value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_path: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Result of validating one instance against one schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Schema that was applied.
    pub schema_id: SchemaId,
    /// Instance document that was checked.
    pub instance: PathBuf,
    /// PASS or FAIL.
    pub outcome: Outcome,
    /// Violations in document order; empty on PASS.
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Whether the instance conformed.
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// Validate `instance` (read from `instance_path`) against `schema`.
///
/// A schema that failed to compile yields FAIL with a single root-level
/// error naming the compile failure.
pub fn validate(schema: &Schema, instance_path: &Path, instance: &Value) -> ValidationResult {
    let errors = match schema.validator() {
        Some(validator) => {
            let mut errors: Vec<ValidationError> = validator
                .iter_errors(instance)
                .map(|e| ValidationError {
                    path: DocumentPath::from_json_pointer(&e.instance_path.to_string(), instance),
                    message: e.to_string(),
                    schema_path: e.schema_path.to_string(),
                })
                .collect();
            errors.sort_by_cached_key(|e| e.path.document_position(instance));
            errors
        }
        None => vec![ValidationError {
            path: DocumentPath::root(),
            message: format!(
                "schema {} is not runnable: {}",
                schema.id(),
                schema.compile_error().unwrap_or("unknown compile failure")
            ),
            schema_path: String::new(),
        }],
    };

    let outcome = if errors.is_empty() {
        Outcome::Pass
    } else {
        Outcome::Fail
    };
    tracing::debug!(
        schema_id = %schema.id(),
        instance = %instance_path.display(),
        %outcome,
        error_count = errors.len(),
        "validated"
    );
    ValidationResult {
        schema_id: schema.id().clone(),
        instance: instance_path.to_path_buf(),
        outcome,
        errors,
    }
}
