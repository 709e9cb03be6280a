//! Schema validation gate.
//!
//! Schemas are JSON-Schema documents held as [`serde_json::Value`]. The
//! engine only depends on the [`SchemaValidator`] trait; the bundled
//! [`JsonSchemaValidator`] covers the subset of keywords the builders in
//! [`builder`] emit.

pub mod builder;
mod validator;

use serde::{Deserialize, Serialize};

pub use validator::JsonSchemaValidator;

/// A JSON-Schema document.
pub type Schema = serde_json::Value;

/// A single failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field; empty for the payload itself.
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.field, self.reason)
        }
    }
}

/// Field-level detail of a failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    /// Returns true if any violation concerns `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for violation in &self.violations {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Validates payloads against schemas.
pub trait SchemaValidator: Send + Sync {
    /// Returns `Ok(())` if `payload` satisfies `schema`.
    fn validate(
        &self,
        schema: &Schema,
        payload: &serde_json::Value,
    ) -> Result<(), ValidationError>;
}
