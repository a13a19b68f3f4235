//! Payload schema validation.
//!
//! The pipeline only needs one thing from a schema: given a parsed payload,
//! produce a validated value or a structured violation. [`Schema`] is the
//! trait seam for that; events registered without a schema use [`AnySchema`],
//! which accepts everything.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// A single validation problem, anchored to a payload path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Dot-separated path into the payload (`""` for the root).
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    /// Issue at the payload root.
    pub fn root(message: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            message: message.into(),
        }
    }

    /// Issue at a specific path.
    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Structured validation failure carrying every detected issue.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", self.describe())]
pub struct SchemaViolation {
    pub issues: Vec<SchemaIssue>,
}

impl SchemaViolation {
    /// Violation with a single issue.
    pub fn single(issue: SchemaIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    fn describe(&self) -> String {
        self.issues
            .iter()
            .map(|issue| {
                if issue.path.is_empty() {
                    issue.message.clone()
                } else {
                    format!("{}: {}", issue.path, issue.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validator contract used by the receiver pipeline.
///
/// On success returns the validated payload value; on failure a
/// [`SchemaViolation`] describing what was wrong.
pub trait Schema: Send + Sync {
    fn validate(&self, value: &Value) -> Result<Value, SchemaViolation>;
}

/// Schema that accepts any payload unchanged.
///
/// Events registered without an explicit schema use this; validation
/// trivially succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnySchema;

impl Schema for AnySchema {
    fn validate(&self, value: &Value) -> Result<Value, SchemaViolation> {
        Ok(value.clone())
    }
}

/// Schema backed by a deserializable type.
///
/// The payload is valid when it deserializes as `T`. The validated value is
/// the original JSON, so handlers keep access to fields `T` does not model.
///
/// # Examples
///
/// ```rust
/// use better_webhook_core::schema::{Schema, TypedSchema};
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct PushEvent {
///     r#ref: String,
/// }
///
/// let schema = TypedSchema::<PushEvent>::new();
/// assert!(schema.validate(&json!({"ref": "refs/heads/main"})).is_ok());
/// assert!(schema.validate(&json!({"unrelated": true})).is_err());
/// ```
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedSchema<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Schema for TypedSchema<T> {
    fn validate(&self, value: &Value) -> Result<Value, SchemaViolation> {
        match serde_json::from_value::<T>(value.clone()) {
            Ok(_) => Ok(value.clone()),
            Err(e) => Err(SchemaViolation::single(SchemaIssue::root(e.to_string()))),
        }
    }
}

/// Schema backed by a closure.
///
/// Useful for one-off structural checks without defining a type.
#[derive(Clone)]
pub struct FnSchema {
    check: Arc<dyn Fn(&Value) -> Result<Value, SchemaViolation> + Send + Sync>,
}

impl FnSchema {
    pub fn new(
        check: impl Fn(&Value) -> Result<Value, SchemaViolation> + Send + Sync + 'static,
    ) -> Self {
        Self {
            check: Arc::new(check),
        }
    }
}

impl Schema for FnSchema {
    fn validate(&self, value: &Value) -> Result<Value, SchemaViolation> {
        (self.check)(value)
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
