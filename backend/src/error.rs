//! Error types for the validation layer and its repository collaborators.
//!
//! `ValidationError` is produced by parsers and builders and always carries
//! every violation found, never just the first. `RepositoryError` is produced
//! at execution time by a [`Repository`](crate::repository::Repository).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single violation: where it happened and what is wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path segments from the root of the input (`["budget", "create", "0", "total"]`)
    pub path: Vec<String>,
    /// Human readable reason
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: &[String], message: impl Into<String>) -> Self {
        Self {
            path: path.to_vec(),
            message: message.into(),
        }
    }

    /// Dotted form of the path, `<root>` for the top level.
    pub fn dotted_path(&self) -> String {
        if self.path.is_empty() {
            "<root>".to_string()
        } else {
            self.path.join(".")
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.dotted_path(), self.message)
    }
}

/// Input shape, type or enum membership is invalid.
///
/// Also used as an accumulator while validating: start from
/// `ValidationError::default()`, `push` issues, then `finish`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("validation failed: {}", summarize(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Error with a single issue.
    pub fn single(path: &[String], message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue::new(path, message)],
        }
    }

    pub fn push(&mut self, path: &[String], message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(path, message));
    }

    pub fn extend(&mut self, other: ValidationError) {
        self.issues.extend(other.issues);
    }

    /// Record the error side of a result and hand back the success side.
    pub fn absorb<T>(&mut self, result: Result<T, ValidationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.extend(err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// `Ok(value)` when no issue was recorded.
    pub fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.issues.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// Whether any issue points exactly at `path`.
    pub fn has_path(&self, path: &[&str]) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.path.iter().map(String::as_str).eq(path.iter().copied()))
    }

    /// Messages grouped by dotted path, for form-field display.
    pub fn field_messages(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for issue in &self.issues {
            out.entry(issue.dotted_path())
                .or_default()
                .push(issue.message.clone());
        }
        out
    }
}

/// Extend a path with one more segment.
pub(crate) fn path_with(path: &[String], segment: impl ToString) -> Vec<String> {
    let mut next = path.to_vec();
    next.push(segment.to_string());
    next
}

/// Errors surfaced by a repository while executing a validated descriptor.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The descriptor itself was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A connect/update target or a foreign key points at a missing row.
    #[error("{entity} with {field} = {value} does not exist")]
    Reference {
        entity: &'static str,
        field: String,
        value: String,
    },

    /// A store constraint was violated (unique collision, restricted delete, required relation).
    #[error("constraint violated on {entity}.{field}: {message}")]
    Constraint {
        entity: &'static str,
        field: String,
        message: String,
    },

    /// The top-level target of an update/delete does not exist.
    #[error("{entity} matching {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_all_issues() {
        let mut errors = ValidationError::default();
        errors.push(&["progress".to_string()], "expected integer, received string");
        errors.push(&[], "unrecognized key 'extra'");

        let err = errors.finish(()).unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err.has_path(&["progress"]));
        assert!(err.has_path(&[]));
        assert_eq!(
            err.to_string(),
            "validation failed: progress: expected integer, received string; <root>: unrecognized key 'extra'"
        );
    }

    #[test]
    fn test_field_messages_group_by_path() {
        let mut errors = ValidationError::default();
        errors.push(&["budget".to_string(), "0".to_string()], "first");
        errors.push(&["budget".to_string(), "0".to_string()], "second");

        let messages = errors.field_messages();
        assert_eq!(messages["budget.0"], vec!["first", "second"]);
    }

    #[test]
    fn test_finish_without_issues_is_ok() {
        assert_eq!(ValidationError::default().finish(42), Ok(42));
    }
}
