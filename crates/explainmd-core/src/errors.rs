//! Error and diagnostic types for explainmd-core.
//!
//! Two shapes coexist, per the validation discipline:
//! - `ExplainError` for operations that fail as a whole (bad arguments,
//!   broken invariants, unknown ids)
//! - `Issue` lists for validators that collect every problem before
//!   returning (`validate_x(input) -> ValidationOutcome`); the matching
//!   `assert_x` wrappers are the only places that turn issues into errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type ExplainResult<T> = Result<T, ExplainError>;

/// Error kinds used across the core crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Invariant,
    Serialization,
    UnknownId,
    Policy,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid-argument",
            Self::Invariant => "invariant",
            Self::Serialization => "serialization",
            Self::UnknownId => "unknown-id",
            Self::Policy => "policy",
        }
    }
}

/// The crate-wide error type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} error: {message}", .kind.as_str())]
pub struct ExplainError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExplainError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invariant, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn unknown_id(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownId, message)
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Policy, message)
    }
}

/// A single structured validation issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl Issue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Result of a collecting validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub ok: bool,
    pub issues: Vec<Issue>,
}

impl ValidationOutcome {
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        Self {
            ok: issues.is_empty(),
            issues,
        }
    }

    /// Turn a failed outcome into an `ExplainError` carrying every issue code.
    pub fn into_error(self, what: &str) -> ExplainError {
        let codes: Vec<&str> = self.issues.iter().map(|i| i.code.as_str()).collect();
        ExplainError::invalid_argument(format!(
            "{what} validation failed with {} issue(s): {}",
            self.issues.len(),
            codes.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_kind() {
        let e = ExplainError::invalid_argument("bad span");
        assert!(e.to_string().contains("invalid-argument"));
        assert!(e.to_string().contains("bad span"));
    }

    #[test]
    fn outcome_ok_tracks_issues() {
        let ok = ValidationOutcome::from_issues(vec![]);
        assert!(ok.ok);

        let bad = ValidationOutcome::from_issues(vec![Issue::new("x", "y")]);
        assert!(!bad.ok);
        assert!(bad.into_error("thing").to_string().contains("x"));
    }
}
