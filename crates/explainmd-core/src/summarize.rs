//! The summarizer port.
//!
//! The tree builder consumes parent summaries through this capability
//! interface; prompt assembly, transport, parsing, and the tightened-prompt
//! retry live behind it (see the `explainmd-llm` crate). This is the
//! builder's only suspension point.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ExplainConfig;
use crate::policy::{PolicyCheckOutcome, PolicyViolation, ViolationCode};

/// One child presented to the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSummaryInput {
    pub id: String,
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
}

/// Request for one parent summary over an ordered group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeGroupRequest {
    pub depth: u32,
    pub group_index: usize,
    /// Children in prerequisite order; implementations sort by id when
    /// assembling the prompt.
    pub children: Vec<ChildSummaryInput>,
    pub config: ExplainConfig,
}

/// A parsed, schema-valid parent summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ParentSummary {
    pub parent_statement: String,
    pub why_true_from_children: String,
    pub new_terms_introduced: Vec<String>,
    pub complexity_score: f64,
    pub abstraction_score: f64,
    pub evidence_refs: Vec<String>,
    pub confidence: f64,
}

/// Successful summarization: the summary plus the post-policy evaluation the
/// implementation already ran, and the number of regenerations it used.
#[derive(Debug, Clone)]
pub struct SummarizeOutcome {
    pub summary: ParentSummary,
    pub post: PolicyCheckOutcome,
    pub retries_used: u32,
}

/// Provider failure classification (spec'd retry schedule keys off this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderErrorCode {
    Permanent,
    Transient,
    Timeout,
    Configuration,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Configuration => "configuration",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

/// Failure surfaced through the port.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SummarizeError {
    /// The summary (or its retry) failed validation; the builder repartitions.
    #[error("summary validation failed after {retries_used} retries: {}", violation_summary(.violations))]
    Validation {
        violations: Vec<PolicyViolation>,
        retries_used: u32,
    },

    /// The transport failed; surfaced as a hard error with the attempt count
    /// kept for forensics.
    #[error("summarizer provider failure ({}) on attempt {attempt}: {message}", .code.as_str())]
    Provider {
        code: ProviderErrorCode,
        message: String,
        attempt: u32,
    },
}

impl SummarizeError {
    pub fn violation_codes(&self) -> Vec<ViolationCode> {
        match self {
            Self::Validation { violations, .. } => {
                let mut codes: Vec<ViolationCode> = violations.iter().map(|v| v.code).collect();
                codes.sort();
                codes.dedup();
                codes
            }
            Self::Provider { .. } => Vec::new(),
        }
    }
}

fn violation_summary(violations: &[PolicyViolation]) -> String {
    let codes: Vec<&str> = violations.iter().map(|v| v.code.as_str()).collect();
    codes.join(", ")
}

/// Capability interface for parent summarization.
#[async_trait]
pub trait ParentSummarizer: Send + Sync {
    async fn summarize(
        &self,
        request: SummarizeGroupRequest,
    ) -> Result<SummarizeOutcome, SummarizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_codes() {
        let e = SummarizeError::Validation {
            violations: vec![PolicyViolation::new(
                ViolationCode::TermBudget,
                "too many terms",
            )],
            retries_used: 1,
        };
        assert!(e.to_string().contains("term_budget"));

        let e = SummarizeError::Provider {
            code: ProviderErrorCode::Timeout,
            message: "deadline exceeded".to_string(),
            attempt: 2,
        };
        assert!(e.to_string().contains("timeout"));
        assert!(e.to_string().contains("attempt 2"));
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderErrorCode::Transient.is_retryable());
        assert!(ProviderErrorCode::Timeout.is_retryable());
        assert!(!ProviderErrorCode::Permanent.is_retryable());
        assert!(!ProviderErrorCode::Configuration.is_retryable());
    }
}
