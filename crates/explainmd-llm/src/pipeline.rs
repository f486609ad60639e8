//! The pipeline summarizer: prompt -> provider -> parse -> critique ->
//! post-policy, with one tightened-prompt retry.
//!
//! On post-policy (or parse/critique) failure the pipeline regenerates once
//! with the tightened system prompt; if the retry also fails it raises the
//! typed validation error and the tree builder repartitions the group.
//! Transport failures propagate with their classification and attempt count.

use async_trait::async_trait;
use explainmd_core::policy::{post_summary_check, PolicyViolation, PostSummaryInput};
use explainmd_core::summarize::{
    ParentSummarizer, SummarizeError, SummarizeGroupRequest, SummarizeOutcome,
};
use tracing::debug;

use crate::parse::{critique_output, parse_summary_output};
use crate::prompt::build_group_prompt;
use crate::provider::{GenerateRequest, SummaryProvider};
use crate::retry::generate_with_retry;

pub struct PipelineSummarizer<P> {
    provider: P,
}

impl<P: SummaryProvider> PipelineSummarizer<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: SummaryProvider> ParentSummarizer for PipelineSummarizer<P> {
    async fn summarize(
        &self,
        request: SummarizeGroupRequest,
    ) -> Result<SummarizeOutcome, SummarizeError> {
        let child_ids: Vec<String> = request.children.iter().map(|c| c.id.clone()).collect();
        let child_statements: Vec<String> = request
            .children
            .iter()
            .map(|c| c.statement.clone())
            .collect();
        let provider_cfg = &request.config.model_provider;

        let mut last_violations: Vec<PolicyViolation> = Vec::new();

        for attempt in 0u32..=1 {
            let tightened = attempt == 1;
            let messages =
                build_group_prompt(&request, tightened).map_err(|e| SummarizeError::Provider {
                    code: explainmd_core::summarize::ProviderErrorCode::Permanent,
                    message: e.to_string(),
                    attempt,
                })?;
            let generate = GenerateRequest {
                messages,
                model: provider_cfg.model.clone(),
                temperature: provider_cfg.temperature,
                max_output_tokens: provider_cfg.max_output_tokens,
            };

            let response = generate_with_retry(&self.provider, &generate, provider_cfg)
                .await
                .map_err(|failure| SummarizeError::Provider {
                    code: failure.error.code(),
                    message: failure.error.to_string(),
                    attempt: failure.attempts,
                })?;

            let parsed = parse_summary_output(&response.text);
            let mut violations = parsed.violations.clone();
            violations.extend(critique_output(&response.text, parsed.summary.as_ref()));

            if let Some(summary) = parsed.summary {
                if violations.is_empty() {
                    let post = post_summary_check(
                        &PostSummaryInput {
                            summary: &summary,
                            child_ids: &child_ids,
                            child_statements: &child_statements,
                        },
                        &request.config,
                    );
                    if post.ok {
                        return Ok(SummarizeOutcome {
                            summary,
                            post,
                            retries_used: attempt,
                        });
                    }
                    violations.extend(post.violations);
                }
            }

            debug!(
                depth = request.depth,
                group_index = request.group_index,
                attempt,
                violation_count = violations.len(),
                "summary attempt failed validation"
            );
            last_violations = violations;
        }

        Err(SummarizeError::Validation {
            violations: last_violations,
            retries_used: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FinishReason, GenerateResponse, ProviderError};
    use explainmd_core::config::ExplainConfig;
    use explainmd_core::policy::ViolationCode;
    use explainmd_core::summarize::ChildSummaryInput;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves canned responses in order.
    struct ScriptedProvider {
        responses: Vec<String>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<String>) -> Self {
            Self {
                responses,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SummaryProvider for ScriptedProvider {
        async fn generate(
            &self,
            request: &GenerateRequest,
        ) -> Result<GenerateResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let text = self
                .responses
                .get(n)
                .cloned()
                .unwrap_or_else(|| self.responses.last().cloned().unwrap_or_default());
            Ok(GenerateResponse {
                text,
                model: request.model.clone(),
                finish_reason: FinishReason::Stop,
                raw: serde_json::Value::Null,
            })
        }
    }

    fn request() -> SummarizeGroupRequest {
        let mut cfg = ExplainConfig::default();
        cfg.model_provider.retry_base_delay_ms = 1;
        SummarizeGroupRequest {
            depth: 1,
            group_index: 0,
            children: vec![
                ChildSummaryInput {
                    id: "a".to_string(),
                    statement: "addition commutes on natural numbers".to_string(),
                    complexity: Some(3.0),
                },
                ChildSummaryInput {
                    id: "b".to_string(),
                    statement: "natural numbers admit induction".to_string(),
                    complexity: Some(3.0),
                },
            ],
            config: cfg,
        }
    }

    fn good_json(refs: &str) -> String {
        format!(
            r#"{{
            "parent_statement": "addition commutes and natural numbers admit induction",
            "why_true_from_children": "addition commutes; induction holds on natural numbers",
            "new_terms_introduced": [],
            "complexity_score": 3,
            "abstraction_score": 2,
            "evidence_refs": [{refs}],
            "confidence": 0.9
        }}"#
        )
    }

    #[tokio::test]
    async fn first_attempt_success_uses_no_retry() {
        let provider = ScriptedProvider::new(vec![good_json(r#""a", "b""#)]);
        let pipeline = PipelineSummarizer::new(provider);
        let out = pipeline.summarize(request()).await.unwrap();
        assert_eq!(out.retries_used, 0);
        assert!(out.post.ok);
        assert_eq!(out.summary.evidence_refs, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn post_failure_retries_once_then_succeeds() {
        // First response misses evidence for b; the retry corrects it.
        let provider = ScriptedProvider::new(vec![
            good_json(r#""a""#),
            good_json(r#""a", "b""#),
        ]);
        let pipeline = PipelineSummarizer::new(provider);
        let out = pipeline.summarize(request()).await.unwrap();
        assert_eq!(out.retries_used, 1);
        assert_eq!(pipeline.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn repeated_failure_raises_validation_error() {
        let provider = ScriptedProvider::new(vec![good_json(r#""a""#)]);
        let pipeline = PipelineSummarizer::new(provider);
        let err = pipeline.summarize(request()).await.err().unwrap();
        match err {
            SummarizeError::Validation {
                violations,
                retries_used,
            } => {
                assert_eq!(retries_used, 1);
                assert!(violations
                    .iter()
                    .any(|v| v.code == ViolationCode::EvidenceCoverage));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unparseable_output_is_schema_failure() {
        let provider = ScriptedProvider::new(vec!["no json here".to_string()]);
        let pipeline = PipelineSummarizer::new(provider);
        let err = pipeline.summarize(request()).await.err().unwrap();
        match err {
            SummarizeError::Validation { violations, .. } => {
                assert!(violations.iter().any(|v| v.code == ViolationCode::Schema));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
