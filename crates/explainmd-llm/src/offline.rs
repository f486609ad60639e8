//! Deterministic offline summarizer.
//!
//! A template-based implementation of the summarizer port that composes the
//! parent from child vocabulary only: no transport, no randomness, bit-stable
//! output. Evaluators (quality-harness, release-gate) and tests use it to
//! exercise the full tree builder without a model provider.

use async_trait::async_trait;
use explainmd_core::policy::{post_summary_check, PostSummaryInput};
use explainmd_core::summarize::{
    ParentSummarizer, ParentSummary, SummarizeError, SummarizeGroupRequest, SummarizeOutcome,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSummarizer;

#[async_trait]
impl ParentSummarizer for OfflineSummarizer {
    async fn summarize(
        &self,
        request: SummarizeGroupRequest,
    ) -> Result<SummarizeOutcome, SummarizeError> {
        let statements: Vec<String> = request
            .children
            .iter()
            .map(|c| c.statement.clone())
            .collect();
        let child_ids: Vec<String> = request.children.iter().map(|c| c.id.clone()).collect();

        let complexity = request
            .children
            .iter()
            .filter_map(|c| c.complexity)
            .fold(request.config.complexity_level as f64, f64::max)
            .clamp(1.0, 5.0);

        let summary = ParentSummary {
            parent_statement: statements.join("; "),
            why_true_from_children: statements.join(", "),
            new_terms_introduced: vec![],
            complexity_score: complexity,
            abstraction_score: (request.depth as f64 + 1.0).min(5.0),
            evidence_refs: child_ids.clone(),
            confidence: 0.8,
        };

        let post = post_summary_check(
            &PostSummaryInput {
                summary: &summary,
                child_ids: &child_ids,
                child_statements: &statements,
            },
            &request.config,
        );
        if !post.ok {
            return Err(SummarizeError::Validation {
                violations: post.violations,
                retries_used: 0,
            });
        }
        Ok(SummarizeOutcome {
            summary,
            post,
            retries_used: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use explainmd_core::config::ExplainConfig;
    use explainmd_core::summarize::ChildSummaryInput;

    fn request(statements: &[&str]) -> SummarizeGroupRequest {
        SummarizeGroupRequest {
            depth: 1,
            group_index: 0,
            children: statements
                .iter()
                .enumerate()
                .map(|(i, s)| ChildSummaryInput {
                    id: format!("c{i}"),
                    statement: s.to_string(),
                    complexity: Some(2.0 + i as f64),
                })
                .collect(),
            config: ExplainConfig::default(),
        }
    }

    #[tokio::test]
    async fn output_is_grounded_and_stable() {
        let req = request(&["addition commutes", "multiplication distributes"]);
        let a = OfflineSummarizer.summarize(req.clone()).await.unwrap();
        let b = OfflineSummarizer.summarize(req).await.unwrap();
        assert_eq!(a.summary, b.summary);
        assert!(a.post.ok);
        assert_eq!(a.summary.evidence_refs, vec!["c0", "c1"]);
        assert_eq!(a.summary.complexity_score, 3.0);
        assert!(a.summary.new_terms_introduced.is_empty());
    }

    #[tokio::test]
    async fn passes_strict_entailment() {
        let mut req = request(&["zero adds neutrally", "one multiplies neutrally"]);
        req.config.entailment_mode = explainmd_core::config::EntailmentMode::Strict;
        let out = OfflineSummarizer.summarize(req).await.unwrap();
        assert!(out.post.ok);
    }
}
