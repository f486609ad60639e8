//! Tree-to-tree diff by support signature.
//!
//! Nodes are bucketed by what they ultimately explain:
//! - `leaf:<id>` for leaves
//! - `parent:<sorted-support-leaf-ids>` for parents
//!
//! Within a bucket, baseline and candidate entries (sorted by node id) are
//! zipped by index; surplus entries become `added`/`removed`, index pairs
//! with a differing statement or depth become `changed` with a textual
//! delta. The report carries the regeneration plan and both config hashes.

use serde::{Deserialize, Serialize};

use crate::config::{compute_config_hash, plan_regeneration, ExplainConfig, RegenerationPlan};
use crate::determinism::canonical::{CanonicalRender, CanonicalWriter};
use crate::errors::ExplainResult;
use crate::model::tree::{ExplanationTree, TreeNode};

/// Minimal word-anchored delta between two statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementDelta {
    pub prefix: String,
    pub before_changed: String,
    pub after_changed: String,
    pub suffix: String,
}

/// Longest common prefix, then longest common suffix of the remainders.
pub fn compute_statement_delta(before: &str, after: &str) -> StatementDelta {
    let b: Vec<char> = before.chars().collect();
    let a: Vec<char> = after.chars().collect();

    let mut prefix_len = 0usize;
    while prefix_len < b.len() && prefix_len < a.len() && b[prefix_len] == a[prefix_len] {
        prefix_len += 1;
    }

    let mut suffix_len = 0usize;
    while suffix_len < b.len() - prefix_len
        && suffix_len < a.len() - prefix_len
        && b[b.len() - 1 - suffix_len] == a[a.len() - 1 - suffix_len]
    {
        suffix_len += 1;
    }

    StatementDelta {
        prefix: b[..prefix_len].iter().collect(),
        before_changed: b[prefix_len..b.len() - suffix_len].iter().collect(),
        after_changed: a[prefix_len..a.len() - suffix_len].iter().collect(),
        suffix: b[b.len() - suffix_len..].iter().collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffChangeType {
    Added,
    Changed,
    Removed,
}

impl DiffChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffChange {
    /// The support signature bucket.
    pub key: String,
    pub change_type: DiffChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_depth: Option<u32>,
    pub support_leaf_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<StatementDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub baseline_config_hash: String,
    pub candidate_config_hash: String,
    pub regeneration_plan: RegenerationPlan,
    pub changes: Vec<DiffChange>,
}

/// Support signature of a reachable node.
fn signature(tree: &ExplanationTree, node_id: &str) -> ExplainResult<(String, Vec<String>)> {
    let node = tree.get(node_id)?;
    let support = tree.support_leaf_ids(node_id)?;
    let sig = match node {
        TreeNode::Leaf(l) => format!("leaf:{}", l.id),
        TreeNode::Parent(_) => format!("parent:{}", support.join(",")),
    };
    Ok((sig, support))
}

/// Compare two trees built from (possibly) different configs.
pub fn diff_trees(
    baseline: &ExplanationTree,
    baseline_config: &ExplainConfig,
    candidate: &ExplanationTree,
    candidate_config: &ExplainConfig,
) -> ExplainResult<DiffReport> {
    use std::collections::BTreeMap;

    // signature -> (support, baseline node ids, candidate node ids)
    let mut buckets: BTreeMap<String, (Vec<String>, Vec<String>, Vec<String>)> = BTreeMap::new();

    for id in baseline.reachable_ids() {
        let (sig, support) = signature(baseline, &id)?;
        let entry = buckets.entry(sig).or_insert_with(|| (support, vec![], vec![]));
        entry.1.push(id);
    }
    for id in candidate.reachable_ids() {
        let (sig, support) = signature(candidate, &id)?;
        let entry = buckets.entry(sig).or_insert_with(|| (support, vec![], vec![]));
        entry.2.push(id);
    }

    let mut changes: Vec<DiffChange> = Vec::new();
    for (key, (support, mut base_ids, mut cand_ids)) in buckets {
        base_ids.sort();
        cand_ids.sort();
        let pairs = base_ids.len().min(cand_ids.len());

        for i in 0..pairs {
            let b = baseline.get(&base_ids[i])?;
            let c = candidate.get(&cand_ids[i])?;
            if b.statement() == c.statement() && b.depth() == c.depth() {
                continue;
            }
            changes.push(DiffChange {
                key: key.clone(),
                change_type: DiffChangeType::Changed,
                baseline_node_id: Some(base_ids[i].clone()),
                candidate_node_id: Some(cand_ids[i].clone()),
                baseline_depth: Some(b.depth()),
                candidate_depth: Some(c.depth()),
                support_leaf_ids: support.clone(),
                delta: Some(compute_statement_delta(b.statement(), c.statement())),
            });
        }
        for id in &base_ids[pairs..] {
            let b = baseline.get(id)?;
            changes.push(DiffChange {
                key: key.clone(),
                change_type: DiffChangeType::Removed,
                baseline_node_id: Some(id.clone()),
                candidate_node_id: None,
                baseline_depth: Some(b.depth()),
                candidate_depth: None,
                support_leaf_ids: support.clone(),
                delta: None,
            });
        }
        for id in &cand_ids[pairs..] {
            let c = candidate.get(id)?;
            changes.push(DiffChange {
                key: key.clone(),
                change_type: DiffChangeType::Added,
                baseline_node_id: None,
                candidate_node_id: Some(id.clone()),
                baseline_depth: None,
                candidate_depth: Some(c.depth()),
                support_leaf_ids: support.clone(),
                delta: None,
            });
        }
    }

    changes.sort_by(|x, y| {
        (
            &x.key,
            x.change_type,
            &x.baseline_node_id,
            &x.candidate_node_id,
        )
            .cmp(&(&y.key, y.change_type, &y.baseline_node_id, &y.candidate_node_id))
    });

    Ok(DiffReport {
        baseline_config_hash: compute_config_hash(baseline_config),
        candidate_config_hash: compute_config_hash(candidate_config),
        regeneration_plan: plan_regeneration(baseline_config, candidate_config),
        changes,
    })
}

impl CanonicalRender for DiffReport {
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.text_field("baselineConfigHash", &self.baseline_config_hash);
        w.text_field("candidateConfigHash", &self.candidate_config_hash);
        w.field("changeCount", self.changes.len());
        w.text_field("regenerationScope", self.regeneration_plan.scope.as_str());
        for ch in &self.regeneration_plan.changes {
            let prefix = format!("regeneration.{}", ch.field);
            w.text_field(&format!("{prefix}.after"), &ch.after);
            w.text_field(&format!("{prefix}.before"), &ch.before);
            w.text_field(&format!("{prefix}.class"), ch.class.as_str());
        }
        // Changes are pre-sorted by (key, type, baselineNodeId, candidateNodeId).
        for (i, c) in self.changes.iter().enumerate() {
            w.opt_field(
                &CanonicalWriter::index_key("change", i, "baselineDepth"),
                c.baseline_depth,
            );
            w.opt_text_field(
                &CanonicalWriter::index_key("change", i, "baselineNodeId"),
                c.baseline_node_id.as_deref(),
            );
            w.opt_field(
                &CanonicalWriter::index_key("change", i, "candidateDepth"),
                c.candidate_depth,
            );
            w.opt_text_field(
                &CanonicalWriter::index_key("change", i, "candidateNodeId"),
                c.candidate_node_id.as_deref(),
            );
            w.text_field(&CanonicalWriter::index_key("change", i, "key"), &c.key);
            w.sorted_list_field(
                &CanonicalWriter::index_key("change", i, "supportLeafIds"),
                &c.support_leaf_ids,
            );
            w.text_field(
                &CanonicalWriter::index_key("change", i, "type"),
                c.change_type.as_str(),
            );
            match &c.delta {
                Some(d) => {
                    w.text_field(
                        &CanonicalWriter::index_key("change", i, "delta.afterChanged"),
                        &d.after_changed,
                    );
                    w.text_field(
                        &CanonicalWriter::index_key("change", i, "delta.beforeChanged"),
                        &d.before_changed,
                    );
                    w.text_field(
                        &CanonicalWriter::index_key("change", i, "delta.prefix"),
                        &d.prefix,
                    );
                    w.text_field(
                        &CanonicalWriter::index_key("change", i, "delta.suffix"),
                        &d.suffix,
                    );
                }
                None => {
                    w.opt_text_field(&CanonicalWriter::index_key("change", i, "delta"), None);
                }
            }
        }
        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_word_substitution() {
        let d = compute_statement_delta("alpha beta1 gamma", "alpha delta2 gamma");
        assert_eq!(
            d,
            StatementDelta {
                prefix: "alpha ".to_string(),
                before_changed: "beta1".to_string(),
                after_changed: "delta2".to_string(),
                suffix: " gamma".to_string(),
            }
        );
    }

    #[test]
    fn delta_insertion() {
        let d = compute_statement_delta("A -> C", "A -> B -> C");
        assert_eq!(
            d,
            StatementDelta {
                prefix: "A -> ".to_string(),
                before_changed: "".to_string(),
                after_changed: "B -> ".to_string(),
                suffix: "C".to_string(),
            }
        );
    }

    #[test]
    fn delta_identical() {
        let d = compute_statement_delta("same", "same");
        assert_eq!(d.prefix, "same");
        assert!(d.before_changed.is_empty());
        assert!(d.after_changed.is_empty());
        assert!(d.suffix.is_empty());
    }

    #[test]
    fn delta_handles_multibyte() {
        let d = compute_statement_delta("x ≤ y", "x ≥ y");
        assert_eq!(d.prefix, "x ");
        assert_eq!(d.before_changed, "≤");
        assert_eq!(d.after_changed, "≥");
        assert_eq!(d.suffix, " y");
    }

    mod tree_diffs {
        use super::*;
        use crate::builder::build_tree;
        use crate::model::leaf::{leaf_id, LeafRecord, SourceSpan, TheoremKind};
        use crate::policy::{post_summary_check, PostSummaryInput};
        use crate::summarize::{
            ParentSummarizer, ParentSummary, SummarizeError, SummarizeGroupRequest,
            SummarizeOutcome,
        };
        use async_trait::async_trait;
        use futures::executor::block_on;

        struct TaggedSummarizer {
            suffix: &'static str,
        }

        #[async_trait]
        impl ParentSummarizer for TaggedSummarizer {
            async fn summarize(
                &self,
                request: SummarizeGroupRequest,
            ) -> Result<SummarizeOutcome, SummarizeError> {
                let joined: Vec<String> =
                    request.children.iter().map(|c| c.statement.clone()).collect();
                let summary = ParentSummary {
                    parent_statement: format!("{}{}", joined.join(" and "), self.suffix),
                    why_true_from_children: joined.join("; "),
                    new_terms_introduced: vec![],
                    complexity_score: 3.0,
                    abstraction_score: 3.0,
                    confidence: 0.9,
                    evidence_refs: request.children.iter().map(|c| c.id.clone()).collect(),
                };
                let child_ids: Vec<String> =
                    request.children.iter().map(|c| c.id.clone()).collect();
                let statements: Vec<String> =
                    request.children.iter().map(|c| c.statement.clone()).collect();
                let post = post_summary_check(
                    &PostSummaryInput {
                        summary: &summary,
                        child_ids: &child_ids,
                        child_statements: &statements,
                    },
                    &request.config,
                );
                Ok(SummarizeOutcome {
                    summary,
                    post,
                    retries_used: 0,
                })
            }
        }

        fn leaf(name: &str) -> LeafRecord {
            LeafRecord {
                id: leaf_id("M", name, 1, 1),
                module_path: "M".into(),
                declaration_name: name.into(),
                theorem_kind: TheoremKind::Theorem,
                statement_text: format!("fact about {name} holds"),
                source_span: SourceSpan {
                    file_path: "M.lean".into(),
                    start_line: 1,
                    start_column: 1,
                    end_line: 2,
                    end_column: 1,
                },
                source_url: None,
                dependency_ids: vec![],
                tags: vec![],
            }
        }

        #[test]
        fn identical_trees_have_no_changes() {
            let cfg = ExplainConfig::default();
            let leaves = vec![leaf("a"), leaf("b")];
            let t1 = block_on(build_tree(leaves.clone(), &cfg, &TaggedSummarizer { suffix: "" }))
                .unwrap();
            let t2 = block_on(build_tree(leaves, &cfg, &TaggedSummarizer { suffix: "" }))
                .unwrap();
            let report = diff_trees(&t1, &cfg, &t2, &cfg).unwrap();
            assert!(report.changes.is_empty());
            assert_eq!(
                report.regeneration_plan.scope,
                crate::config::RegenerationScope::None
            );
        }

        #[test]
        fn reworded_parent_is_a_changed_record() {
            let cfg = ExplainConfig::default();
            let leaves = vec![leaf("a"), leaf("b")];
            let t1 = block_on(build_tree(leaves.clone(), &cfg, &TaggedSummarizer { suffix: "" }))
                .unwrap();
            let t2 = block_on(build_tree(
                leaves,
                &cfg,
                &TaggedSummarizer { suffix: " moreover" },
            ))
            .unwrap();
            let report = diff_trees(&t1, &cfg, &t2, &cfg).unwrap();
            assert_eq!(report.changes.len(), 1);
            let ch = &report.changes[0];
            assert_eq!(ch.change_type, DiffChangeType::Changed);
            assert!(ch.key.starts_with("parent:"));
            assert_eq!(ch.support_leaf_ids.len(), 2);
            let delta = ch.delta.as_ref().unwrap();
            assert_eq!(delta.after_changed, " moreover");
        }

        #[test]
        fn new_leaf_appears_as_added() {
            let cfg = ExplainConfig::default();
            let t1 = block_on(build_tree(
                vec![leaf("a"), leaf("b")],
                &cfg,
                &TaggedSummarizer { suffix: "" },
            ))
            .unwrap();
            let t2 = block_on(build_tree(
                vec![leaf("a"), leaf("b"), leaf("c")],
                &cfg,
                &TaggedSummarizer { suffix: "" },
            ))
            .unwrap();
            let report = diff_trees(&t1, &cfg, &t2, &cfg).unwrap();
            let added: Vec<&DiffChange> = report
                .changes
                .iter()
                .filter(|c| c.change_type == DiffChangeType::Added)
                .collect();
            assert!(added.iter().any(|c| c.key == format!("leaf:{}", leaf_id("M", "c", 1, 1))));
            // The two-leaf parent bucket disappears, the three-leaf bucket appears.
            assert!(report
                .changes
                .iter()
                .any(|c| c.change_type == DiffChangeType::Removed && c.key.starts_with("parent:")));
        }

        #[test]
        fn report_hash_is_stable() {
            let cfg = ExplainConfig::default();
            let t1 = block_on(build_tree(
                vec![leaf("a"), leaf("b")],
                &cfg,
                &TaggedSummarizer { suffix: "" },
            ))
            .unwrap();
            let t2 = block_on(build_tree(
                vec![leaf("a"), leaf("b"), leaf("c")],
                &cfg,
                &TaggedSummarizer { suffix: "" },
            ))
            .unwrap();
            let a = diff_trees(&t1, &cfg, &t2, &cfg).unwrap();
            let b = diff_trees(&t1, &cfg, &t2, &cfg).unwrap();
            assert_eq!(a.canonical_hash_hex(), b.canonical_hash_hex());
        }
    }
}
