//! Progressive disclosure views.
//!
//! Projects a tree to a flat list filtered by an expansion set, preserving
//! root-down traversal order. Bad expansion requests (unknown ids, leaves,
//! ids made unreachable by corruption) are reported as diagnostics, never
//! thrown. The view's ordering is fully determined by the tree plus the
//! request, so its canonical render is hashable.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::determinism::canonical::{CanonicalRender, CanonicalWriter};
use crate::errors::ExplainResult;
use crate::model::tree::{ExplanationTree, TreeNode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureRequest {
    #[serde(default)]
    pub expanded_node_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_children_per_expanded_node: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureDiagnosticCode {
    UnknownNodeId,
    NotAParent,
    CycleDetected,
}

impl DisclosureDiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownNodeId => "unknown_node_id",
            Self::NotAParent => "not_a_parent",
            Self::CycleDetected => "cycle_detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureDiagnostic {
    pub code: DisclosureDiagnosticCode,
    pub node_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureEntry {
    pub node_id: String,
    /// Distance from the root in the projected view.
    pub view_depth: u32,
    pub kind: String,
    pub statement: String,
    pub child_count: usize,
    pub expanded: bool,
    /// Children hidden by `maxChildrenPerExpandedNode`.
    pub omitted_children: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureView {
    pub root_id: String,
    pub entries: Vec<DisclosureEntry>,
    pub diagnostics: Vec<DisclosureDiagnostic>,
}

/// Project a tree through an expansion request.
pub fn project_disclosure(
    tree: &ExplanationTree,
    request: &DisclosureRequest,
) -> ExplainResult<DisclosureView> {
    // The root must exist; everything else degrades to diagnostics.
    tree.get(&tree.root_id)?;

    let mut diagnostics: Vec<DisclosureDiagnostic> = Vec::new();
    for id in &request.expanded_node_ids {
        match tree.nodes.get(id) {
            None => diagnostics.push(DisclosureDiagnostic {
                code: DisclosureDiagnosticCode::UnknownNodeId,
                node_id: id.clone(),
                message: "expansion requested for an id not in the tree".to_string(),
            }),
            Some(TreeNode::Leaf(_)) => diagnostics.push(DisclosureDiagnostic {
                code: DisclosureDiagnosticCode::NotAParent,
                node_id: id.clone(),
                message: "expansion requested for a leaf".to_string(),
            }),
            Some(TreeNode::Parent(_)) => {}
        }
    }

    let mut entries: Vec<DisclosureEntry> = Vec::new();
    // A well-formed tree visits every node once; a revisit means the input
    // is corrupted (cycle or shared child). Diagnose and skip, never loop.
    let mut visited: BTreeSet<String> = BTreeSet::new();
    // (id, view depth); children pushed in reverse so traversal is
    // root-down, left-to-right.
    let mut stack: Vec<(String, u32)> = vec![(tree.root_id.clone(), 0)];

    while let Some((id, view_depth)) = stack.pop() {
        let Some(node) = tree.nodes.get(&id) else {
            diagnostics.push(DisclosureDiagnostic {
                code: DisclosureDiagnosticCode::UnknownNodeId,
                node_id: id,
                message: "child id has no node".to_string(),
            });
            continue;
        };
        if !visited.insert(id.clone()) {
            diagnostics.push(DisclosureDiagnostic {
                code: DisclosureDiagnosticCode::CycleDetected,
                node_id: id,
                message: "node revisited during traversal".to_string(),
            });
            continue;
        }

        let children = node.child_ids();
        let expanded =
            !children.is_empty() && request.expanded_node_ids.contains(&id);
        let visible = if expanded {
            match request.max_children_per_expanded_node {
                Some(cap) => children.len().min(cap),
                None => children.len(),
            }
        } else {
            0
        };

        entries.push(DisclosureEntry {
            node_id: id.clone(),
            view_depth,
            kind: match node {
                TreeNode::Leaf(_) => "leaf".to_string(),
                TreeNode::Parent(_) => "parent".to_string(),
            },
            statement: node.statement().to_string(),
            child_count: children.len(),
            expanded,
            omitted_children: children.len() - visible,
        });

        if expanded {
            for child in children[..visible].iter().rev() {
                stack.push((child.clone(), view_depth + 1));
            }
        }
    }

    Ok(DisclosureView {
        root_id: tree.root_id.clone(),
        entries,
        diagnostics,
    })
}

impl CanonicalRender for DisclosureView {
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.text_field("rootId", &self.root_id);
        w.field("entryCount", self.entries.len());
        for (i, e) in self.entries.iter().enumerate() {
            w.field(&CanonicalWriter::index_key("entry", i, "childCount"), e.child_count);
            w.field(&CanonicalWriter::index_key("entry", i, "expanded"), e.expanded);
            w.text_field(&CanonicalWriter::index_key("entry", i, "kind"), &e.kind);
            w.text_field(&CanonicalWriter::index_key("entry", i, "nodeId"), &e.node_id);
            w.field(
                &CanonicalWriter::index_key("entry", i, "omittedChildren"),
                e.omitted_children,
            );
            w.text_field(&CanonicalWriter::index_key("entry", i, "statement"), &e.statement);
            w.field(&CanonicalWriter::index_key("entry", i, "viewDepth"), e.view_depth);
        }
        for (i, d) in self.diagnostics.iter().enumerate() {
            w.text_field(
                &CanonicalWriter::index_key("diagnostic", i, "code"),
                d.code.as_str(),
            );
            w.text_field(&CanonicalWriter::index_key("diagnostic", i, "nodeId"), &d.node_id);
        }
        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_tree;
    use crate::config::ExplainConfig;
    use crate::model::leaf::{leaf_id, LeafRecord, SourceSpan, TheoremKind};
    use crate::policy::post_summary_check;
    use crate::policy::PostSummaryInput;
    use crate::summarize::{
        ParentSummarizer, ParentSummary, SummarizeError, SummarizeGroupRequest, SummarizeOutcome,
    };
    use async_trait::async_trait;
    use futures::executor::block_on;

    struct EchoSummarizer;

    #[async_trait]
    impl ParentSummarizer for EchoSummarizer {
        async fn summarize(
            &self,
            request: SummarizeGroupRequest,
        ) -> Result<SummarizeOutcome, SummarizeError> {
            let joined: Vec<String> =
                request.children.iter().map(|c| c.statement.clone()).collect();
            let summary = ParentSummary {
                parent_statement: joined.join(" and "),
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

    fn sample_tree() -> crate::model::tree::ExplanationTree {
        block_on(build_tree(
            vec![leaf("a"), leaf("b"), leaf("c")],
            &ExplainConfig::default(),
            &EchoSummarizer,
        ))
        .unwrap()
    }

    #[test]
    fn collapsed_view_shows_only_root() {
        let tree = sample_tree();
        let view = project_disclosure(&tree, &DisclosureRequest::default()).unwrap();
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.entries[0].node_id, tree.root_id);
        assert!(!view.entries[0].expanded);
        assert_eq!(view.entries[0].child_count, 3);
    }

    #[test]
    fn expansion_walks_children_in_order() {
        let tree = sample_tree();
        let mut req = DisclosureRequest::default();
        req.expanded_node_ids.insert(tree.root_id.clone());
        let view = project_disclosure(&tree, &req).unwrap();
        assert_eq!(view.entries.len(), 4);
        let root = tree.get(&tree.root_id).unwrap();
        let child_order: Vec<&str> = view.entries[1..]
            .iter()
            .map(|e| e.node_id.as_str())
            .collect();
        let expected: Vec<&str> = root.child_ids().iter().map(|s| s.as_str()).collect();
        assert_eq!(child_order, expected);
        assert!(view.diagnostics.is_empty());
    }

    #[test]
    fn child_cap_reports_omissions() {
        let tree = sample_tree();
        let mut req = DisclosureRequest::default();
        req.expanded_node_ids.insert(tree.root_id.clone());
        req.max_children_per_expanded_node = Some(2);
        let view = project_disclosure(&tree, &req).unwrap();
        assert_eq!(view.entries.len(), 3);
        assert_eq!(view.entries[0].omitted_children, 1);
    }

    #[test]
    fn bad_expansion_requests_become_diagnostics() {
        let tree = sample_tree();
        let mut req = DisclosureRequest::default();
        req.expanded_node_ids.insert("nope".to_string());
        req.expanded_node_ids.insert(tree.leaf_ids[0].clone());
        let view = project_disclosure(&tree, &req).unwrap();
        assert_eq!(view.diagnostics.len(), 2);
        let codes: Vec<DisclosureDiagnosticCode> =
            view.diagnostics.iter().map(|d| d.code).collect();
        assert!(codes.contains(&DisclosureDiagnosticCode::UnknownNodeId));
        assert!(codes.contains(&DisclosureDiagnosticCode::NotAParent));
    }

    #[test]
    fn view_hash_is_stable() {
        let tree = sample_tree();
        let mut req = DisclosureRequest::default();
        req.expanded_node_ids.insert(tree.root_id.clone());
        let a = project_disclosure(&tree, &req).unwrap();
        let b = project_disclosure(&tree, &req).unwrap();
        assert_eq!(a.canonical_hash_hex(), b.canonical_hash_hex());
    }
}
