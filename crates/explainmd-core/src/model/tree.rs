//! Explanation tree model.
//!
//! Nodes are either leaves (depth 0, mirroring a `LeafRecord`) or parents
//! (depth ≥ 1) produced by one layer pass. Both are immutable once minted.
//!
//! Parent ids are deterministic: `p_<depth>_<groupIndex>_<hex16>` where the
//! hex is a truncated sha256 of `depth:groupIndex:sorted-child-id-list`.
//! Callers persisting across runs should pin the derivation inputs rather
//! than the hex.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::determinism::canonical::{CanonicalRender, CanonicalWriter};
use crate::determinism::hashing::short_hash_hex16;
use crate::errors::{ExplainError, ExplainResult, Issue, ValidationOutcome};
use crate::grouping::GroupingWarning;
use crate::model::leaf::LeafRecord;
use crate::policy::{PolicyMetrics, PolicyViolation, ViolationCode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentNode {
    pub id: String,
    pub depth: u32,
    pub group_index: usize,
    /// Children ordered by topologically-resolved prerequisite order, then
    /// lexicographic.
    pub child_ids: Vec<String>,
    pub statement: String,
    pub why_true_from_children: String,
    pub new_terms_introduced: Vec<String>,
    pub complexity_score: f64,
    pub abstraction_score: f64,
    pub confidence: f64,
    /// Always set-equal to `child_ids`; stored sorted.
    pub evidence_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Leaf(LeafRecord),
    Parent(ParentNode),
}

impl TreeNode {
    pub fn id(&self) -> &str {
        match self {
            Self::Leaf(l) => &l.id,
            Self::Parent(p) => &p.id,
        }
    }

    pub fn depth(&self) -> u32 {
        match self {
            Self::Leaf(_) => 0,
            Self::Parent(p) => p.depth,
        }
    }

    pub fn statement(&self) -> &str {
        match self {
            Self::Leaf(l) => &l.statement_text,
            Self::Parent(p) => &p.statement,
        }
    }

    pub fn child_ids(&self) -> &[String] {
        match self {
            Self::Leaf(_) => &[],
            Self::Parent(p) => &p.child_ids,
        }
    }
}

/// One grouping decision; cumulative entries reconstruct the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPlanEntry {
    pub depth: u32,
    pub index: usize,
    pub input_node_ids: Vec<String>,
    pub output_node_id: String,
    pub complexity_spread: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepartitionReason {
    PreSummaryPolicy,
    PostSummaryPolicy,
}

impl RepartitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreSummaryPolicy => "pre_summary_policy",
            Self::PostSummaryPolicy => "post_summary_policy",
        }
    }
}

/// A deterministic split of a group caused by policy failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepartitionEvent {
    pub reason: RepartitionReason,
    pub round: u32,
    pub node_ids: Vec<String>,
    pub violation_codes: Vec<ViolationCode>,
}

/// Per-layer grouping diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDiagnostics {
    pub depth: u32,
    pub warnings: Vec<GroupingWarning>,
    pub repartition_events: Vec<RepartitionEvent>,
}

/// Diagnostics attached to every parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentPolicyDiagnostics {
    pub depth: u32,
    pub group_index: usize,
    pub retries_used: u32,
    pub pre_violations: Vec<PolicyViolation>,
    pub post_violations: Vec<PolicyViolation>,
    #[serde(default)]
    pub post_metrics: PolicyMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationTree {
    pub root_id: String,
    pub leaf_ids: Vec<String>,
    pub nodes: BTreeMap<String, TreeNode>,
    pub config_hash: String,
    pub group_plan: Vec<GroupPlanEntry>,
    pub grouping_diagnostics: Vec<LayerDiagnostics>,
    pub policy_diagnostics_by_parent: BTreeMap<String, ParentPolicyDiagnostics>,
    pub max_depth: u32,
}

/// Deterministic parent id from its derivation inputs.
pub fn mint_parent_id(depth: u32, group_index: usize, child_ids: &[String]) -> String {
    let mut sorted: Vec<String> = child_ids.to_vec();
    sorted.sort();
    let digest = short_hash_hex16(&format!("{depth}:{group_index}:{}", sorted.join(",")));
    format!("p_{depth}_{group_index}_{digest}")
}

impl ExplanationTree {
    pub fn get(&self, id: &str) -> ExplainResult<&TreeNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| ExplainError::unknown_id(format!("unknown tree node id: {id}")))
    }

    /// Ids reachable from the root, cycle-safe.
    pub fn reachable_ids(&self) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut stack = vec![self.root_id.clone()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                for c in node.child_ids() {
                    stack.push(c.clone());
                }
            }
        }
        seen
    }

    /// The support set: leaf ids reachable from a node's subtree, sorted.
    pub fn support_leaf_ids(&self, node_id: &str) -> ExplainResult<Vec<String>> {
        self.get(node_id)?;
        let mut support: BTreeSet<String> = BTreeSet::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut stack = vec![node_id.to_string()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.nodes.get(&id) {
                Some(TreeNode::Leaf(l)) => {
                    support.insert(l.id.clone());
                }
                Some(TreeNode::Parent(p)) => {
                    for c in &p.child_ids {
                        stack.push(c.clone());
                    }
                }
                None => {}
            }
        }
        Ok(support.into_iter().collect())
    }
}

/// Collecting validator for a built tree.
pub fn validate_tree(tree: &ExplanationTree, max_children_per_parent: usize) -> ValidationOutcome {
    let mut issues = Vec::new();

    if !tree.nodes.contains_key(&tree.root_id) {
        issues.push(Issue::new("tree.root.missing", "root id has no node"));
        return ValidationOutcome::from_issues(issues);
    }

    // Cycle detection along parent-child edges.
    let mut state: BTreeMap<&str, u8> = BTreeMap::new(); // 1 = on path, 2 = done
    let mut stack: Vec<(&str, usize)> = vec![(tree.root_id.as_str(), 0)];
    state.insert(tree.root_id.as_str(), 1);
    while let Some((id, child_idx)) = stack.pop() {
        let children = tree.nodes.get(id).map(|n| n.child_ids()).unwrap_or(&[]);
        if child_idx < children.len() {
            stack.push((id, child_idx + 1));
            let child = children[child_idx].as_str();
            match state.get(child) {
                Some(1) => {
                    issues.push(
                        Issue::new("tree.cycle", "cycle detected along child edges")
                            .detail("nodeId", child),
                    );
                }
                Some(_) => {}
                None => {
                    if tree.nodes.contains_key(child) {
                        state.insert(child, 1);
                        stack.push((child, 0));
                    } else {
                        issues.push(
                            Issue::new("tree.child.unknown", "child id has no node")
                                .detail("parentId", id)
                                .detail("childId", child),
                        );
                    }
                }
            }
        } else {
            state.insert(id, 2);
        }
    }

    let reachable = tree.reachable_ids();
    for id in tree.nodes.keys() {
        if !reachable.contains(id) {
            issues.push(Issue::new("tree.unreachable", "node not reachable from root").detail("nodeId", id));
        }
    }

    // Every declared leaf must exist as a leaf node and be reachable.
    let mut leaf_nodes: BTreeSet<&String> = BTreeSet::new();
    for (id, node) in &tree.nodes {
        if matches!(node, TreeNode::Leaf(_)) {
            leaf_nodes.insert(id);
        }
        if node.id() != id {
            issues.push(
                Issue::new("tree.node.id", "node id differs from its map key")
                    .detail("key", id)
                    .detail("nodeId", node.id()),
            );
        }
    }
    for leaf_id in &tree.leaf_ids {
        if !leaf_nodes.contains(leaf_id) {
            issues.push(Issue::new("tree.leaf.missing", "declared leaf has no leaf node").detail("leafId", leaf_id));
        }
    }

    for (id, node) in &tree.nodes {
        let TreeNode::Parent(p) = node else { continue };
        if p.child_ids.is_empty() {
            issues.push(Issue::new("tree.parent.empty", "parent has no children").detail("nodeId", id));
        }
        if p.child_ids.len() > max_children_per_parent {
            issues.push(
                Issue::new("tree.branching", "parent exceeds maxChildrenPerParent")
                    .detail("nodeId", id)
                    .detail("childCount", p.child_ids.len().to_string()),
            );
        }
        let child_set: BTreeSet<&String> = p.child_ids.iter().collect();
        let ref_set: BTreeSet<&String> = p.evidence_refs.iter().collect();
        if p.evidence_refs.is_empty() || child_set != ref_set {
            issues.push(
                Issue::new(
                    "tree.evidence",
                    "evidenceRefs is not set-equal to childIds",
                )
                .detail("nodeId", id),
            );
        }
        let expected = mint_parent_id(p.depth, p.group_index, &p.child_ids);
        if *id != expected {
            issues.push(
                Issue::new("tree.parent.id", "parent id does not match its derivation")
                    .detail("expected", expected)
                    .detail("actual", id),
            );
        }
        if !tree.policy_diagnostics_by_parent.contains_key(id) {
            issues.push(
                Issue::new("tree.diagnostics.missing", "parent has no policy diagnostics")
                    .detail("nodeId", id),
            );
        }
    }

    ValidationOutcome::from_issues(issues)
}

/// Throwing wrapper over [`validate_tree`].
pub fn assert_valid_tree(
    tree: &ExplanationTree,
    max_children_per_parent: usize,
) -> ExplainResult<()> {
    let outcome = validate_tree(tree, max_children_per_parent);
    if !outcome.ok {
        return Err(outcome.into_error("explanation tree"));
    }
    Ok(())
}

impl CanonicalRender for ExplanationTree {
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.text_field("configHash", &self.config_hash);
        w.sorted_list_field("leafIds", &self.leaf_ids);
        w.field("maxDepth", self.max_depth);
        w.text_field("rootId", &self.root_id);
        for (id, node) in &self.nodes {
            let prefix = format!("node.{id}");
            match node {
                TreeNode::Leaf(l) => {
                    w.text_field(&format!("{prefix}.kind"), "leaf");
                    w.text_field(&format!("{prefix}.hash"), &l.canonical_hash_hex());
                }
                TreeNode::Parent(p) => {
                    w.text_field(&format!("{prefix}.kind"), "parent");
                    w.field(&format!("{prefix}.abstractionScore"), p.abstraction_score);
                    w.list_field(&format!("{prefix}.childIds"), &p.child_ids);
                    w.field(&format!("{prefix}.complexityScore"), p.complexity_score);
                    w.field(&format!("{prefix}.confidence"), p.confidence);
                    w.field(&format!("{prefix}.depth"), p.depth);
                    w.sorted_list_field(&format!("{prefix}.evidenceRefs"), &p.evidence_refs);
                    w.field(&format!("{prefix}.groupIndex"), p.group_index);
                    w.sorted_list_field(
                        &format!("{prefix}.newTermsIntroduced"),
                        &p.new_terms_introduced,
                    );
                    w.text_field(&format!("{prefix}.statement"), &p.statement);
                    w.text_field(
                        &format!("{prefix}.whyTrueFromChildren"),
                        &p.why_true_from_children,
                    );
                }
            }
        }
        for entry in &self.group_plan {
            let prefix = format!("plan.{:06}.{:06}", entry.depth, entry.index);
            w.field(&format!("{prefix}.complexitySpread"), entry.complexity_spread);
            w.list_field(&format!("{prefix}.inputNodeIds"), &entry.input_node_ids);
            w.text_field(&format!("{prefix}.outputNodeId"), &entry.output_node_id);
        }
        w.finish()
    }
}

/// Canonical hash of a built tree.
pub fn compute_tree_hash(tree: &ExplanationTree) -> String {
    tree.canonical_hash_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leaf::{canonicalize_leaf, leaf_id, LeafRecord, SourceSpan, TheoremKind};

    pub(crate) fn leaf(name: &str) -> LeafRecord {
        canonicalize_leaf(LeafRecord {
            id: leaf_id("M", name, 1, 1),
            module_path: "M".into(),
            declaration_name: name.into(),
            theorem_kind: TheoremKind::Theorem,
            statement_text: format!("statement {name}"),
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
        })
        .unwrap()
    }

    fn two_leaf_tree() -> ExplanationTree {
        let a = leaf("a");
        let b = leaf("b");
        let child_ids = vec![a.id.clone(), b.id.clone()];
        let pid = mint_parent_id(1, 0, &child_ids);
        let parent = ParentNode {
            id: pid.clone(),
            depth: 1,
            group_index: 0,
            child_ids: child_ids.clone(),
            statement: "both statements".into(),
            why_true_from_children: "joined".into(),
            new_terms_introduced: vec![],
            complexity_score: 3.0,
            abstraction_score: 3.0,
            confidence: 0.8,
            evidence_refs: child_ids.clone(),
        };
        let mut nodes = BTreeMap::new();
        nodes.insert(a.id.clone(), TreeNode::Leaf(a.clone()));
        nodes.insert(b.id.clone(), TreeNode::Leaf(b.clone()));
        nodes.insert(pid.clone(), TreeNode::Parent(parent));
        let mut diags = BTreeMap::new();
        diags.insert(
            pid.clone(),
            ParentPolicyDiagnostics {
                depth: 1,
                group_index: 0,
                retries_used: 0,
                pre_violations: vec![],
                post_violations: vec![],
                post_metrics: PolicyMetrics::default(),
            },
        );
        ExplanationTree {
            root_id: pid.clone(),
            leaf_ids: vec![a.id.clone(), b.id.clone()],
            nodes,
            config_hash: "cfg".into(),
            group_plan: vec![GroupPlanEntry {
                depth: 1,
                index: 0,
                input_node_ids: child_ids,
                output_node_id: pid,
                complexity_spread: 0.0,
            }],
            grouping_diagnostics: vec![],
            policy_diagnostics_by_parent: diags,
            max_depth: 1,
        }
    }

    #[test]
    fn parent_id_ignores_child_order() {
        let ids_a = vec!["x".to_string(), "y".to_string()];
        let ids_b = vec!["y".to_string(), "x".to_string()];
        assert_eq!(mint_parent_id(2, 1, &ids_a), mint_parent_id(2, 1, &ids_b));
        assert!(mint_parent_id(2, 1, &ids_a).starts_with("p_2_1_"));
        assert_ne!(mint_parent_id(2, 1, &ids_a), mint_parent_id(2, 2, &ids_a));
    }

    #[test]
    fn valid_tree_passes() {
        let tree = two_leaf_tree();
        let outcome = validate_tree(&tree, 5);
        assert!(outcome.ok, "issues: {:?}", outcome.issues);
    }

    #[test]
    fn evidence_mismatch_detected() {
        let mut tree = two_leaf_tree();
        let root = tree.root_id.clone();
        if let Some(TreeNode::Parent(p)) = tree.nodes.get_mut(&root) {
            p.evidence_refs.pop();
        }
        let outcome = validate_tree(&tree, 5);
        assert!(outcome.issues.iter().any(|i| i.code == "tree.evidence"));
    }

    #[test]
    fn branching_bound_detected() {
        let tree = two_leaf_tree();
        let outcome = validate_tree(&tree, 1);
        assert!(outcome.issues.iter().any(|i| i.code == "tree.branching"));
    }

    #[test]
    fn support_set_collects_leaves() {
        let tree = two_leaf_tree();
        let support = tree.support_leaf_ids(&tree.root_id).unwrap();
        assert_eq!(support, tree.leaf_ids);
        // A leaf supports itself.
        let leaf_support = tree.support_leaf_ids(&tree.leaf_ids[0]).unwrap();
        assert_eq!(leaf_support, vec![tree.leaf_ids[0].clone()]);
    }

    #[test]
    fn tree_hash_is_stable() {
        let a = two_leaf_tree();
        let b = two_leaf_tree();
        assert_eq!(a.canonical_hash_hex(), b.canonical_hash_hex());
    }

    #[test]
    fn missing_diagnostics_detected() {
        let mut tree = two_leaf_tree();
        tree.policy_diagnostics_by_parent.clear();
        let outcome = validate_tree(&tree, 5);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.code == "tree.diagnostics.missing"));
    }
}
