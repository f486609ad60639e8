//! Recursive explanation-tree builder.
//!
//! Drives layers upward until a single root remains:
//! 1. re-order the active layer with the grouper's linearization and
//!    partition it
//! 2. size-1 groups pass through to the next layer unchanged
//! 3. larger groups run the pre-summary policy, the summarizer (which owns
//!    the one tightened retry), and the post-summary policy; policy failures
//!    split the group deterministically at `ceil(n/2)` and recurse
//! 4. every non-terminal layer must strictly contract, or the build aborts
//!
//! Groups are processed in ascending index order, sequentially — repartition
//! indexing depends on sequential index allocation, so cross-group
//! parallelism is deliberately not permitted.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::{compute_config_hash, ExplainConfig};
use crate::determinism::stable_sort::sorted_unique_strings;
use crate::errors::ExplainError;
use crate::grouping::{partition_layer, GroupingNode, GroupingOptions};
use crate::model::leaf::{canonicalize_leaf, LeafRecord};
use crate::model::tree::{
    mint_parent_id, validate_tree, ExplanationTree, GroupPlanEntry, LayerDiagnostics,
    ParentNode, ParentPolicyDiagnostics, RepartitionEvent, RepartitionReason, TreeNode,
};
use crate::policy::{pre_summary_check, PreSummaryInput, ViolationCode};
use crate::summarize::{
    ChildSummaryInput, ParentSummarizer, SummarizeError, SummarizeGroupRequest,
};

/// A policy failure that deterministic repartition cannot resolve.
#[derive(Debug, Clone)]
pub struct TreePolicyError {
    pub depth: u32,
    pub node_ids: Vec<String>,
    pub violation_codes: Vec<ViolationCode>,
}

#[derive(Debug, thiserror::Error)]
pub enum TreeBuildError {
    #[error(transparent)]
    Invalid(#[from] ExplainError),

    #[error("policy failure at depth {} cannot be repartitioned ({} node(s))", .0.depth, .0.node_ids.len())]
    Policy(TreePolicyError),

    #[error(transparent)]
    Summarizer(SummarizeError),

    #[error("layer at depth {depth} did not contract: {current} node(s) -> {next}")]
    NoProgress {
        depth: u32,
        current: usize,
        next: usize,
    },

    #[error("tree depth limit {limit} exceeded")]
    DepthLimit { limit: u32 },
}

/// Depth safety bound: `max(ceil(log_b(N)) + 2, min(2048, N))` with
/// `b = max(2, maxChildrenPerParent)`.
pub fn depth_limit(leaf_count: usize, max_children_per_parent: usize) -> u32 {
    let b = max_children_per_parent.max(2);
    let mut levels: u32 = 0;
    let mut capacity: u128 = 1;
    while capacity < leaf_count as u128 {
        capacity = capacity.saturating_mul(b as u128);
        levels += 1;
    }
    let linear = leaf_count.min(2048) as u32;
    (levels + 2).max(linear)
}

struct LayerState {
    depth: u32,
    next_index: usize,
    next_active: Vec<String>,
    repartition_events: Vec<RepartitionEvent>,
}

/// Build the explanation tree for a leaf corpus.
///
/// A single-leaf corpus yields that leaf as the root with `maxDepth = 0`.
pub async fn build_tree<S: ParentSummarizer + ?Sized>(
    leaves: Vec<LeafRecord>,
    config: &ExplainConfig,
    summarizer: &S,
) -> Result<ExplanationTree, TreeBuildError> {
    let cfg = config.clone().normalize();
    cfg.validate()?;

    if leaves.is_empty() {
        return Err(ExplainError::invalid_argument("leaf corpus is empty").into());
    }

    let mut nodes: BTreeMap<String, TreeNode> = BTreeMap::new();
    let mut leaf_deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut supports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut complexity: BTreeMap<String, Option<f64>> = BTreeMap::new();
    let mut statements: BTreeMap<String, String> = BTreeMap::new();

    for leaf in leaves {
        let leaf = canonicalize_leaf(leaf)?;
        let id = leaf.id.clone();
        if nodes.contains_key(&id) {
            return Err(ExplainError::invalid_argument(format!("duplicate leaf id: {id}")).into());
        }
        statements.insert(id.clone(), leaf.statement_text.clone());
        supports.insert(id.clone(), BTreeSet::from([id.clone()]));
        complexity.insert(id.clone(), None);
        leaf_deps.insert(id.clone(), leaf.dependency_ids.iter().cloned().collect());
        nodes.insert(id, TreeNode::Leaf(leaf));
    }
    // Only in-corpus dependencies participate in ordering.
    let leaf_id_set: BTreeSet<String> = nodes.keys().cloned().collect();
    for deps in leaf_deps.values_mut() {
        deps.retain(|d| leaf_id_set.contains(d));
    }

    let leaf_ids: Vec<String> = nodes.keys().cloned().collect();
    let mut active: Vec<String> = leaf_ids.clone();

    let limit = depth_limit(leaf_ids.len(), cfg.max_children_per_parent);
    let grouping_opts = GroupingOptions {
        max_children_per_parent: cfg.max_children_per_parent,
        complexity_band_width: cfg.complexity_band_width as f64,
        target_complexity: cfg.complexity_level as f64,
    };

    let mut group_plan: Vec<GroupPlanEntry> = Vec::new();
    let mut grouping_diagnostics: Vec<LayerDiagnostics> = Vec::new();
    let mut policy_diagnostics: BTreeMap<String, ParentPolicyDiagnostics> = BTreeMap::new();
    let mut depth: u32 = 0;

    while active.len() > 1 {
        depth += 1;
        if depth > limit {
            return Err(TreeBuildError::DepthLimit { limit });
        }

        // Owner map: which active node carries each leaf.
        let mut owner: BTreeMap<String, String> = BTreeMap::new();
        for id in &active {
            for leaf in &supports[id] {
                owner.insert(leaf.clone(), id.clone());
            }
        }

        // Parent-layer prerequisite edges reduce to leaf dependencies: A is a
        // prerequisite of B when a leaf under B depends on a leaf under A.
        let mut layer_nodes: Vec<GroupingNode> = Vec::with_capacity(active.len());
        for id in &active {
            let mut prereqs: BTreeSet<String> = BTreeSet::new();
            for leaf in &supports[id] {
                for dep in &leaf_deps[leaf] {
                    if let Some(owner_id) = owner.get(dep) {
                        if owner_id != id {
                            prereqs.insert(owner_id.clone());
                        }
                    }
                }
            }
            layer_nodes.push(GroupingNode {
                id: id.clone(),
                prerequisite_ids: prereqs.into_iter().collect(),
                complexity: complexity[id],
            });
        }

        let outcome = partition_layer(&layer_nodes, &grouping_opts)?;
        let by_id: BTreeMap<&str, &GroupingNode> =
            layer_nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut state = LayerState {
            depth,
            next_index: 0,
            next_active: Vec::new(),
            repartition_events: Vec::new(),
        };

        for group in &outcome.groups {
            let mut segments: VecDeque<(Vec<String>, u32)> = VecDeque::new();
            segments.push_back((group.node_ids.clone(), 0));

            while let Some((seg, round)) = segments.pop_front() {
                if seg.len() == 1 {
                    state.next_active.push(seg[0].clone());
                    continue;
                }

                let seg_nodes: Vec<GroupingNode> =
                    seg.iter().map(|id| (*by_id[id.as_str()]).clone()).collect();
                let pre = pre_summary_check(
                    &PreSummaryInput {
                        nodes: &seg_nodes,
                        cycle_edges: &outcome.cycle_edges,
                    },
                    &cfg,
                );
                if !pre.ok {
                    split_segment(
                        &mut segments,
                        &mut state,
                        seg,
                        round,
                        RepartitionReason::PreSummaryPolicy,
                        pre.violation_codes(),
                        cfg.max_children_per_parent,
                    )?;
                    continue;
                }

                let request = SummarizeGroupRequest {
                    depth,
                    group_index: state.next_index,
                    children: seg
                        .iter()
                        .map(|id| ChildSummaryInput {
                            id: id.clone(),
                            statement: statements[id].clone(),
                            complexity: complexity[id],
                        })
                        .collect(),
                    config: cfg.clone(),
                };

                match summarizer.summarize(request).await {
                    Ok(result) => {
                        let pid = mint_parent_id(depth, state.next_index, &seg);
                        let summary = result.summary;
                        let spread = segment_spread(&seg_nodes, &grouping_opts);

                        let parent = ParentNode {
                            id: pid.clone(),
                            depth,
                            group_index: state.next_index,
                            child_ids: seg.clone(),
                            statement: summary.parent_statement.clone(),
                            why_true_from_children: summary.why_true_from_children.clone(),
                            new_terms_introduced: sorted_unique_strings(
                                &summary.new_terms_introduced,
                            ),
                            complexity_score: summary.complexity_score,
                            abstraction_score: summary.abstraction_score,
                            confidence: summary.confidence,
                            evidence_refs: sorted_unique_strings(&summary.evidence_refs),
                        };
                        nodes.insert(pid.clone(), TreeNode::Parent(parent));
                        policy_diagnostics.insert(
                            pid.clone(),
                            ParentPolicyDiagnostics {
                                depth,
                                group_index: state.next_index,
                                retries_used: result.retries_used,
                                pre_violations: pre.violations.clone(),
                                post_violations: result.post.violations.clone(),
                                post_metrics: result.post.metrics.clone(),
                            },
                        );
                        group_plan.push(GroupPlanEntry {
                            depth,
                            index: state.next_index,
                            input_node_ids: seg.clone(),
                            output_node_id: pid.clone(),
                            complexity_spread: spread,
                        });

                        let mut union: BTreeSet<String> = BTreeSet::new();
                        for child in &seg {
                            union.extend(supports[child].iter().cloned());
                        }
                        supports.insert(pid.clone(), union);
                        complexity.insert(pid.clone(), Some(summary.complexity_score));
                        statements.insert(pid.clone(), summary.parent_statement);

                        state.next_active.push(pid);
                        state.next_index += 1;
                    }
                    Err(SummarizeError::Validation {
                        violations,
                        retries_used: _,
                    }) => {
                        let mut codes: Vec<ViolationCode> =
                            violations.iter().map(|v| v.code).collect();
                        codes.sort();
                        codes.dedup();
                        split_segment(
                            &mut segments,
                            &mut state,
                            seg,
                            round,
                            RepartitionReason::PostSummaryPolicy,
                            codes,
                            cfg.max_children_per_parent,
                        )?;
                    }
                    Err(err) => return Err(TreeBuildError::Summarizer(err)),
                }
            }
        }

        grouping_diagnostics.push(LayerDiagnostics {
            depth,
            warnings: outcome.warnings,
            repartition_events: state.repartition_events,
        });

        if state.next_active.len() >= active.len() {
            return Err(TreeBuildError::NoProgress {
                depth,
                current: active.len(),
                next: state.next_active.len(),
            });
        }
        active = state.next_active;
        active.sort();
    }

    let root_id = active[0].clone();
    let max_depth = nodes.values().map(|n| n.depth()).max().unwrap_or(0);

    let tree = ExplanationTree {
        root_id,
        leaf_ids,
        nodes,
        config_hash: compute_config_hash(&cfg),
        group_plan,
        grouping_diagnostics,
        policy_diagnostics_by_parent: policy_diagnostics,
        max_depth,
    };

    let outcome = validate_tree(&tree, cfg.max_children_per_parent);
    if !outcome.ok {
        return Err(TreeBuildError::Invalid(
            outcome.into_error("explanation tree"),
        ));
    }
    Ok(tree)
}

fn segment_spread(seg_nodes: &[GroupingNode], opts: &GroupingOptions) -> f64 {
    use crate::grouping::effective_complexity;
    if seg_nodes.is_empty() {
        return 0.0;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for n in seg_nodes {
        let c = effective_complexity(n, opts);
        min = min.min(c);
        max = max.max(c);
    }
    max - min
}

/// Deterministic split: pivot at `ceil(n/2)`, halves re-enter the queue in
/// order. A half that still exceeds the branching bound is a hard error.
fn split_segment(
    segments: &mut VecDeque<(Vec<String>, u32)>,
    state: &mut LayerState,
    seg: Vec<String>,
    round: u32,
    reason: RepartitionReason,
    violation_codes: Vec<ViolationCode>,
    max_children_per_parent: usize,
) -> Result<(), TreeBuildError> {
    let pivot = seg.len().div_ceil(2);
    let left: Vec<String> = seg[..pivot].to_vec();
    let right: Vec<String> = seg[pivot..].to_vec();

    if left.len() > max_children_per_parent || right.len() > max_children_per_parent {
        return Err(TreeBuildError::Policy(TreePolicyError {
            depth: state.depth,
            node_ids: seg,
            violation_codes,
        }));
    }

    state.repartition_events.push(RepartitionEvent {
        reason,
        round,
        node_ids: seg,
        violation_codes,
    });

    segments.push_front((right, round + 1));
    segments.push_front((left, round + 1));
    Ok(())
}
