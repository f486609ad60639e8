//! Deterministic child grouping.
//!
//! Partition one layer's nodes into groups of size ≤ `maxChildrenPerParent`
//! such that:
//! - every prerequisite appears before its dependents in the linear order
//!   underlying the partition
//! - the complexity spread within each group is ≤ `complexityBandWidth`
//!
//! The linearization is cycle-safe: SCCs over in-layer prerequisite edges are
//! collapsed, members of a cyclic SCC are ordered lexicographically with
//! their internal edges treated as non-binding, and a `cycle_detected`
//! warning is recorded. Outside SCCs, Kahn's algorithm with a lexicographic
//! tie-break on ready nodes yields a total order.
//!
//! Same nodes in any input order produce the same groups and the same
//! `orderedNodeIds`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{ExplainError, ExplainResult};
use crate::graph::cyclic_components;

/// One node of the layer being partitioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingNode {
    pub id: String,
    /// Prerequisite ids; edges pointing outside the current layer are ignored.
    #[serde(default)]
    pub prerequisite_ids: Vec<String>,
    /// Missing complexity is imputed with `targetComplexity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupingOptions {
    pub max_children_per_parent: usize,
    pub complexity_band_width: f64,
    pub target_complexity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingWarningCode {
    CycleDetected,
}

impl GroupingWarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CycleDetected => "cycle_detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingWarning {
    pub code: GroupingWarningCode,
    pub message: String,
    pub member_ids: Vec<String>,
}

/// A packed group, pre-summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDraft {
    pub index: usize,
    pub node_ids: Vec<String>,
    pub complexity_spread: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingOutcome {
    pub ordered_node_ids: Vec<String>,
    pub groups: Vec<GroupDraft>,
    pub warnings: Vec<GroupingWarning>,
    /// In-layer prerequisite edges `(prerequisite, dependent)` internal to a
    /// cyclic SCC. Downstream order checks must not count these.
    pub cycle_edges: BTreeSet<(String, String)>,
}

fn validate_nodes(nodes: &[GroupingNode]) -> ExplainResult<BTreeMap<String, &GroupingNode>> {
    let mut by_id: BTreeMap<String, &GroupingNode> = BTreeMap::new();
    for n in nodes {
        if n.id.trim().is_empty() {
            return Err(ExplainError::invalid_argument("grouping node id is empty"));
        }
        if by_id.insert(n.id.clone(), n).is_some() {
            return Err(ExplainError::invalid_argument(format!(
                "duplicate grouping node id: {}",
                n.id
            )));
        }
        for p in &n.prerequisite_ids {
            if p.trim().is_empty() {
                return Err(ExplainError::invalid_argument(format!(
                    "grouping node {} has an empty prerequisite id",
                    n.id
                )));
            }
        }
    }
    Ok(by_id)
}

/// Cycle-safe topological linearization of a layer.
///
/// Returns the total order, cycle warnings, and the set of in-cycle edges.
pub fn linearize_layer(
    nodes: &[GroupingNode],
) -> ExplainResult<(Vec<String>, Vec<GroupingWarning>, BTreeSet<(String, String)>)> {
    let by_id = validate_nodes(nodes)?;

    // In-layer edges only: prerequisite -> dependent.
    let mut prereqs_of: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (id, node) in &by_id {
        let deps: BTreeSet<String> = node
            .prerequisite_ids
            .iter()
            .filter(|p| by_id.contains_key(*p) && *p != id)
            .cloned()
            .collect();
        prereqs_of.insert(id.clone(), deps);
    }

    // Detect cyclic SCCs; their internal edges become non-binding.
    let cyclic = cyclic_components(&prereqs_of);
    let mut warnings = Vec::new();
    let mut cycle_edges: BTreeSet<(String, String)> = BTreeSet::new();
    for scc in &cyclic {
        let members: BTreeSet<&String> = scc.iter().collect();
        for dependent in scc {
            for prereq in &prereqs_of[dependent] {
                if members.contains(prereq) {
                    cycle_edges.insert((prereq.clone(), dependent.clone()));
                }
            }
        }
        warnings.push(GroupingWarning {
            code: GroupingWarningCode::CycleDetected,
            message: format!(
                "prerequisite cycle among {} node(s); internal edges treated as non-binding",
                scc.len()
            ),
            member_ids: scc.clone(),
        });
    }

    // Kahn with lexicographic tie-break, counting only binding edges.
    let mut remaining: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut dependents_of: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (dependent, prereqs) in &prereqs_of {
        let binding: BTreeSet<String> = prereqs
            .iter()
            .filter(|p| !cycle_edges.contains(&((*p).clone(), dependent.clone())))
            .cloned()
            .collect();
        for p in &binding {
            dependents_of
                .entry(p.clone())
                .or_default()
                .insert(dependent.clone());
        }
        remaining.insert(dependent.clone(), binding);
    }

    let mut ready: BTreeSet<String> = remaining
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(id, _)| id.clone())
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(by_id.len());

    while let Some(next) = ready.iter().next().cloned() {
        ready.remove(&next);
        order.push(next.clone());
        if let Some(deps) = dependents_of.get(&next) {
            for d in deps.clone() {
                let entry = remaining.get_mut(&d).expect("dependent tracked");
                entry.remove(&next);
                if entry.is_empty() && !order.contains(&d) {
                    ready.insert(d);
                }
            }
        }
    }

    if order.len() != by_id.len() {
        // Cannot happen once cyclic edges are non-binding; guard anyway.
        return Err(ExplainError::invariant(
            "layer linearization did not consume every node",
        ));
    }

    Ok((order, warnings, cycle_edges))
}

/// Complexity of a node with the imputation rule applied.
pub fn effective_complexity(node: &GroupingNode, opts: &GroupingOptions) -> f64 {
    node.complexity.unwrap_or(opts.target_complexity)
}

/// Partition a layer: linearize, then pack along the order, opening a new
/// group whenever size or complexity band would be violated.
pub fn partition_layer(
    nodes: &[GroupingNode],
    opts: &GroupingOptions,
) -> ExplainResult<GroupingOutcome> {
    if opts.max_children_per_parent < 2 {
        return Err(ExplainError::invalid_argument(
            "maxChildrenPerParent must be at least 2",
        ));
    }
    let (order, warnings, cycle_edges) = linearize_layer(nodes)?;
    let by_id: BTreeMap<&str, &GroupingNode> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut groups: Vec<GroupDraft> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut min_c = f64::INFINITY;
    let mut max_c = f64::NEG_INFINITY;

    for id in &order {
        let c = effective_complexity(by_id[id.as_str()], opts);
        let would_overflow = current.len() + 1 > opts.max_children_per_parent;
        let would_spread = if current.is_empty() {
            false
        } else {
            max_c.max(c) - min_c.min(c) > opts.complexity_band_width
        };
        if would_overflow || would_spread {
            groups.push(GroupDraft {
                index: groups.len(),
                node_ids: std::mem::take(&mut current),
                complexity_spread: max_c - min_c,
            });
            min_c = f64::INFINITY;
            max_c = f64::NEG_INFINITY;
        }
        current.push(id.clone());
        min_c = min_c.min(c);
        max_c = max_c.max(c);
    }
    if !current.is_empty() {
        groups.push(GroupDraft {
            index: groups.len(),
            node_ids: current,
            complexity_spread: max_c - min_c,
        });
    }

    Ok(GroupingOutcome {
        ordered_node_ids: order,
        groups,
        warnings,
        cycle_edges,
    })
}
