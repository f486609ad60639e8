//! Dependency graph over theorem declarations.
//!
//! The graph is an indexed structure: string ids with explicit adjacency
//! maps, no node pointers. Guarantees:
//! - duplicate declaration ids are rejected
//! - unknown dependency ids are either dropped or retained as external
//!   nodes (an option), and every `(declarationId, dependencyId)` pair that
//!   lacked a definition is reported
//! - `cyclic_sccs` contains every strongly-connected component of size ≥ 2
//!   and every self-loop singleton, in deterministic order
//! - support closures are produced post-order with sorted child visits and
//!   first-emission dedup, and are cached per id
//!
//! Querying an unknown id fails with a clear error, never a silent empty set.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{ExplainError, ExplainResult};

/// Minimal input shape: a declaration and the ids it depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationRef {
    pub id: String,
    #[serde(default)]
    pub dependency_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphOptions {
    /// Keep undeclared dependency targets as external nodes instead of
    /// dropping the edges.
    pub retain_external: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            retain_external: true,
        }
    }
}

/// A dependency reference whose target had no declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDependencyRef {
    pub declaration_id: String,
    pub dependency_id: String,
}

/// Aggregate view used by reports and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub node_ids: Vec<String>,
    pub edge_count: usize,
    pub indexed_node_count: usize,
    pub external_node_count: usize,
    pub missing_dependency_refs: Vec<MissingDependencyRef>,
    pub cyclic_sccs: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// id -> sorted dependency ids (edges point at prerequisites).
    adjacency: BTreeMap<String, Vec<String>>,
    external: BTreeSet<String>,
    edge_count: usize,
    missing_dependency_refs: Vec<MissingDependencyRef>,
    cyclic_sccs: Vec<Vec<String>>,
    support_cache: BTreeMap<(String, bool), Vec<String>>,
}

impl DependencyGraph {
    pub fn build(decls: &[DeclarationRef], options: &GraphOptions) -> ExplainResult<Self> {
        let mut declared: BTreeSet<String> = BTreeSet::new();
        for d in decls {
            if d.id.trim().is_empty() {
                return Err(ExplainError::invalid_argument("declaration id is empty"));
            }
            if !declared.insert(d.id.clone()) {
                return Err(ExplainError::invalid_argument(format!(
                    "duplicate declaration id: {}",
                    d.id
                )));
            }
        }

        let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut external: BTreeSet<String> = BTreeSet::new();
        let mut missing: Vec<MissingDependencyRef> = Vec::new();
        let mut edge_count = 0usize;

        for d in decls {
            let mut deps: BTreeSet<String> = BTreeSet::new();
            for dep in &d.dependency_ids {
                if dep.trim().is_empty() {
                    return Err(ExplainError::invalid_argument(format!(
                        "declaration {} has an empty dependency id",
                        d.id
                    )));
                }
                if !declared.contains(dep) {
                    missing.push(MissingDependencyRef {
                        declaration_id: d.id.clone(),
                        dependency_id: dep.clone(),
                    });
                    if !options.retain_external {
                        continue;
                    }
                    external.insert(dep.clone());
                }
                deps.insert(dep.clone());
            }
            edge_count += deps.len();
            adjacency.insert(d.id.clone(), deps.into_iter().collect());
        }

        for ext in &external {
            adjacency.entry(ext.clone()).or_default();
        }

        missing.sort_by(|a, b| {
            (a.declaration_id.as_str(), a.dependency_id.as_str())
                .cmp(&(b.declaration_id.as_str(), b.dependency_id.as_str()))
        });

        let scc_input: BTreeMap<String, BTreeSet<String>> = adjacency
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect();
        let cyclic_sccs = cyclic_components(&scc_input);

        Ok(Self {
            adjacency,
            external,
            edge_count,
            missing_dependency_refs: missing,
            cyclic_sccs,
            support_cache: BTreeMap::new(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adjacency.contains_key(id)
    }

    pub fn is_external(&self, id: &str) -> bool {
        self.external.contains(id)
    }

    pub fn dependencies_of(&self, id: &str) -> ExplainResult<&[String]> {
        self.adjacency
            .get(id)
            .map(|v| v.as_slice())
            .ok_or_else(|| ExplainError::unknown_id(format!("unknown declaration id: {id}")))
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            node_ids: self.adjacency.keys().cloned().collect(),
            edge_count: self.edge_count,
            indexed_node_count: self.adjacency.len() - self.external.len(),
            external_node_count: self.external.len(),
            missing_dependency_refs: self.missing_dependency_refs.clone(),
            cyclic_sccs: self.cyclic_sccs.clone(),
        }
    }

    /// Full transitive closure of supporting declarations, excluding the
    /// queried id. Children are walked in sorted order, results emitted
    /// post-order, duplicates suppressed on first emission.
    pub fn supporting_declarations(
        &mut self,
        id: &str,
        include_external: bool,
    ) -> ExplainResult<Vec<String>> {
        if !self.adjacency.contains_key(id) {
            return Err(ExplainError::unknown_id(format!(
                "unknown declaration id: {id}"
            )));
        }
        let key = (id.to_string(), include_external);
        if let Some(cached) = self.support_cache.get(&key) {
            return Ok(cached.clone());
        }

        let mut emitted: BTreeSet<String> = BTreeSet::new();
        let mut order: Vec<String> = Vec::new();
        // (node, next child index); post-order on frame pop.
        let mut stack: Vec<(String, usize)> = vec![(id.to_string(), 0)];
        let mut on_path: BTreeSet<String> = BTreeSet::new();
        on_path.insert(id.to_string());

        while let Some((node, child_idx)) = stack.pop() {
            let children = self.adjacency.get(&node).cloned().unwrap_or_default();
            if child_idx < children.len() {
                stack.push((node.clone(), child_idx + 1));
                let child = &children[child_idx];
                let skip = (!include_external && self.external.contains(child))
                    || emitted.contains(child)
                    || on_path.contains(child);
                if !skip {
                    on_path.insert(child.clone());
                    stack.push((child.clone(), 0));
                }
            } else {
                on_path.remove(&node);
                if node != id && emitted.insert(node.clone()) {
                    order.push(node);
                }
            }
        }

        self.support_cache.insert(key, order.clone());
        Ok(order)
    }
}

/// Strongly-connected components via iterative Tarjan.
///
/// Returns every component (including singletons) with members sorted,
/// components ordered by their lexicographically-minimum member.
pub fn strongly_connected_components(
    adjacency: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<Vec<String>> {
    let ids: Vec<&String> = adjacency.keys().collect();
    let index_of: BTreeMap<&String, usize> = ids.iter().enumerate().map(|(i, s)| (*s, i)).collect();
    let n = ids.len();

    const UNVISITED: usize = usize::MAX;
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<String>> = Vec::new();

    // Explicit DFS frames: (node, position in its sorted neighbor list).
    for start in 0..n {
        if index[start] != UNVISITED {
            continue;
        }
        let mut frames: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some((v, pos)) = frames.pop() {
            if pos == 0 {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            let neighbors: Vec<usize> = adjacency[ids[v]]
                .iter()
                .filter_map(|w| index_of.get(w).copied())
                .collect();
            if pos < neighbors.len() {
                frames.push((v, pos + 1));
                let w = neighbors[pos];
                if index[w] == UNVISITED {
                    frames.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                if lowlink[v] == index[v] {
                    let mut members: Vec<String> = Vec::new();
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        members.push(ids[w].clone());
                        if w == v {
                            break;
                        }
                    }
                    members.sort();
                    components.push(members);
                }
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
            }
        }
    }

    components.sort();
    components
}

/// SCCs of size ≥ 2 plus self-loop singletons.
pub fn cyclic_components(adjacency: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    strongly_connected_components(adjacency)
        .into_iter()
        .filter(|c| {
            c.len() >= 2 || adjacency.get(&c[0]).map(|d| d.contains(&c[0])).unwrap_or(false)
        })
        .collect()
}
