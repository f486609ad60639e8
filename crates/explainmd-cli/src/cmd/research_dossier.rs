//! `explainmd research-dossier` — a corpus overview for researchers.
//!
//! Reads an ingestion record and reports kind and tag distributions, graph
//! shape (SCCs, external references), and a first-layer grouping preview.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use explainmd_core::config::{compute_config_hash, compute_tree_cache_key, ExplainConfig};
use explainmd_core::graph::{DeclarationRef, DependencyGraph, GraphOptions, GraphSummary};
use explainmd_core::grouping::{partition_layer, GroupingNode, GroupingOptions};
use explainmd_core::model::leaf::IngestionRecord;

use crate::args::EXIT_OK;
use crate::io;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupingPreview {
    group_count: usize,
    largest_group: usize,
    cycle_warnings: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DossierReport {
    schema_version: String,
    leaf_count: usize,
    leaf_set_hash: String,
    config_hash: String,
    tree_cache_key: String,
    kind_counts: BTreeMap<String, usize>,
    tag_counts: BTreeMap<String, usize>,
    graph: GraphSummary,
    grouping_preview: GroupingPreview,
}

pub async fn run(include: &str, out: Option<&str>) -> Result<i32> {
    let record = IngestionRecord::from_json_str(&io::read_text_file(Path::new(include))?)?;
    let cfg = ExplainConfig::default();

    let mut kind_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
    for leaf in &record.leaves {
        *kind_counts
            .entry(leaf.theorem_kind.as_str().to_string())
            .or_default() += 1;
        for tag in &leaf.tags {
            *tag_counts.entry(tag.clone()).or_default() += 1;
        }
    }

    let decls: Vec<DeclarationRef> = record
        .leaves
        .iter()
        .map(|l| DeclarationRef {
            id: l.id.clone(),
            dependency_ids: l.dependency_ids.clone(),
        })
        .collect();
    let graph = DependencyGraph::build(&decls, &GraphOptions::default())?;
    let summary = graph.summary();

    let leaf_ids: std::collections::BTreeSet<&String> =
        record.leaves.iter().map(|l| &l.id).collect();
    let nodes: Vec<GroupingNode> = record
        .leaves
        .iter()
        .map(|l| GroupingNode {
            id: l.id.clone(),
            prerequisite_ids: l
                .dependency_ids
                .iter()
                .filter(|d| leaf_ids.contains(d))
                .cloned()
                .collect(),
            complexity: None,
        })
        .collect();
    let grouping = partition_layer(
        &nodes,
        &GroupingOptions {
            max_children_per_parent: cfg.max_children_per_parent,
            complexity_band_width: cfg.complexity_band_width as f64,
            target_complexity: cfg.complexity_level as f64,
        },
    )?;

    let report = DossierReport {
        schema_version: record.schema_version.clone(),
        leaf_count: record.leaves.len(),
        leaf_set_hash: record.leaf_set_hash.clone(),
        config_hash: compute_config_hash(&cfg),
        tree_cache_key: compute_tree_cache_key(&record.leaf_set_hash, &cfg),
        kind_counts,
        tag_counts,
        graph: summary,
        grouping_preview: GroupingPreview {
            group_count: grouping.groups.len(),
            largest_group: grouping
                .groups
                .iter()
                .map(|g| g.node_ids.len())
                .max()
                .unwrap_or(0),
            cycle_warnings: grouping.warnings.len(),
        },
    };

    if let Some(out_path) = out {
        io::write_text_file(Path::new(out_path), &serde_json::to_string_pretty(&report)?)?;
    }
    output::print(&report)?;
    Ok(EXIT_OK)
}
