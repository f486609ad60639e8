//! `explainmd quality-harness` — build a tree with the offline summarizer
//! and score it against thresholds and an optional baseline.
//!
//! Everything here is deterministic: same ingestion record, same report,
//! bit for bit. The baseline file carries the report metrics plus the tree
//! hash; any drift exits 2.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use explainmd_core::builder::build_tree;
use explainmd_core::config::{compute_config_hash, ExplainConfig};
use explainmd_core::determinism::canonical::CanonicalRender;
use explainmd_core::model::leaf::IngestionRecord;
use explainmd_core::model::tree::TreeNode;
use explainmd_core::version::QUALITY_BASELINE_SCHEMA_VERSION;
use explainmd_llm::OfflineSummarizer;

use crate::args::{EXIT_MISMATCH, EXIT_OK};
use crate::io;
use crate::output;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QualityMetrics {
    leaf_count: usize,
    parent_count: usize,
    max_depth: u32,
    max_branching: usize,
    repartition_count: usize,
    grouping_warning_count: usize,
    mean_vocabulary_coverage: f64,
    policy_pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QualityReport {
    schema_version: String,
    config_hash: String,
    leaf_set_hash: String,
    tree_hash: String,
    metrics: QualityMetrics,
    thresholds_ok: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    threshold_failures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    baseline_match: Option<bool>,
}

pub async fn run(
    include: &str,
    out: Option<&str>,
    baseline: Option<&str>,
    write_baseline: bool,
    min_vocabulary_coverage: f64,
    max_repartitions: usize,
) -> Result<i32> {
    let record = IngestionRecord::from_json_str(&io::read_text_file(Path::new(include))?)?;
    let cfg = ExplainConfig::default();
    let tree = build_tree(record.leaves.clone(), &cfg, &OfflineSummarizer).await?;

    let mut parent_count = 0usize;
    let mut max_branching = 0usize;
    for node in tree.nodes.values() {
        if let TreeNode::Parent(p) = node {
            parent_count += 1;
            max_branching = max_branching.max(p.child_ids.len());
        }
    }
    let repartition_count: usize = tree
        .grouping_diagnostics
        .iter()
        .map(|d| d.repartition_events.len())
        .sum();
    let grouping_warning_count: usize = tree
        .grouping_diagnostics
        .iter()
        .map(|d| d.warnings.len())
        .sum();

    let mut coverage_sum = 0.0f64;
    let mut coverage_n = 0usize;
    let mut clean_parents = 0usize;
    for diag in tree.policy_diagnostics_by_parent.values() {
        if let Some(c) = diag.post_metrics.vocabulary_coverage {
            coverage_sum += c;
            coverage_n += 1;
        }
        if diag.post_violations.is_empty() && diag.pre_violations.is_empty() {
            clean_parents += 1;
        }
    }
    let mean_vocabulary_coverage = if coverage_n == 0 {
        1.0
    } else {
        coverage_sum / coverage_n as f64
    };
    let policy_pass_rate = if parent_count == 0 {
        1.0
    } else {
        clean_parents as f64 / parent_count as f64
    };

    let metrics = QualityMetrics {
        leaf_count: tree.leaf_ids.len(),
        parent_count,
        max_depth: tree.max_depth,
        max_branching,
        repartition_count,
        grouping_warning_count,
        mean_vocabulary_coverage,
        policy_pass_rate,
    };

    let mut threshold_failures = Vec::new();
    if metrics.mean_vocabulary_coverage < min_vocabulary_coverage {
        threshold_failures.push(format!(
            "meanVocabularyCoverage {} below {min_vocabulary_coverage}",
            metrics.mean_vocabulary_coverage
        ));
    }
    if metrics.repartition_count > max_repartitions {
        threshold_failures.push(format!(
            "repartitionCount {} above {max_repartitions}",
            metrics.repartition_count
        ));
    }

    let mut report = QualityReport {
        schema_version: QUALITY_BASELINE_SCHEMA_VERSION.to_string(),
        config_hash: compute_config_hash(&cfg),
        leaf_set_hash: record.leaf_set_hash.clone(),
        tree_hash: tree.canonical_hash_hex(),
        metrics,
        thresholds_ok: threshold_failures.is_empty(),
        threshold_failures,
        baseline_match: None,
    };

    let mut exit = if report.thresholds_ok {
        EXIT_OK
    } else {
        EXIT_MISMATCH
    };

    if let Some(baseline_path) = baseline {
        if write_baseline {
            let mut persisted = report.clone();
            persisted.baseline_match = None;
            io::write_text_file(
                Path::new(baseline_path),
                &serde_json::to_string_pretty(&persisted)?,
            )?;
        } else {
            let loaded: QualityReport =
                serde_json::from_value(io::read_json_file(Path::new(baseline_path))?)?;
            let matches = loaded.tree_hash == report.tree_hash
                && loaded.metrics == report.metrics
                && loaded.config_hash == report.config_hash;
            report.baseline_match = Some(matches);
            if !matches {
                exit = EXIT_MISMATCH;
            }
        }
    }

    if let Some(out_path) = out {
        io::write_text_file(Path::new(out_path), &serde_json::to_string_pretty(&report)?)?;
    }
    output::print(&report)?;
    Ok(exit)
}
