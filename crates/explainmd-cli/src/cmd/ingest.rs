//! `explainmd ingest` — canonicalize declaration exports.
//!
//! Inputs are JSON files holding either an array of leaf records or an
//! object with a `declarations` array. Leaves are canonicalized, classified
//! by the builtin keyword adapter, aggregated into an ingestion record, and
//! summarized against the dependency graph.

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Serialize;

use explainmd_core::classify::{KeywordClassifier, LeafClassifier};
use explainmd_core::determinism::canonical::CanonicalRender;
use explainmd_core::determinism::stable_sort::sorted_unique_strings;
use explainmd_core::graph::{DeclarationRef, DependencyGraph, GraphOptions, GraphSummary};
use explainmd_core::model::leaf::{IngestionRecord, LeafRecord};

use crate::args::EXIT_OK;
use crate::io;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestReport {
    schema_version: String,
    leaf_count: usize,
    leaf_set_hash: String,
    ingestion_hash: String,
    graph: GraphSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    out_path: Option<String>,
}

fn leaves_from_value(value: serde_json::Value, path: &Path) -> Result<Vec<LeafRecord>> {
    let array = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj.remove("declarations") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(anyhow!(
                    "{}: expected an array or an object with a declarations array",
                    path.display()
                ))
            }
        },
        _ => {
            return Err(anyhow!(
                "{}: expected an array or an object with a declarations array",
                path.display()
            ))
        }
    };
    array
        .into_iter()
        .map(|item| {
            serde_json::from_value::<LeafRecord>(item)
                .map_err(|e| anyhow!("{}: bad declaration: {e}", path.display()))
        })
        .collect()
}

pub async fn run(includes: &[String], out: Option<&str>, drop_external: bool) -> Result<i32> {
    let paths = io::collect_include_paths(includes)?;
    let mut leaves: Vec<LeafRecord> = Vec::new();
    for path in &paths {
        let value = io::read_json_file(path)?;
        leaves.extend(leaves_from_value(value, path)?);
    }

    // Attach adapter tags before canonicalization freezes the record.
    let classifier = KeywordClassifier::builtin_mathlib();
    for leaf in &mut leaves {
        let outcome = classifier.classify(leaf);
        let mut tags = leaf.tags.clone();
        tags.extend(outcome.tags);
        leaf.tags = sorted_unique_strings(&tags);
    }

    let record = IngestionRecord::new(leaves)?;

    let decls: Vec<DeclarationRef> = record
        .leaves
        .iter()
        .map(|l| DeclarationRef {
            id: l.id.clone(),
            dependency_ids: l.dependency_ids.clone(),
        })
        .collect();
    let graph = DependencyGraph::build(
        &decls,
        &GraphOptions {
            retain_external: !drop_external,
        },
    )?;

    if let Some(out_path) = out {
        io::write_text_file(Path::new(out_path), &record.to_json_string()?)?;
    }

    output::print(&IngestReport {
        schema_version: record.schema_version.clone(),
        leaf_count: record.leaves.len(),
        leaf_set_hash: record.leaf_set_hash.clone(),
        ingestion_hash: record.canonical_hash_hex(),
        graph: graph.summary(),
        out_path: out.map(|s| s.to_string()),
    })?;
    Ok(EXIT_OK)
}
