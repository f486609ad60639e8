//! Leaf theorem records and the ingestion record.
//!
//! A leaf is the immutable canonical form of one Lean declaration as emitted
//! by the (out-of-scope) source parser. Canonicalization:
//! - trims every string field and rejects empties on required fields
//! - normalizes the module path to forward slashes
//! - clamps `theoremKind` to the closed set
//! - verifies span monotonicity (1-based, start ≤ end)
//! - sorts and dedups `dependencyIds` and `tags`
//!
//! The canonical render is used both for per-leaf hashes and as input to the
//! aggregate ingestion hash.

use serde::{Deserialize, Serialize};

use crate::determinism::canonical::{CanonicalRender, CanonicalWriter};
use crate::determinism::hashing::hash_str_hex;
use crate::determinism::stable_sort::sorted_unique_strings;
use crate::errors::{ExplainError, ExplainResult, Issue, ValidationOutcome};
use crate::version::INGESTION_SCHEMA_VERSION;

/// Closed set of declaration kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TheoremKind {
    Theorem,
    Lemma,
    Definition,
    Example,
}

impl TheoremKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Theorem => "theorem",
            Self::Lemma => "lemma",
            Self::Definition => "definition",
            Self::Example => "example",
        }
    }

    pub fn parse(s: &str) -> ExplainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "theorem" => Ok(Self::Theorem),
            "lemma" => Ok(Self::Lemma),
            "definition" => Ok(Self::Definition),
            "example" => Ok(Self::Example),
            other => Err(ExplainError::invalid_argument(format!(
                "unknown theorem kind: {other}"
            ))),
        }
    }
}

/// A source location. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpan {
    pub file_path: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceSpan {
    /// Monotone: start strictly before end, or same line with column order.
    pub fn is_monotone(&self) -> bool {
        self.start_line >= 1
            && self.start_column >= 1
            && (self.start_line < self.end_line
                || (self.start_line == self.end_line && self.start_column <= self.end_column))
    }
}

/// One canonicalized theorem declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafRecord {
    pub id: String,
    pub module_path: String,
    pub declaration_name: String,
    pub theorem_kind: TheoremKind,
    pub statement_text: String,
    pub source_span: SourceSpan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub dependency_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Stable leaf id: `lean:<module>:<name>:<startLine>:<startColumn>`.
pub fn leaf_id(
    module_path: &str,
    declaration_name: &str,
    start_line: u32,
    start_column: u32,
) -> String {
    format!(
        "lean:{}:{}:{}:{}",
        normalize_module_path(module_path),
        declaration_name.trim(),
        start_line,
        start_column
    )
}

/// Module paths are forward-slash normalized.
pub fn normalize_module_path(module_path: &str) -> String {
    module_path.trim().replace('\\', "/")
}

/// Collecting validator for a leaf already in canonical form.
pub fn validate_leaf(leaf: &LeafRecord) -> ValidationOutcome {
    let mut issues = Vec::new();

    let expected = leaf_id(
        &leaf.module_path,
        &leaf.declaration_name,
        leaf.source_span.start_line,
        leaf.source_span.start_column,
    );
    if leaf.id != expected {
        issues.push(
            Issue::new("leaf.id.format", "leaf id does not match its derivation")
                .detail("expected", expected)
                .detail("actual", leaf.id.clone()),
        );
    }

    for (field, value) in [
        ("modulePath", &leaf.module_path),
        ("declarationName", &leaf.declaration_name),
        ("statementText", &leaf.statement_text),
        ("sourceSpan.filePath", &leaf.source_span.file_path),
    ] {
        if value.trim().is_empty() {
            issues.push(Issue::new("leaf.field.empty", format!("{field} is empty")));
        }
    }

    if !leaf.source_span.is_monotone() {
        issues.push(Issue::new(
            "leaf.span.monotone",
            "source span must be 1-based with start before end",
        ));
    }

    if leaf.dependency_ids.iter().any(|d| d == &leaf.id) {
        issues.push(Issue::new(
            "leaf.dependency.self",
            "leaf lists itself as a dependency",
        ));
    }

    ValidationOutcome::from_issues(issues)
}

/// Canonicalize a leaf: trim, normalize, sort, then validate.
pub fn canonicalize_leaf(mut leaf: LeafRecord) -> ExplainResult<LeafRecord> {
    leaf.module_path = normalize_module_path(&leaf.module_path);
    leaf.declaration_name = leaf.declaration_name.trim().to_string();
    leaf.statement_text = leaf.statement_text.trim().to_string();
    leaf.source_span.file_path = leaf.source_span.file_path.trim().to_string();
    leaf.id = leaf.id.trim().to_string();
    if leaf.id.is_empty() {
        leaf.id = leaf_id(
            &leaf.module_path,
            &leaf.declaration_name,
            leaf.source_span.start_line,
            leaf.source_span.start_column,
        );
    }
    leaf.source_url = leaf
        .source_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    leaf.dependency_ids = sorted_unique_strings(&leaf.dependency_ids);
    leaf.tags = sorted_unique_strings(&leaf.tags);

    let outcome = validate_leaf(&leaf);
    if !outcome.ok {
        return Err(outcome.into_error("leaf"));
    }
    Ok(leaf)
}

impl CanonicalRender for LeafRecord {
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.text_field("declarationName", &self.declaration_name);
        w.sorted_list_field("dependencyIds", &self.dependency_ids);
        w.text_field("id", &self.id);
        w.text_field("modulePath", &self.module_path);
        w.text_field("sourceSpan.filePath", &self.source_span.file_path);
        w.field("sourceSpan.endColumn", self.source_span.end_column);
        w.field("sourceSpan.endLine", self.source_span.end_line);
        w.field("sourceSpan.startColumn", self.source_span.start_column);
        w.field("sourceSpan.startLine", self.source_span.start_line);
        w.opt_text_field("sourceUrl", self.source_url.as_deref());
        w.text_field("statementText", &self.statement_text);
        w.sorted_list_field("tags", &self.tags);
        w.text_field("theoremKind", self.theorem_kind.as_str());
        w.finish()
    }
}

/// The persisted result of one ingestion run.
///
/// `generatedAt` is metadata only and never enters the hash input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRecord {
    pub schema_version: String,
    pub leaf_set_hash: String,
    pub leaves: Vec<LeafRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

/// Aggregate hash over per-leaf canonical renders, sorted by leaf id.
pub fn compute_leaf_set_hash(leaves: &[LeafRecord]) -> String {
    let mut renders: Vec<(String, String)> = leaves
        .iter()
        .map(|l| (l.id.clone(), l.canonical_render()))
        .collect();
    renders.sort();
    let mut buf = String::new();
    for (_, r) in renders {
        buf.push_str(&r);
    }
    hash_str_hex(&buf)
}

impl IngestionRecord {
    /// Canonicalize every leaf, reject duplicate ids, sort by id, and compute
    /// the aggregate hash.
    pub fn new(leaves: Vec<LeafRecord>) -> ExplainResult<Self> {
        let mut canonical = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            canonical.push(canonicalize_leaf(leaf)?);
        }
        canonical.sort_by(|a, b| a.id.cmp(&b.id));
        for w in canonical.windows(2) {
            if w[0].id == w[1].id {
                return Err(ExplainError::invalid_argument(format!(
                    "duplicate leaf id: {}",
                    w[0].id
                )));
            }
        }
        let leaf_set_hash = compute_leaf_set_hash(&canonical);
        Ok(Self {
            schema_version: INGESTION_SCHEMA_VERSION.to_string(),
            leaf_set_hash,
            leaves: canonical,
            generated_at: None,
        })
    }

    /// Stable-key-order JSON with a trailing newline.
    pub fn to_json_string(&self) -> ExplainResult<String> {
        let mut s = serde_json::to_string_pretty(self)
            .map_err(|e| ExplainError::serialization(format!("ingestion encode failed: {e}")))?;
        s.push('\n');
        Ok(s)
    }

    /// Parse and re-canonicalize (`read(write(r)) == canonicalize(r)`).
    pub fn from_json_str(s: &str) -> ExplainResult<Self> {
        let raw: IngestionRecord = serde_json::from_str(s)
            .map_err(|e| ExplainError::serialization(format!("ingestion decode failed: {e}")))?;
        if raw.schema_version != INGESTION_SCHEMA_VERSION {
            return Err(ExplainError::invalid_argument(format!(
                "unsupported ingestion schema version: {}",
                raw.schema_version
            )));
        }
        let generated_at = raw.generated_at.clone();
        let mut rec = Self::new(raw.leaves)?;
        rec.generated_at = generated_at;
        if rec.leaf_set_hash != raw.leaf_set_hash {
            return Err(ExplainError::invariant(format!(
                "ingestion leafSetHash mismatch: recorded {}, recomputed {}",
                raw.leaf_set_hash, rec.leaf_set_hash
            )));
        }
        Ok(rec)
    }
}

impl CanonicalRender for IngestionRecord {
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.text_field("leafSetHash", &self.leaf_set_hash);
        w.field("leafCount", self.leaves.len());
        w.text_field("schemaVersion", &self.schema_version);
        for leaf in &self.leaves {
            // Keyed by id: input order cannot influence the rendering.
            w.text_field(&format!("leaf.{}.hash", leaf.id), &leaf.canonical_hash_hex());
        }
        w.finish()
    }
}
