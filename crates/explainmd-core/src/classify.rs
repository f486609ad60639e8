//! Domain-adapter classification port.
//!
//! Adapters attach classification tags to leaves. They are consumed behind a
//! capability interface; implementations must be deterministic (no I/O, no
//! randomness). The builtin keyword classifier covers the common Mathlib
//! top-level areas and is what ingestion uses by default.

use serde::{Deserialize, Serialize};

use crate::determinism::stable_sort::sorted_unique_strings;
use crate::model::leaf::LeafRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutcome {
    pub adapter_id: String,
    pub tags: Vec<String>,
    pub confidence: f64,
    pub warnings: Vec<String>,
}

/// Deterministic leaf classifier.
pub trait LeafClassifier: Send + Sync {
    fn adapter_id(&self) -> &str;
    fn classify(&self, leaf: &LeafRecord) -> ClassificationOutcome;
}

/// Keyword classifier: matches module-path and statement substrings against
/// a fixed rule table and emits `domain:<area>` tags.
pub struct KeywordClassifier {
    adapter_id: String,
    rules: Vec<(String, String)>,
}

impl KeywordClassifier {
    pub fn new(adapter_id: impl Into<String>, rules: Vec<(String, String)>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            rules,
        }
    }

    /// Rule table for Mathlib-style corpora.
    pub fn builtin_mathlib() -> Self {
        let rules = [
            ("algebra", "domain:algebra"),
            ("analysis", "domain:analysis"),
            ("category", "domain:category-theory"),
            ("combinatorics", "domain:combinatorics"),
            ("geometry", "domain:geometry"),
            ("group", "domain:algebra"),
            ("lattice", "domain:order"),
            ("logic", "domain:logic"),
            ("measure", "domain:analysis"),
            ("number", "domain:number-theory"),
            ("order", "domain:order"),
            ("ring", "domain:algebra"),
            ("topology", "domain:topology"),
        ]
        .into_iter()
        .map(|(k, t)| (k.to_string(), t.to_string()))
        .collect();
        Self::new("builtin.keyword", rules)
    }
}

impl LeafClassifier for KeywordClassifier {
    fn adapter_id(&self) -> &str {
        &self.adapter_id
    }

    fn classify(&self, leaf: &LeafRecord) -> ClassificationOutcome {
        let haystack = format!(
            "{} {} {}",
            leaf.module_path.to_lowercase(),
            leaf.declaration_name.to_lowercase(),
            leaf.statement_text.to_lowercase()
        );
        let mut tags: Vec<String> = Vec::new();
        for (keyword, tag) in &self.rules {
            if haystack.contains(keyword.as_str()) {
                tags.push(tag.clone());
            }
        }
        let tags = sorted_unique_strings(&tags);
        let mut warnings = Vec::new();
        if tags.is_empty() {
            warnings.push("no rule matched; leaf left untagged".to_string());
        }
        // Confidence degrades as the match set widens: a single area is a
        // stronger signal than a scattershot hit.
        let confidence = match tags.len() {
            0 => 0.0,
            1 => 0.9,
            2 => 0.7,
            _ => 0.5,
        };
        ClassificationOutcome {
            adapter_id: self.adapter_id.clone(),
            tags,
            confidence,
            warnings,
        }
    }
}
