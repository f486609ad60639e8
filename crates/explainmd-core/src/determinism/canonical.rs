//! Canonical line-oriented rendering for explainmd artifacts.
//!
//! Every shareable artifact has a canonical rendering and a sha256 computed
//! over its UTF-8 bytes. The rules, in force everywhere:
//!
//! - one `key=value` line per field, lines sorted lexicographically by key
//! - absent optionals emit the literal token `none`
//! - strings that may carry delimiters or newlines are JSON-encoded
//! - multi-value fields join entries with the ASCII Unit Separator (U+001F)
//! - ordered record lists use zero-padded index segments in their keys, so
//!   the global key sort preserves the derived order
//! - wall-clock fields (`generatedAt` and friends) never enter the writer
//! - no BOM; a single final newline
//!
//! Because lines are sorted at `finish()`, renderings are invariant under any
//! input reordering of maps, sets, and independent lists — provided callers
//! key entries by content (ids) rather than arrival order.

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::determinism::hashing::hash_str_hex;

/// The multi-value separator (ASCII Unit Separator).
pub const VALUE_SEPARATOR: char = '\u{1F}';

/// Encode a text value for a canonical line.
///
/// Plain values pass through untouched; anything that could be confused with
/// the line structure is JSON-encoded.
pub fn encode_text(value: &str) -> String {
    let needs_encoding = value.is_empty()
        || value != value.trim()
        || value
            .chars()
            .any(|c| matches!(c, '\n' | '\r' | '"' | '\\' | '=' | VALUE_SEPARATOR));
    if needs_encoding {
        // serde_json string encoding is deterministic.
        serde_json::to_string(value).expect("string encoding cannot fail")
    } else {
        value.to_string()
    }
}

/// Collects `key=value` pairs and emits the sorted canonical rendering.
#[derive(Debug, Default)]
pub struct CanonicalWriter {
    lines: Vec<(String, String)>,
}

impl CanonicalWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scalar field rendered with `Display` (numbers, bools, enum tokens).
    pub fn field(&mut self, key: &str, value: impl Display) {
        self.lines.push((key.to_string(), value.to_string()));
    }

    /// A free-form text field.
    pub fn text_field(&mut self, key: &str, value: &str) {
        self.lines.push((key.to_string(), encode_text(value)));
    }

    /// An optional text field; `None` emits the `none` token.
    pub fn opt_text_field(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(v) => self.text_field(key, v),
            None => self.field(key, "none"),
        }
    }

    /// An optional scalar field; `None` emits the `none` token.
    pub fn opt_field<T: Display>(&mut self, key: &str, value: Option<T>) {
        match value {
            Some(v) => self.field(key, v),
            None => self.field(key, "none"),
        }
    }

    /// A multi-value field: entries encoded individually, joined with U+001F.
    /// Callers pass entries already in canonical order (or use
    /// [`CanonicalWriter::sorted_list_field`]).
    pub fn list_field(&mut self, key: &str, values: &[String]) {
        let joined = values
            .iter()
            .map(|v| encode_text(v))
            .collect::<Vec<_>>()
            .join(&VALUE_SEPARATOR.to_string());
        self.lines.push((key.to_string(), joined));
    }

    /// A set-valued field: entries are sorted before emission.
    pub fn sorted_list_field(&mut self, key: &str, values: &[String]) {
        let mut sorted: Vec<String> = values.to_vec();
        sorted.sort();
        self.list_field(key, &sorted);
    }

    /// A mapping rendered as `prefix.key=value` lines, sorted by key.
    pub fn map_field(&mut self, prefix: &str, map: &BTreeMap<String, String>) {
        for (k, v) in map {
            self.text_field(&format!("{prefix}.{k}"), v);
        }
    }

    /// Key segment for an ordered record list: zero-padded so the global key
    /// sort preserves the sequence.
    pub fn index_key(prefix: &str, index: usize, field: &str) -> String {
        format!("{prefix}.{index:06}.{field}")
    }

    /// Emit the sorted rendering with a trailing newline.
    pub fn finish(mut self) -> String {
        self.lines.sort();
        let mut out = String::new();
        for (k, v) in &self.lines {
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push('\n');
        }
        out
    }
}

/// Artifacts with a canonical rendering and content address.
pub trait CanonicalRender {
    fn canonical_render(&self) -> String;

    /// Lowercase hex sha256 over the canonical rendering.
    fn canonical_hash_hex(&self) -> String {
        hash_str_hex(&self.canonical_render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(encode_text("alpha beta"), "alpha beta");
    }

    #[test]
    fn delimiters_force_json_encoding() {
        assert_eq!(encode_text("a=b"), "\"a=b\"");
        assert_eq!(encode_text("line1\nline2"), "\"line1\\nline2\"");
        assert_eq!(encode_text(" padded "), "\" padded \"");
        assert_eq!(encode_text(""), "\"\"");
    }

    #[test]
    fn rendering_sorts_and_terminates() {
        let mut w = CanonicalWriter::new();
        w.field("beta", 2);
        w.field("alpha", 1);
        assert_eq!(w.finish(), "alpha=1\nbeta=2\n");
    }

    #[test]
    fn none_token_for_absent_optionals() {
        let mut w = CanonicalWriter::new();
        w.opt_text_field("url", None);
        w.opt_field::<u32>("line", None);
        assert_eq!(w.finish(), "line=none\nurl=none\n");
    }

    #[test]
    fn sorted_list_is_input_order_invariant() {
        let mut a = CanonicalWriter::new();
        a.sorted_list_field("tags", &["b".into(), "a".into()]);
        let mut b = CanonicalWriter::new();
        b.sorted_list_field("tags", &["a".into(), "b".into()]);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn index_keys_preserve_sequence() {
        let mut w = CanonicalWriter::new();
        w.text_field(&CanonicalWriter::index_key("entry", 10, "id"), "j");
        w.text_field(&CanonicalWriter::index_key("entry", 2, "id"), "b");
        let out = w.finish();
        let first = out.find("entry.000002").unwrap();
        let second = out.find("entry.000010").unwrap();
        assert!(first < second);
    }
}
