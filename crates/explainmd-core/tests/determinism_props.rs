//! Property tests for the canonical rendering discipline.
//!
//! The universal contract: renderings are idempotent, and hashes are
//! invariant under reordering of every map, set, and independent list.

use proptest::prelude::*;

use explainmd_core::determinism::canonical::{encode_text, CanonicalRender, CanonicalWriter};
use explainmd_core::model::leaf::{leaf_id, IngestionRecord, LeafRecord, SourceSpan, TheoremKind};

fn leaf_with(name: String, deps: Vec<String>, tags: Vec<String>) -> LeafRecord {
    LeafRecord {
        id: leaf_id("Prop/Mod", &name, 1, 1),
        module_path: "Prop/Mod".to_string(),
        declaration_name: name,
        theorem_kind: TheoremKind::Lemma,
        statement_text: "some provable statement".to_string(),
        source_span: SourceSpan {
            file_path: "Prop/Mod.lean".to_string(),
            start_line: 1,
            start_column: 1,
            end_line: 3,
            end_column: 2,
        },
        source_url: None,
        dependency_ids: deps,
        tags,
    }
}

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

proptest! {
    #[test]
    fn encode_text_never_emits_raw_delimiters(s in ".*") {
        let encoded = encode_text(&s);
        if encoded != s {
            // Encoded form is a JSON string literal.
            prop_assert!(encoded.starts_with('"') && encoded.ends_with('"'));
            let decoded: String = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(decoded, s);
        } else {
            prop_assert!(!s.contains('\n'));
            prop_assert!(!s.contains('='));
            let unit_separator = char::from_u32(0x1F).unwrap();
            prop_assert!(!s.contains(unit_separator));
        }
    }

    #[test]
    fn writer_output_is_input_order_invariant(
        mut pairs in proptest::collection::vec((ident(), ident()), 1..8)
    ) {
        // Distinct keys: duplicate keys would legitimately collide.
        pairs.sort();
        pairs.dedup_by(|a, b| a.0 == b.0);

        let mut forward = CanonicalWriter::new();
        for (k, v) in &pairs {
            forward.text_field(k, v);
        }
        let mut backward = CanonicalWriter::new();
        for (k, v) in pairs.iter().rev() {
            backward.text_field(k, v);
        }
        prop_assert_eq!(forward.finish(), backward.finish());
    }

    #[test]
    fn leaf_hash_shuffle_invariant(
        deps in proptest::collection::vec(ident(), 0..6),
        tags in proptest::collection::vec(ident(), 0..6),
    ) {
        let mut shuffled_deps = deps.clone();
        shuffled_deps.reverse();
        let mut shuffled_tags = tags.clone();
        shuffled_tags.reverse();

        let a = explainmd_core::model::leaf::canonicalize_leaf(
            leaf_with("thm".to_string(), deps, tags)
        ).unwrap();
        let b = explainmd_core::model::leaf::canonicalize_leaf(
            leaf_with("thm".to_string(), shuffled_deps, shuffled_tags)
        ).unwrap();
        prop_assert_eq!(a.canonical_hash_hex(), b.canonical_hash_hex());
    }

    #[test]
    fn ingestion_hash_shuffle_invariant(
        names in proptest::collection::btree_set("[a-z]{1,6}", 1..6)
    ) {
        let leaves: Vec<LeafRecord> = names
            .iter()
            .map(|n| leaf_with(n.clone(), vec![], vec![]))
            .collect();
        let mut reversed = leaves.clone();
        reversed.reverse();

        let a = IngestionRecord::new(leaves).unwrap();
        let b = IngestionRecord::new(reversed).unwrap();
        prop_assert_eq!(a.leaf_set_hash.clone(), b.leaf_set_hash.clone());
        prop_assert_eq!(a.canonical_render(), b.canonical_render());
    }

    #[test]
    fn canonicalize_is_idempotent(name in "[a-z]{1,8}") {
        let once = explainmd_core::model::leaf::canonicalize_leaf(
            leaf_with(name, vec!["b".into(), "a".into()], vec!["t".into()])
        ).unwrap();
        let twice = explainmd_core::model::leaf::canonicalize_leaf(once.clone()).unwrap();
        prop_assert_eq!(once.canonical_render(), twice.canonical_render());
    }
}
