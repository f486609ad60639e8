//! Pedagogical policy oracles.
//!
//! Two deterministic decision points bracket every summarizer call:
//! - the **pre-summary** policy inspects the candidate group (complexity
//!   spread, prerequisite order)
//! - the **post-summary** policy inspects the returned summary (evidence
//!   coverage, term budget, vocabulary continuity)
//!
//! Both collect every violation before returning; nothing throws mid-list.
//!
//! Lexical discipline:
//! - lowercase, split on any character outside `[a-z0-9_]`
//! - parent-stream tokens shorter than 5 are dropped, child tokens shorter
//!   than 4
//! - a fixed closed stop-word set is removed (function words plus prompt
//!   scaffolding terms; a tuned constant, not a principle)
//! - the stemmer strips `ies`→`y`, `ing`, `ed`, `es` (preserving
//!   `-s/-x/-z/-ch/-sh` clusters and `-e` finals) and a trailing `s` on
//!   tokens of length ≥ 5

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{AudienceLevel, EntailmentMode, ExplainConfig, ProofDetailMode};
use crate::grouping::{effective_complexity, GroupingNode, GroupingOptions};
use crate::summarize::ParentSummary;

/// Closed set of violation codes across policy, parsing, and critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCode {
    SiblingComplexitySpread,
    PrerequisiteOrder,
    EvidenceCoverage,
    TermBudget,
    VocabularyContinuity,
    Schema,
    SecretLeak,
    PromptInjection,
}

impl ViolationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SiblingComplexitySpread => "sibling_complexity_spread",
            Self::PrerequisiteOrder => "prerequisite_order",
            Self::EvidenceCoverage => "evidence_coverage",
            Self::TermBudget => "term_budget",
            Self::VocabularyContinuity => "vocabulary_continuity",
            Self::Schema => "schema",
            Self::SecretLeak => "secret_leak",
            Self::PromptInjection => "prompt_injection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    pub code: ViolationCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl PolicyViolation {
    pub fn new(code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity_spread: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_coverage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary_coverage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_term_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCheckOutcome {
    pub ok: bool,
    pub violations: Vec<PolicyViolation>,
    pub metrics: PolicyMetrics,
}

impl PolicyCheckOutcome {
    fn from_parts(violations: Vec<PolicyViolation>, metrics: PolicyMetrics) -> Self {
        Self {
            ok: violations.is_empty(),
            violations,
            metrics,
        }
    }

    pub fn violation_codes(&self) -> Vec<ViolationCode> {
        let mut codes: Vec<ViolationCode> = self.violations.iter().map(|v| v.code).collect();
        codes.sort();
        codes.dedup();
        codes
    }
}

// ---------------------------------------------------------------------------
// Tokenization and stemming
// ---------------------------------------------------------------------------

/// Minimum token length in the parent stream.
pub const PARENT_MIN_TOKEN_LEN: usize = 5;
/// Minimum token length in child statements.
pub const CHILD_MIN_TOKEN_LEN: usize = 4;

/// Closed stop-word set: function words plus prompt scaffolding terms.
/// Sorted; membership via binary search. Tuned constant, not a principle.
const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "along", "also", "among", "because", "been", "before",
    "being", "below", "between", "both", "child", "children", "claim", "claims", "could", "does",
    "down", "during", "each", "entail", "entailed", "entails", "every", "follow", "followed",
    "following", "follows", "from", "have", "having", "hence", "here", "implied", "implies",
    "imply", "into", "jointly", "just", "more", "most", "much", "must", "only", "other", "over",
    "parent", "parents", "shall", "should", "show", "shown", "shows", "since", "some", "such",
    "than", "that", "their", "theirs", "them", "then", "there", "therefore", "these", "they",
    "this", "those", "thus", "together", "true", "under", "until", "upon", "used", "uses",
    "using", "very", "what", "when", "where", "which", "while", "whose", "will", "with", "would",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Lowercase, split on non-`[a-z0-9_]`, drop short tokens and stop words.
pub fn lexical_tokens(text: &str, min_len: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'))
        .filter(|t| t.len() >= min_len && !is_stop_word(t))
        .map(|t| t.to_string())
        .collect()
}

/// Light suffix stemmer; see module docs for the rule set.
pub fn stem(token: &str) -> String {
    let t = token;
    let n = t.len();
    if n > 4 && t.ends_with("ies") {
        return format!("{}y", &t[..n - 3]);
    }
    if n > 5 && t.ends_with("ing") {
        return t[..n - 3].to_string();
    }
    if n > 4 && t.ends_with("ed") {
        return t[..n - 2].to_string();
    }
    if n > 4 && t.ends_with("es") {
        let base = &t[..n - 2];
        if base.ends_with('s')
            || base.ends_with('x')
            || base.ends_with('z')
            || base.ends_with("ch")
            || base.ends_with("sh")
        {
            return base.to_string();
        }
        // Keep the final `e`: strip only the plural `s`.
        return t[..n - 1].to_string();
    }
    if n >= 5 && t.ends_with('s') && !t.ends_with("ss") {
        return t[..n - 1].to_string();
    }
    t.to_string()
}

fn stemmed_set(tokens: &[String]) -> BTreeSet<String> {
    tokens.iter().map(|t| stem(t)).collect()
}

/// Audience-and-detail-dependent vocabulary floor, clamped to `[0.40, 0.86]`.
pub fn vocabulary_floor(audience: AudienceLevel, detail: ProofDetailMode) -> f64 {
    let base: f64 = match audience {
        AudienceLevel::Novice => 0.72,
        AudienceLevel::Intermediate => 0.62,
        AudienceLevel::Expert => 0.52,
    };
    let adjust: f64 = match detail {
        ProofDetailMode::Minimal => -0.04,
        ProofDetailMode::Balanced => 0.0,
        ProofDetailMode::Formal => 0.04,
    };
    (base + adjust).clamp(0.40, 0.86)
}

// ---------------------------------------------------------------------------
// Pre-summary policy
// ---------------------------------------------------------------------------

pub struct PreSummaryInput<'a> {
    /// Group members in the order the linearization produced.
    pub nodes: &'a [GroupingNode],
    /// Edges `(prerequisite, dependent)` belonging to a detected in-group
    /// cycle; excluded from the order check.
    pub cycle_edges: &'a BTreeSet<(String, String)>,
}

/// Evaluate the candidate group before invoking the summarizer.
pub fn pre_summary_check(input: &PreSummaryInput<'_>, cfg: &ExplainConfig) -> PolicyCheckOutcome {
    let mut violations = Vec::new();
    let mut metrics = PolicyMetrics::default();

    let opts = GroupingOptions {
        max_children_per_parent: cfg.max_children_per_parent,
        complexity_band_width: cfg.complexity_band_width as f64,
        target_complexity: cfg.complexity_level as f64,
    };

    if !input.nodes.is_empty() {
        let complexities: Vec<f64> = input
            .nodes
            .iter()
            .map(|n| effective_complexity(n, &opts))
            .collect();
        let min = complexities.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = complexities
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let spread = max - min;
        metrics.complexity_spread = Some(spread);
        if spread > opts.complexity_band_width {
            violations.push(
                PolicyViolation::new(
                    ViolationCode::SiblingComplexitySpread,
                    format!(
                        "group complexity spread {spread} exceeds band width {}",
                        opts.complexity_band_width
                    ),
                )
                .detail("spread", spread.to_string())
                .detail("bandWidth", opts.complexity_band_width.to_string()),
            );
        }
    }

    // A prerequisite inside the group must not appear after its dependent,
    // unless the edge is part of a detected in-group cycle.
    let position: BTreeMap<&str, usize> = input
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    for (dep_pos, node) in input.nodes.iter().enumerate() {
        for prereq in &node.prerequisite_ids {
            let Some(&pre_pos) = position.get(prereq.as_str()) else {
                continue;
            };
            if pre_pos > dep_pos
                && !input
                    .cycle_edges
                    .contains(&(prereq.clone(), node.id.clone()))
            {
                violations.push(
                    PolicyViolation::new(
                        ViolationCode::PrerequisiteOrder,
                        format!("prerequisite {prereq} appears after its dependent {}", node.id),
                    )
                    .detail("prerequisite", prereq.clone())
                    .detail("dependent", node.id.clone()),
                );
            }
        }
    }

    PolicyCheckOutcome::from_parts(violations, metrics)
}

// ---------------------------------------------------------------------------
// Post-summary policy
// ---------------------------------------------------------------------------

pub struct PostSummaryInput<'a> {
    pub summary: &'a ParentSummary,
    /// The immediate child ids of the prospective parent.
    pub child_ids: &'a [String],
    /// Child statements, any order (tokenized into the allowed vocabulary).
    pub child_statements: &'a [String],
}

/// Evaluate a returned summary against the group that produced it.
pub fn post_summary_check(input: &PostSummaryInput<'_>, cfg: &ExplainConfig) -> PolicyCheckOutcome {
    let strict = cfg.entailment_mode == EntailmentMode::Strict;
    let mut violations = Vec::new();
    let mut metrics = PolicyMetrics::default();

    // Evidence coverage: evidence_refs (dedup, sorted) must equal the child
    // id set. Ratio = covered / total.
    let child_set: BTreeSet<&str> = input.child_ids.iter().map(|s| s.as_str()).collect();
    let ref_set: BTreeSet<&str> = input
        .summary
        .evidence_refs
        .iter()
        .map(|s| s.as_str())
        .collect();
    let covered = child_set.intersection(&ref_set).count();
    let ratio = if child_set.is_empty() {
        1.0
    } else {
        covered as f64 / child_set.len() as f64
    };
    metrics.evidence_coverage = Some(ratio);

    let missing: Vec<&str> = child_set.difference(&ref_set).cloned().collect();
    let unknown: Vec<&str> = ref_set.difference(&child_set).cloned().collect();
    if !missing.is_empty() || !unknown.is_empty() {
        let mut v = PolicyViolation::new(
            ViolationCode::EvidenceCoverage,
            format!(
                "evidence_refs cover {covered}/{} child ids",
                child_set.len()
            ),
        )
        .detail("coverage", ratio.to_string());
        if !missing.is_empty() {
            v = v.detail("missing", missing.join(","));
        }
        if !unknown.is_empty() {
            v = v.detail("unknown", unknown.join(","));
        }
        violations.push(v);
    }

    // Term budget.
    let mut terms: Vec<String> = input
        .summary
        .new_terms_introduced
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    terms.sort();
    terms.dedup();
    metrics.new_term_count = Some(terms.len());
    let budget = if strict {
        0
    } else {
        cfg.term_introduction_budget as usize
    };
    if terms.len() > budget {
        violations.push(
            PolicyViolation::new(
                ViolationCode::TermBudget,
                format!("{} new term(s) introduced, budget is {budget}", terms.len()),
            )
            .detail("terms", terms.join(","))
            .detail("budget", budget.to_string()),
        );
    }

    // Vocabulary continuity. Allowed vocabulary: stemmed child statement
    // tokens plus declared new terms.
    let mut allowed: BTreeSet<String> = BTreeSet::new();
    for statement in input.child_statements {
        allowed.extend(stemmed_set(&lexical_tokens(statement, CHILD_MIN_TOKEN_LEN)));
    }
    for term in &terms {
        allowed.extend(stemmed_set(&lexical_tokens(term, 1)));
    }

    let coverage_of = |text: &str| -> (usize, usize, Vec<String>) {
        let tokens = lexical_tokens(text, PARENT_MIN_TOKEN_LEN);
        let total = tokens.len();
        let mut uncovered = Vec::new();
        let mut covered = 0usize;
        for t in &tokens {
            if allowed.contains(&stem(t)) {
                covered += 1;
            } else {
                uncovered.push(t.clone());
            }
        }
        uncovered.sort();
        uncovered.dedup();
        (covered, total, uncovered)
    };

    if strict {
        // 100% coverage, checked per field so the unsupported-term check
        // reaches why_true_from_children as well.
        let mut total_covered = 0usize;
        let mut total_tokens = 0usize;
        for (field, text) in [
            ("parent_statement", &input.summary.parent_statement),
            (
                "why_true_from_children",
                &input.summary.why_true_from_children,
            ),
        ] {
            let (covered, total, uncovered) = coverage_of(text);
            total_covered += covered;
            total_tokens += total;
            if !uncovered.is_empty() {
                violations.push(
                    PolicyViolation::new(
                        ViolationCode::VocabularyContinuity,
                        format!(
                            "{field} uses {} token(s) not grounded in child vocabulary",
                            uncovered.len()
                        ),
                    )
                    .detail("field", field)
                    .detail("unsupported", uncovered.join(",")),
                );
            }
        }
        metrics.vocabulary_coverage = Some(if total_tokens == 0 {
            1.0
        } else {
            total_covered as f64 / total_tokens as f64
        });
    } else {
        let combined = format!(
            "{} {}",
            input.summary.parent_statement, input.summary.why_true_from_children
        );
        let (covered, total, uncovered) = coverage_of(&combined);
        let coverage = if total == 0 {
            1.0
        } else {
            covered as f64 / total as f64
        };
        metrics.vocabulary_coverage = Some(coverage);
        let floor = vocabulary_floor(cfg.audience_level, cfg.proof_detail_mode);
        if coverage < floor {
            violations.push(
                PolicyViolation::new(
                    ViolationCode::VocabularyContinuity,
                    format!("vocabulary coverage {coverage:.3} is below floor {floor:.2}"),
                )
                .detail("coverage", coverage.to_string())
                .detail("floor", floor.to_string())
                .detail("unsupported", uncovered.join(",")),
            );
        }
    }

    PolicyCheckOutcome::from_parts(violations, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::ParentSummary;

    fn group_node(id: &str, prereqs: &[&str], complexity: f64) -> GroupingNode {
        GroupingNode {
            id: id.to_string(),
            prerequisite_ids: prereqs.iter().map(|p| p.to_string()).collect(),
            complexity: Some(complexity),
        }
    }

    fn summary(children: &[&str]) -> ParentSummary {
        ParentSummary {
            parent_statement: "addition commutes for natural numbers".to_string(),
            why_true_from_children: "commutes addition natural numbers".to_string(),
            new_terms_introduced: vec![],
            complexity_score: 3.0,
            abstraction_score: 3.0,
            confidence: 0.9,
            evidence_refs: children.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn stop_words_are_sorted() {
        for w in STOP_WORDS.windows(2) {
            assert!(w[0] < w[1], "stop words unsorted near {}", w[0]);
        }
    }

    #[test]
    fn stemmer_rules() {
        assert_eq!(stem("theories"), "theory");
        assert_eq!(stem("mapping"), "mapp");
        assert_eq!(stem("ordered"), "order");
        assert_eq!(stem("matches"), "match");
        assert_eq!(stem("boxes"), "box");
        assert_eq!(stem("spaces"), "space");
        assert_eq!(stem("groups"), "group");
        assert_eq!(stem("class"), "class");
        assert_eq!(stem("sets"), "sets"); // below the length-5 bound
    }

    #[test]
    fn tokenizer_drops_short_and_stop_words() {
        let toks = lexical_tokens("The parent claim jointly entails lattice order_axiom", 5);
        assert_eq!(toks, vec!["lattice", "order_axiom"]);
    }

    #[test]
    fn floor_table() {
        assert_eq!(
            vocabulary_floor(AudienceLevel::Novice, ProofDetailMode::Balanced),
            0.72
        );
        assert!(
            (vocabulary_floor(AudienceLevel::Expert, ProofDetailMode::Minimal) - 0.48).abs()
                < 1e-9
        );
        assert!(
            (vocabulary_floor(AudienceLevel::Novice, ProofDetailMode::Formal) - 0.76).abs()
                < 1e-9
        );
    }

    #[test]
    fn pre_check_flags_spread() {
        let nodes = vec![group_node("a", &[], 1.0), group_node("b", &[], 5.0)];
        let cycle_edges = BTreeSet::new();
        let out = pre_summary_check(
            &PreSummaryInput {
                nodes: &nodes,
                cycle_edges: &cycle_edges,
            },
            &ExplainConfig::default(),
        );
        assert!(!out.ok);
        assert_eq!(out.violation_codes(), vec![ViolationCode::SiblingComplexitySpread]);
        assert_eq!(out.metrics.complexity_spread, Some(4.0));
    }

    #[test]
    fn pre_check_flags_order_but_not_cycles() {
        // b before its prerequisite a.
        let nodes = vec![group_node("b", &["a"], 3.0), group_node("a", &[], 3.0)];
        let empty = BTreeSet::new();
        let out = pre_summary_check(
            &PreSummaryInput {
                nodes: &nodes,
                cycle_edges: &empty,
            },
            &ExplainConfig::default(),
        );
        assert_eq!(out.violation_codes(), vec![ViolationCode::PrerequisiteOrder]);

        let mut cycle_edges = BTreeSet::new();
        cycle_edges.insert(("a".to_string(), "b".to_string()));
        let out = pre_summary_check(
            &PreSummaryInput {
                nodes: &nodes,
                cycle_edges: &cycle_edges,
            },
            &ExplainConfig::default(),
        );
        assert!(out.ok);
    }

    #[test]
    fn post_check_accepts_grounded_summary() {
        let children = vec!["c1".to_string(), "c2".to_string()];
        let statements = vec![
            "addition commutes on natural numbers".to_string(),
            "natural numbers form a monoid under addition".to_string(),
        ];
        let out = post_summary_check(
            &PostSummaryInput {
                summary: &summary(&["c1", "c2"]),
                child_ids: &children,
                child_statements: &statements,
            },
            &ExplainConfig::default(),
        );
        assert!(out.ok, "violations: {:?}", out.violations);
        assert_eq!(out.metrics.evidence_coverage, Some(1.0));
    }

    #[test]
    fn post_check_flags_missing_evidence() {
        let children = vec!["c1".to_string(), "c2".to_string()];
        let statements = vec!["addition commutes natural numbers".to_string()];
        let out = post_summary_check(
            &PostSummaryInput {
                summary: &summary(&["c1"]),
                child_ids: &children,
                child_statements: &statements,
            },
            &ExplainConfig::default(),
        );
        assert!(out
            .violation_codes()
            .contains(&ViolationCode::EvidenceCoverage));
        assert_eq!(out.metrics.evidence_coverage, Some(0.5));
    }

    #[test]
    fn post_check_enforces_term_budget() {
        let children = vec!["c1".to_string()];
        let statements = vec!["addition commutes natural numbers".to_string()];
        let mut s = summary(&["c1"]);
        s.new_terms_introduced = vec!["Monoid".into(), "monoid".into(), "ring".into(), "field".into()];
        let out = post_summary_check(
            &PostSummaryInput {
                summary: &s,
                child_ids: &children,
                child_statements: &statements,
            },
            &ExplainConfig::default(),
        );
        // 3 distinct terms against a budget of 2.
        assert!(out.violation_codes().contains(&ViolationCode::TermBudget));
        assert_eq!(out.metrics.new_term_count, Some(3));
    }

    #[test]
    fn declared_terms_count_as_covered() {
        let children = vec!["c1".to_string()];
        let statements = vec!["addition commutes natural numbers".to_string()];
        let mut s = summary(&["c1"]);
        s.parent_statement = "addition commutes giving a monoid structure".to_string();
        s.why_true_from_children = "addition commutes natural numbers".to_string();
        s.new_terms_introduced = vec!["monoid".into(), "structure".into()];
        let out = post_summary_check(
            &PostSummaryInput {
                summary: &s,
                child_ids: &children,
                child_statements: &statements,
            },
            &ExplainConfig::default(),
        );
        assert!(out.ok, "violations: {:?}", out.violations);
    }

    #[test]
    fn strict_mode_forbids_terms_and_demands_full_coverage() {
        let mut cfg = ExplainConfig::default();
        cfg.entailment_mode = EntailmentMode::Strict;

        let children = vec!["c1".to_string()];
        let statements = vec!["addition commutes natural numbers".to_string()];
        let mut s = summary(&["c1"]);
        s.parent_statement = "addition commutes forming a monoid".to_string();
        s.new_terms_introduced = vec!["monoid".into()];
        let out = post_summary_check(
            &PostSummaryInput {
                summary: &s,
                child_ids: &children,
                child_statements: &statements,
            },
            &cfg,
        );
        let codes = out.violation_codes();
        assert!(codes.contains(&ViolationCode::TermBudget));
        assert!(codes.contains(&ViolationCode::VocabularyContinuity));
    }
}
