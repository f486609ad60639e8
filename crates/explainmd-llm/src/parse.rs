//! Model output parsing and critique.
//!
//! Accepts either raw JSON or a JSON object inside a fenced code block.
//! Type mismatches never throw; every issue is collected as a `schema`
//! violation. The critique additionally scans the raw text and the parsed
//! fields for the same secret/injection patterns used on the way in.

use explainmd_core::policy::{PolicyViolation, ViolationCode};
use explainmd_core::summarize::ParentSummary;
use serde_json::Value;

use crate::prompt::{scan_injection_matches, scan_secret_matches};

#[derive(Debug, Clone)]
pub struct ParsedSummary {
    pub summary: Option<ParentSummary>,
    pub violations: Vec<PolicyViolation>,
}

/// Pull a JSON object out of raw model text: the whole text, or the first
/// fenced code block.
fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    // Fenced block: ```json ... ``` or plain ``` ... ```.
    let fence_start = trimmed.find("```")?;
    let after = &trimmed[fence_start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let fence_end = body.find("```")?;
    serde_json::from_str::<Value>(body[..fence_end].trim()).ok()
}

fn push_schema(violations: &mut Vec<PolicyViolation>, field: &str, message: &str) {
    violations.push(
        PolicyViolation::new(ViolationCode::Schema, format!("{field}: {message}"))
            .detail("field", field),
    );
}

fn require_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    violations: &mut Vec<PolicyViolation>,
) -> String {
    match obj.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            push_schema(violations, field, "expected a string");
            String::new()
        }
        None => {
            push_schema(violations, field, "missing");
            String::new()
        }
    }
}

fn require_string_array(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    violations: &mut Vec<PolicyViolation>,
) -> Vec<String> {
    match obj.get(field) {
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    _ => push_schema(
                        violations,
                        field,
                        &format!("entry {i} is not a string"),
                    ),
                }
            }
            out
        }
        Some(_) => {
            push_schema(violations, field, "expected an array of strings");
            Vec::new()
        }
        None => {
            push_schema(violations, field, "missing");
            Vec::new()
        }
    }
}

fn require_number(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    range: (f64, f64),
    violations: &mut Vec<PolicyViolation>,
) -> f64 {
    match obj.get(field).and_then(Value::as_f64) {
        Some(n) if n >= range.0 && n <= range.1 => n,
        Some(n) => {
            push_schema(
                violations,
                field,
                &format!("value {n} outside [{}, {}]", range.0, range.1),
            );
            n.clamp(range.0, range.1)
        }
        None => {
            push_schema(violations, field, "missing or not a number");
            range.0
        }
    }
}

/// Parse model output into a `ParentSummary`, collecting every schema issue.
pub fn parse_summary_output(text: &str) -> ParsedSummary {
    let mut violations = Vec::new();

    let Some(value) = extract_json(text) else {
        push_schema(&mut violations, "output", "no JSON object found");
        return ParsedSummary {
            summary: None,
            violations,
        };
    };
    let Some(obj) = value.as_object() else {
        push_schema(&mut violations, "output", "top-level JSON is not an object");
        return ParsedSummary {
            summary: None,
            violations,
        };
    };

    let parent_statement = require_string(obj, "parent_statement", &mut violations);
    let why_true_from_children = require_string(obj, "why_true_from_children", &mut violations);
    let new_terms_introduced = require_string_array(obj, "new_terms_introduced", &mut violations);
    let evidence_refs = require_string_array(obj, "evidence_refs", &mut violations);
    let complexity_score = require_number(obj, "complexity_score", (1.0, 5.0), &mut violations);
    let abstraction_score = require_number(obj, "abstraction_score", (1.0, 5.0), &mut violations);
    let confidence = require_number(obj, "confidence", (0.0, 1.0), &mut violations);

    if parent_statement.trim().is_empty() {
        push_schema(&mut violations, "parent_statement", "empty");
    }

    let summary = if violations.is_empty() {
        Some(ParentSummary {
            parent_statement,
            why_true_from_children,
            new_terms_introduced,
            complexity_score,
            abstraction_score,
            evidence_refs,
            confidence,
        })
    } else {
        None
    };

    ParsedSummary {
        summary,
        violations,
    }
}

/// Scan the raw text and parsed fields for secret/injection leakage.
pub fn critique_output(raw_text: &str, summary: Option<&ParentSummary>) -> Vec<PolicyViolation> {
    let mut violations = Vec::new();

    let mut secret_hits = scan_secret_matches(raw_text);
    let mut injection_hits = scan_injection_matches(raw_text);

    if let Some(s) = summary {
        let fields = [
            s.parent_statement.as_str(),
            s.why_true_from_children.as_str(),
        ];
        for f in fields {
            secret_hits += scan_secret_matches(f);
            injection_hits += scan_injection_matches(f);
        }
        for term in &s.new_terms_introduced {
            secret_hits += scan_secret_matches(term);
            injection_hits += scan_injection_matches(term);
        }
    }

    if secret_hits > 0 {
        violations.push(
            PolicyViolation::new(
                ViolationCode::SecretLeak,
                format!("{secret_hits} secret-like pattern(s) in model output"),
            )
            .detail("matches", secret_hits.to_string()),
        );
    }
    if injection_hits > 0 {
        violations.push(
            PolicyViolation::new(
                ViolationCode::PromptInjection,
                format!("{injection_hits} injection-like pattern(s) in model output"),
            )
            .detail("matches", injection_hits.to_string()),
        );
    }
    violations
}
