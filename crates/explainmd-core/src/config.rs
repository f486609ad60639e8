//! Configuration for explainmd tree generation.
//!
//! Configuration is always passed by value from the caller; the core crate
//! reads no environment and no config files. This module defines:
//! - the typed option set with defaults and range validation
//! - idempotent normalization (trimmed/lower-cased enum tokens, canonical
//!   language resolution)
//! - the canonical config hash and the tree cache key
//! - the regeneration planner that classifies config changes into
//!   structural / semantic / cosmetic impact

use serde::{Deserialize, Serialize};

use crate::determinism::canonical::{CanonicalRender, CanonicalWriter};
use crate::errors::{ExplainError, ExplainResult};

/// Languages the summarizer prompts are tuned for. `resolveExplanationLanguage`
/// falls back to the base subtag, then to `en`.
pub const SUPPORTED_LANGUAGES: &[&str] = &["de", "en", "es", "fr", "it", "ja", "pt", "zh"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceLevel {
    Novice,
    Intermediate,
    Expert,
}

impl AudienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Novice => "novice",
            Self::Intermediate => "intermediate",
            Self::Expert => "expert",
        }
    }

    pub fn parse(s: &str) -> ExplainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "novice" => Ok(Self::Novice),
            "intermediate" => Ok(Self::Intermediate),
            "expert" => Ok(Self::Expert),
            other => Err(ExplainError::invalid_argument(format!(
                "unknown audience level: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingLevelTarget {
    Grade6,
    Grade9,
    Grade12,
    Undergrad,
    Graduate,
}

impl ReadingLevelTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grade6 => "grade6",
            Self::Grade9 => "grade9",
            Self::Grade12 => "grade12",
            Self::Undergrad => "undergrad",
            Self::Graduate => "graduate",
        }
    }

    pub fn parse(s: &str) -> ExplainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "grade6" => Ok(Self::Grade6),
            "grade9" => Ok(Self::Grade9),
            "grade12" => Ok(Self::Grade12),
            "undergrad" => Ok(Self::Undergrad),
            "graduate" => Ok(Self::Graduate),
            other => Err(ExplainError::invalid_argument(format!(
                "unknown reading level target: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofDetailMode {
    Minimal,
    Balanced,
    Formal,
}

impl ProofDetailMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Balanced => "balanced",
            Self::Formal => "formal",
        }
    }

    pub fn parse(s: &str) -> ExplainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "balanced" => Ok(Self::Balanced),
            "formal" => Ok(Self::Formal),
            other => Err(ExplainError::invalid_argument(format!(
                "unknown proof detail mode: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntailmentMode {
    Lenient,
    Strict,
}

impl EntailmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }

    pub fn parse(s: &str) -> ExplainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(ExplainError::invalid_argument(format!(
                "unknown entailment mode: {other}"
            ))),
        }
    }
}

/// Model-provider transport settings. The provider itself is injected; these
/// values parameterize its requests and retry schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProviderConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env_var: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl Default for ModelProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env_var: "EXPLAIN_MD_LIVE_RPC_API_KEY".to_string(),
            timeout_ms: 30_000,
            max_retries: 3,
            retry_base_delay_ms: 250,
            temperature: 0.0,
            max_output_tokens: 800,
        }
    }
}

/// The full generation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainConfig {
    pub language: String,
    pub audience_level: AudienceLevel,
    pub reading_level_target: ReadingLevelTarget,
    pub complexity_level: u8,
    pub complexity_band_width: u8,
    pub term_introduction_budget: u32,
    pub max_children_per_parent: usize,
    pub proof_detail_mode: ProofDetailMode,
    pub entailment_mode: EntailmentMode,
    pub model_provider: ModelProviderConfig,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            audience_level: AudienceLevel::Intermediate,
            reading_level_target: ReadingLevelTarget::Grade12,
            complexity_level: 3,
            complexity_band_width: 1,
            term_introduction_budget: 2,
            max_children_per_parent: 5,
            proof_detail_mode: ProofDetailMode::Balanced,
            entailment_mode: EntailmentMode::Lenient,
            model_provider: ModelProviderConfig::default(),
        }
    }
}

/// Canonical language resolution: lower-case, dash-delimited; `xx-YY` falls
/// back to a supported base `xx`, anything unsupported falls back to `en`.
pub fn resolve_explanation_language(tag: &str) -> String {
    let normalized = tag.trim().to_lowercase().replace('_', "-");
    if SUPPORTED_LANGUAGES.contains(&normalized.as_str()) {
        return normalized;
    }
    if let Some((base, _)) = normalized.split_once('-') {
        if SUPPORTED_LANGUAGES.contains(&base) {
            return base.to_string();
        }
    }
    "en".to_string()
}

impl ExplainConfig {
    /// Normalize string-shaped fields. Idempotent:
    /// `normalize(normalize(c)) == normalize(c)`.
    pub fn normalize(mut self) -> Self {
        self.language = resolve_explanation_language(&self.language);
        self.model_provider.endpoint = self.model_provider.endpoint.trim().to_string();
        self.model_provider.model = self.model_provider.model.trim().to_string();
        self.model_provider.api_key_env_var =
            self.model_provider.api_key_env_var.trim().to_string();
        self
    }

    /// Range-check every numeric option. Out-of-range values are rejected,
    /// never clamped.
    pub fn validate(&self) -> ExplainResult<()> {
        if !(1..=5).contains(&self.complexity_level) {
            return Err(ExplainError::invalid_argument(
                "complexityLevel must be in [1,5]",
            ));
        }
        if self.complexity_band_width > 4 {
            return Err(ExplainError::invalid_argument(
                "complexityBandWidth must be in [0,4]",
            ));
        }
        if self.max_children_per_parent < 2 {
            return Err(ExplainError::invalid_argument(
                "maxChildrenPerParent must be at least 2",
            ));
        }
        if self.model_provider.timeout_ms == 0 {
            return Err(ExplainError::invalid_argument(
                "modelProvider.timeoutMs must be greater than zero",
            ));
        }
        if !(0.0..=2.0).contains(&self.model_provider.temperature) {
            return Err(ExplainError::invalid_argument(
                "modelProvider.temperature must be in [0,2]",
            ));
        }
        if self.model_provider.max_output_tokens == 0 {
            return Err(ExplainError::invalid_argument(
                "modelProvider.maxOutputTokens must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl CanonicalRender for ExplainConfig {
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.text_field("audienceLevel", self.audience_level.as_str());
        w.field("complexityBandWidth", self.complexity_band_width);
        w.field("complexityLevel", self.complexity_level);
        w.text_field("entailmentMode", self.entailment_mode.as_str());
        w.text_field("language", &self.language);
        w.field("maxChildrenPerParent", self.max_children_per_parent);
        w.text_field("modelProvider.apiKeyEnvVar", &self.model_provider.api_key_env_var);
        w.text_field("modelProvider.endpoint", &self.model_provider.endpoint);
        w.field("modelProvider.maxOutputTokens", self.model_provider.max_output_tokens);
        w.field("modelProvider.maxRetries", self.model_provider.max_retries);
        w.text_field("modelProvider.model", &self.model_provider.model);
        w.field(
            "modelProvider.retryBaseDelayMs",
            self.model_provider.retry_base_delay_ms,
        );
        w.field("modelProvider.temperature", self.model_provider.temperature);
        w.field("modelProvider.timeoutMs", self.model_provider.timeout_ms);
        w.text_field("proofDetailMode", self.proof_detail_mode.as_str());
        w.text_field("readingLevelTarget", self.reading_level_target.as_str());
        w.field("termIntroductionBudget", self.term_introduction_budget);
        w.finish()
    }
}

/// Canonical hash of the configuration that built a tree.
pub fn compute_config_hash(cfg: &ExplainConfig) -> String {
    cfg.canonical_hash_hex()
}

/// Cache key for a built tree: leaf set, config, and the two options most
/// likely to be varied per request.
pub fn compute_tree_cache_key(leaf_set_hash: &str, cfg: &ExplainConfig) -> String {
    format!(
        "{leaf_set_hash}:{}:{}:{}",
        compute_config_hash(cfg),
        cfg.language,
        cfg.audience_level.as_str()
    )
}

// ---------------------------------------------------------------------------
// Regeneration planner
// ---------------------------------------------------------------------------

/// Impact class of a changed config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeClass {
    Structural,
    Semantic,
    Cosmetic,
}

impl ChangeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Semantic => "semantic",
            Self::Cosmetic => "cosmetic",
        }
    }

    fn scope(&self) -> RegenerationScope {
        match self {
            Self::Structural => RegenerationScope::Full,
            Self::Semantic | Self::Cosmetic => RegenerationScope::Partial,
        }
    }
}

/// Minimum rebuild required by a config change. Ordered: none < partial < full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegenerationScope {
    None,
    Partial,
    Full,
}

impl RegenerationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Partial => "partial",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFieldChange {
    pub field: String,
    pub class: ChangeClass,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerationPlan {
    pub scope: RegenerationScope,
    pub changes: Vec<ConfigFieldChange>,
}

fn field_views(cfg: &ExplainConfig) -> Vec<(&'static str, ChangeClass, String)> {
    use ChangeClass::*;
    vec![
        ("audienceLevel", Structural, cfg.audience_level.as_str().to_string()),
        ("complexityBandWidth", Structural, cfg.complexity_band_width.to_string()),
        ("complexityLevel", Structural, cfg.complexity_level.to_string()),
        ("entailmentMode", Structural, cfg.entailment_mode.as_str().to_string()),
        ("language", Semantic, cfg.language.clone()),
        ("maxChildrenPerParent", Structural, cfg.max_children_per_parent.to_string()),
        ("modelProvider.apiKeyEnvVar", Cosmetic, cfg.model_provider.api_key_env_var.clone()),
        ("modelProvider.endpoint", Semantic, cfg.model_provider.endpoint.clone()),
        ("modelProvider.maxOutputTokens", Cosmetic, cfg.model_provider.max_output_tokens.to_string()),
        ("modelProvider.maxRetries", Cosmetic, cfg.model_provider.max_retries.to_string()),
        ("modelProvider.model", Semantic, cfg.model_provider.model.clone()),
        ("modelProvider.retryBaseDelayMs", Cosmetic, cfg.model_provider.retry_base_delay_ms.to_string()),
        ("modelProvider.temperature", Cosmetic, cfg.model_provider.temperature.to_string()),
        ("modelProvider.timeoutMs", Cosmetic, cfg.model_provider.timeout_ms.to_string()),
        ("proofDetailMode", Structural, cfg.proof_detail_mode.as_str().to_string()),
        ("readingLevelTarget", Semantic, cfg.reading_level_target.as_str().to_string()),
        ("termIntroductionBudget", Structural, cfg.term_introduction_budget.to_string()),
    ]
}

/// Classify every changed field between two configurations and derive the
/// minimum regeneration scope (the max class over changed fields).
pub fn plan_regeneration(baseline: &ExplainConfig, candidate: &ExplainConfig) -> RegenerationPlan {
    let before = field_views(baseline);
    let after = field_views(candidate);

    let mut changes = Vec::new();
    let mut scope = RegenerationScope::None;

    for ((field, class, b), (_, _, a)) in before.iter().zip(after.iter()) {
        if b == a {
            continue;
        }
        scope = scope.max(class.scope());
        changes.push(ConfigFieldChange {
            field: (*field).to_string(),
            class: *class,
            before: b.clone(),
            after: a.clone(),
        });
    }

    RegenerationPlan { scope, changes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = ExplainConfig::default();
        cfg.validate().unwrap();
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut cfg = ExplainConfig::default();
        cfg.language = "  FR_ca ".to_string();
        let once = cfg.clone().normalize();
        assert_eq!(once.language, "fr");
        assert_eq!(once.clone().normalize(), once);
    }

    #[test]
    fn language_resolution_falls_back() {
        assert_eq!(resolve_explanation_language("EN"), "en");
        assert_eq!(resolve_explanation_language("pt-BR"), "pt");
        assert_eq!(resolve_explanation_language("tlh"), "en");
        assert_eq!(resolve_explanation_language("zh-Hans"), "zh");
    }

    #[test]
    fn out_of_range_rejected() {
        let mut cfg = ExplainConfig::default();
        cfg.complexity_level = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ExplainConfig::default();
        cfg.max_children_per_parent = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_hash_is_stable() {
        let a = ExplainConfig::default();
        let b = ExplainConfig::default();
        assert_eq!(compute_config_hash(&a), compute_config_hash(&b));

        let mut c = ExplainConfig::default();
        c.complexity_level = 4;
        assert_ne!(compute_config_hash(&a), compute_config_hash(&c));
    }

    #[test]
    fn identical_configs_need_no_regeneration() {
        let cfg = ExplainConfig::default();
        let plan = plan_regeneration(&cfg, &cfg);
        assert_eq!(plan.scope, RegenerationScope::None);
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn structural_change_forces_full() {
        let baseline = ExplainConfig::default();
        let mut candidate = baseline.clone();
        candidate.max_children_per_parent = 4;
        let plan = plan_regeneration(&baseline, &candidate);
        assert_eq!(plan.scope, RegenerationScope::Full);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].field, "maxChildrenPerParent");
    }

    #[test]
    fn token_budget_change_alone_is_partial() {
        let baseline = ExplainConfig::default();
        let mut candidate = baseline.clone();
        candidate.model_provider.max_output_tokens = 1200;
        let plan = plan_regeneration(&baseline, &candidate);
        assert_eq!(plan.scope, RegenerationScope::Partial);
    }

    #[test]
    fn scope_is_max_over_changes() {
        let baseline = ExplainConfig::default();
        let mut candidate = baseline.clone();
        candidate.model_provider.temperature = 0.5;
        candidate.entailment_mode = EntailmentMode::Strict;
        let plan = plan_regeneration(&baseline, &candidate);
        assert_eq!(plan.scope, RegenerationScope::Full);
        assert_eq!(plan.changes.len(), 2);
    }

    #[test]
    fn cache_key_carries_language_and_audience() {
        let cfg = ExplainConfig::default();
        let key = compute_tree_cache_key("abc123", &cfg);
        assert!(key.starts_with("abc123:"));
        assert!(key.ends_with(":en:intermediate"));
    }
}
