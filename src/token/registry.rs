//! The finite set of token-estimation heuristics and the registry that
//! resolves an id to one of them.
//!
//! Every [`TokenModel`] is a pure, allocation-light function of a text
//! snapshot; none of them do anything approaching real BPE tokenization —
//! that is the point of an *approximator*. `resolveModelId` never fails: an
//! unknown id quietly falls back to the registry's default model, the same
//! way a stale `countingMethod` persisted by an older profile should not
//! break estimation for a page that is just trying to show a chip.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Coarse cost/accuracy tier, surfaced to the host's model picker UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performance {
    Fast,
    Balanced,
    Thorough,
}

/// Static description of a model, independent of any text it estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<Performance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/// Collapse whitespace runs to a single space and trim the ends, the
/// normalization every model applies before counting anything.
pub fn normalize_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true; // trims a leading run
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// `round(t * (c > 0 ? c : 1))`, applied after a model's raw estimate.
pub fn apply_calibration(t: u64, c: f64) -> u64 {
    let factor = if c > 0.0 { c } else { 1.0 };
    (t as f64 * factor).round() as u64
}

/// A token-estimation heuristic. Implementations must be pure and fast
/// enough to run on every `EstimatorWorker` tick without ever blocking a UI
/// frame; none of them perform real tokenization.
pub trait TokenModel: Send + Sync {
    fn metadata(&self) -> ModelMetadata;

    /// Estimate a non-negative token count for `raw_text`, then fold in
    /// `calibration` via [`apply_calibration`].
    fn estimate(&self, raw_text: &str, calibration: f64) -> u64;
}

/// `ceil(chars / 4)` — the classic "roughly four characters per token"
/// rule of thumb, the cheapest model in the registry.
pub struct SimpleModel;

impl TokenModel for SimpleModel {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            id: "simple".to_string(),
            name: "Simple".to_string(),
            short_name: "Simple".to_string(),
            description: "Character-count heuristic: roughly 4 characters per token.".to_string(),
            performance: Some(Performance::Fast),
            is_default: None,
        }
    }

    fn estimate(&self, raw_text: &str, calibration: f64) -> u64 {
        let text = normalize_text(raw_text);
        let chars = text.chars().count() as u64;
        let base = chars.div_ceil(4);
        apply_calibration(base, calibration)
    }
}

/// Word-aware heuristic: counts whitespace-delimited words, then adds a
/// fractional weight for punctuation and digit runs, which tend to tokenize
/// separately from the word they're attached to.
pub struct AdvancedModel;

impl TokenModel for AdvancedModel {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            id: "advanced".to_string(),
            name: "Advanced".to_string(),
            short_name: "Advanced".to_string(),
            description: "Word-count heuristic with extra weight for punctuation and digit runs."
                .to_string(),
            performance: Some(Performance::Balanced),
            is_default: None,
        }
    }

    fn estimate(&self, raw_text: &str, calibration: f64) -> u64 {
        let text = normalize_text(raw_text);
        if text.is_empty() {
            return apply_calibration(0, calibration);
        }
        let words = text.split(' ').filter(|w| !w.is_empty()).count() as u64;
        let mut punct_runs = 0u64;
        let mut digit_runs = 0u64;
        let mut in_punct = false;
        let mut in_digit = false;
        for ch in text.chars() {
            if ch.is_ascii_punctuation() {
                if !in_punct {
                    punct_runs += 1;
                    in_punct = true;
                }
                in_digit = false;
            } else if ch.is_ascii_digit() {
                if !in_digit {
                    digit_runs += 1;
                    in_digit = true;
                }
                in_punct = false;
            } else {
                in_punct = false;
                in_digit = false;
            }
        }
        let base = words + (punct_runs + digit_runs) / 2;
        apply_calibration(base, calibration)
    }
}

/// Blends the character-based and word-based heuristics (their arithmetic
/// mean), meant to smooth out the cases where either one alone is a poor
/// fit for a given style of prose.
pub struct CptBlendMixModel;

impl TokenModel for CptBlendMixModel {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            id: "cpt-blend-mix".to_string(),
            name: "CPT Blend Mix".to_string(),
            short_name: "Blend".to_string(),
            description: "Averages the character-count and word-count heuristics.".to_string(),
            performance: Some(Performance::Balanced),
            is_default: None,
        }
    }

    fn estimate(&self, raw_text: &str, calibration: f64) -> u64 {
        let char_based = SimpleModel.estimate(raw_text, 1.0);
        let word_based = AdvancedModel.estimate(raw_text, 1.0);
        let base = (char_based + word_based) / 2;
        apply_calibration(base, calibration)
    }
}

/// A single compiled-once pass over the text with one regex that matches
/// word runs, number runs, and individual CJK codepoints (each of which
/// tends to be its own token), summed for the estimate.
pub struct SingleRegexPassModel;

fn single_pass_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\p{L}]+|[\p{N}]+|[\p{Han}\p{Hiragana}\p{Katakana}]|[^\s\w]").unwrap()
    })
}

impl TokenModel for SingleRegexPassModel {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            id: "single-regex-pass".to_string(),
            name: "Single Regex Pass".to_string(),
            short_name: "Regex".to_string(),
            description: "One compiled regex scan counting word runs, number runs, and symbols."
                .to_string(),
            performance: Some(Performance::Balanced),
            is_default: None,
        }
    }

    fn estimate(&self, raw_text: &str, calibration: f64) -> u64 {
        let text = normalize_text(raw_text);
        let base = single_pass_pattern().find_iter(&text).count() as u64;
        apply_calibration(base, calibration)
    }
}

/// Hand-rolled single-pass state machine over the char stream, classifying
/// each character into `{whitespace, word, digit, punct, other}` and
/// incrementing the estimate on every state transition into a non-whitespace
/// class. No allocation beyond the normalized string; the default model
/// because it is both the cheapest precise-ish option and dependency-free.
pub struct UltralightStateMachineModel;

#[derive(PartialEq, Clone, Copy)]
enum CharClass {
    Space,
    Word,
    Digit,
    Punct,
    Other,
}

fn classify(ch: char) -> CharClass {
    if ch.is_whitespace() {
        CharClass::Space
    } else if ch.is_alphabetic() {
        CharClass::Word
    } else if ch.is_ascii_digit() {
        CharClass::Digit
    } else if ch.is_ascii_punctuation() {
        CharClass::Punct
    } else {
        CharClass::Other
    }
}

impl TokenModel for UltralightStateMachineModel {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            id: "ultralight-state-machine".to_string(),
            name: "Ultralight State Machine".to_string(),
            short_name: "Ultralight".to_string(),
            description: "Dependency-free single-pass character classifier; counts transitions \
                into word/digit/punct/other runs."
                .to_string(),
            performance: Some(Performance::Fast),
            is_default: Some(true),
        }
    }

    fn estimate(&self, raw_text: &str, calibration: f64) -> u64 {
        let text = normalize_text(raw_text);
        let mut count = 0u64;
        let mut prev = CharClass::Space;
        // CJK-ish "other" characters (ideographs etc.) tend to be one token
        // each rather than grouping into a run, so count them individually.
        for ch in text.chars() {
            let class = classify(ch);
            match class {
                CharClass::Space => {}
                CharClass::Other => count += 1,
                _ if class != prev => count += 1,
                _ => {}
            }
            prev = class;
        }
        apply_calibration(count, calibration)
    }
}

/// Legacy model-id aliases kept so a profile persisted by an older engine
/// still resolves to something sensible.
fn legacy_alias(id: &str) -> Option<&'static str> {
    match id {
        "basic" => Some("simple"),
        "pro" | "precise" => Some("advanced"),
        "blend" | "mix" => Some("cpt-blend-mix"),
        "regex" => Some("single-regex-pass"),
        "lightweight" | "default" => Some("ultralight-state-machine"),
        _ => None,
    }
}

/// Enumerates the fixed set of estimation models and resolves an id
/// (including legacy aliases) to one of them. Construction always succeeds
/// and always has a default model registered.
pub struct TokenModelRegistry {
    models: HashMap<String, Box<dyn TokenModel>>,
    default_id: String,
}

impl TokenModelRegistry {
    /// Build the registry with every model spec.md requires, pre-registered.
    pub fn with_builtin_models() -> Self {
        let mut registry = TokenModelRegistry {
            models: HashMap::new(),
            default_id: String::new(),
        };
        registry.register(Box::new(SimpleModel));
        registry.register(Box::new(AdvancedModel));
        registry.register(Box::new(CptBlendMixModel));
        registry.register(Box::new(SingleRegexPassModel));
        registry.register(Box::new(UltralightStateMachineModel));
        registry.set_default_model("ultralight-state-machine");
        registry
    }

    /// Register (or replace) a model under its own metadata id.
    pub fn register(&mut self, model: Box<dyn TokenModel>) {
        let id = model.metadata().id;
        if self.default_id.is_empty() {
            self.default_id = id.clone();
        }
        self.models.insert(id, model);
    }

    pub fn has_model(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn get_model(&self, id: &str) -> Option<&dyn TokenModel> {
        self.models.get(id).map(|b| b.as_ref())
    }

    pub fn get_default_model(&self) -> &dyn TokenModel {
        self.models
            .get(&self.default_id)
            .expect("default model is always registered")
            .as_ref()
    }

    /// Make `id` the fallback for unresolved/unknown ids. No-op if `id` is
    /// not registered.
    pub fn set_default_model(&mut self, id: &str) {
        if self.models.contains_key(id) {
            self.default_id = id.to_string();
        }
    }

    /// Resolve an arbitrary id to a registered model id: direct hit, legacy
    /// alias, or the default. Never fails, and is idempotent —
    /// `resolve_model_id(resolve_model_id(x)) == resolve_model_id(x)`.
    pub fn resolve_model_id(&self, input: &str) -> String {
        if self.models.contains_key(input) {
            return input.to_string();
        }
        if let Some(alias) = legacy_alias(input) {
            if self.models.contains_key(alias) {
                return alias.to_string();
            }
        }
        self.default_id.clone()
    }
}

impl Default for TokenModelRegistry {
    fn default() -> Self {
        Self::with_builtin_models()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_whitespace_and_trims() {
        assert_eq!(normalize_text("  hello\n\tworld  "), "hello world");
    }

    #[test]
    fn apply_calibration_defaults_nonpositive_to_one() {
        assert_eq!(apply_calibration(10, 0.0), 10);
        assert_eq!(apply_calibration(10, -5.0), 10);
        assert_eq!(apply_calibration(10, 2.0), 20);
    }

    #[test]
    fn registry_has_every_required_model() {
        let registry = TokenModelRegistry::with_builtin_models();
        for id in [
            "simple",
            "advanced",
            "cpt-blend-mix",
            "single-regex-pass",
            "ultralight-state-machine",
        ] {
            assert!(registry.has_model(id), "missing model {id}");
        }
    }

    #[test]
    fn default_model_is_ultralight_state_machine() {
        let registry = TokenModelRegistry::with_builtin_models();
        assert_eq!(registry.get_default_model().metadata().id, "ultralight-state-machine");
    }

    #[test]
    fn resolve_model_id_maps_legacy_names() {
        let registry = TokenModelRegistry::with_builtin_models();
        assert_eq!(registry.resolve_model_id("basic"), "simple");
        assert_eq!(registry.resolve_model_id("precise"), "advanced");
    }

    #[test]
    fn resolve_model_id_falls_back_to_default_on_unknown() {
        let registry = TokenModelRegistry::with_builtin_models();
        assert_eq!(
            registry.resolve_model_id("totally-unknown-id"),
            "ultralight-state-machine"
        );
    }

    #[test]
    fn resolve_model_id_is_idempotent() {
        let registry = TokenModelRegistry::with_builtin_models();
        for input in ["simple", "basic", "nonsense", "advanced"] {
            let once = registry.resolve_model_id(input);
            let twice = registry.resolve_model_id(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn all_models_return_nonnegative_estimates_for_empty_text() {
        let registry = TokenModelRegistry::with_builtin_models();
        for id in [
            "simple",
            "advanced",
            "cpt-blend-mix",
            "single-regex-pass",
            "ultralight-state-machine",
        ] {
            let model = registry.get_model(id).unwrap();
            assert_eq!(model.estimate("", 1.0), 0);
        }
    }
}
