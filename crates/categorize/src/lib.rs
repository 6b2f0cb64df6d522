//! Deterministic rule-based categorization: text normalization, merchant
//! detection, weighted rule evaluation and user overrides.

pub mod engine;
pub mod merchants;
pub mod normalize;
pub mod overrides;
pub mod rules;

pub use engine::{
    score_to_confidence, EngineContext, FALLBACK_CATEGORY, FALLBACK_CONFIDENCE,
    MERCHANT_PATTERNS_TOML, SYSTEM_RULES_TOML,
};
pub use merchants::{MerchantMatch, MerchantPattern, PatternSet};
pub use normalize::{normalize_description, normalize_for_match, strip_noise};
pub use overrides::{apply_override, find_matching_override, OverrideRule, OverrideScope};
pub use rules::{CategoryRule, RulePredicates, RuleSet, RuleSetError, RuleSource};
