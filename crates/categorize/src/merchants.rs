use serde::{Deserialize, Serialize};

use crate::normalize::sanitize_compact;
use crate::rules::RuleSetError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantPattern {
    pub id: String,
    /// Raw pattern text, matched upper-cased against the description.
    pub pattern: String,
    /// Canonical merchant name reported on a hit.
    pub normalized: String,
    pub category: Option<String>,
    pub score: f64,
    /// Exact patterns only match verbatim; fuzzy ones also compare with all
    /// non-alphanumerics stripped on both sides.
    #[serde(default)]
    pub exact: bool,
}

#[derive(Debug, Clone)]
pub struct MerchantMatch {
    pub merchant: String,
    pub category: Option<String>,
    pub score: f64,
    pub pattern_id: String,
}

#[derive(Debug, Default)]
pub struct PatternSet {
    patterns: Vec<MerchantPattern>,
}

#[derive(Deserialize)]
struct PatternFile {
    #[serde(default)]
    patterns: Vec<MerchantPattern>,
}

impl PatternSet {
    pub fn new(patterns: Vec<MerchantPattern>) -> Self {
        PatternSet { patterns }
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, RuleSetError> {
        let file: PatternFile = toml::from_str(toml_content)?;
        Ok(Self::new(file.patterns))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Highest-scoring pattern contained in the normalized description;
    /// equal scores break to the lexicographically smallest pattern id so
    /// results are reproducible.
    pub fn detect(&self, normalized_description: &str) -> Option<MerchantMatch> {
        let compact = sanitize_compact(normalized_description);

        let mut best: Option<MerchantMatch> = None;
        for pattern in &self.patterns {
            let pattern_text = pattern.pattern.to_uppercase();
            let pattern_compact = sanitize_compact(&pattern_text);

            let exact_hit = normalized_description.contains(pattern_text.trim());
            let fuzzy_hit = !pattern.exact
                && !pattern_compact.is_empty()
                && compact.contains(&pattern_compact);
            if !exact_hit && !fuzzy_hit {
                continue;
            }

            let better = match &best {
                None => true,
                Some(current) => {
                    pattern.score > current.score
                        || (pattern.score == current.score && pattern.id < current.pattern_id)
                }
            };
            if better {
                best = Some(MerchantMatch {
                    merchant: pattern.normalized.clone(),
                    category: pattern.category.clone(),
                    score: pattern.score,
                    pattern_id: pattern.id.clone(),
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: &str, text: &str, normalized: &str, score: f64, exact: bool) -> MerchantPattern {
        MerchantPattern {
            id: id.to_string(),
            pattern: text.to_string(),
            normalized: normalized.to_string(),
            category: Some("subscriptions".to_string()),
            score,
            exact,
        }
    }

    #[test]
    fn exact_substring_match() {
        let set = PatternSet::new(vec![pattern("m.netflix", "NETFLIX", "Netflix", 160.0, true)]);
        let hit = set.detect("LASTSCHRIFT NETFLIX INTERNATIONAL").unwrap();
        assert_eq!(hit.merchant, "Netflix");
        assert_eq!(hit.pattern_id, "m.netflix");
    }

    #[test]
    fn fuzzy_match_ignores_punctuation() {
        let set = PatternSet::new(vec![pattern("m.dm", "D.M. DROGERIE", "dm", 150.0, false)]);
        assert!(set.detect("KARTENZAHLUNG DM DROGERIE MARKT").is_some());
    }

    #[test]
    fn exact_flag_disables_fuzzy() {
        let set = PatternSet::new(vec![pattern("m.dm", "D.M. DROGERIE", "dm", 150.0, true)]);
        assert!(set.detect("KARTENZAHLUNG DM DROGERIE MARKT").is_none());
    }

    #[test]
    fn highest_score_wins_then_lowest_id() {
        let set = PatternSet::new(vec![
            pattern("m.b", "REWE", "REWE City", 150.0, true),
            pattern("m.a", "REWE", "REWE", 150.0, true),
            pattern("m.c", "REWE MARKT", "REWE Markt", 170.0, true),
        ]);
        let hit = set.detect("REWE MARKT DANKT").unwrap();
        assert_eq!(hit.pattern_id, "m.c");

        let hit = set.detect("REWE DANKT").unwrap();
        assert_eq!(hit.pattern_id, "m.a");
    }

    #[test]
    fn no_match_returns_none() {
        let set = PatternSet::new(vec![pattern("m.netflix", "NETFLIX", "Netflix", 160.0, true)]);
        assert!(set.detect("MIETE MUSTERSTR").is_none());
    }
}
