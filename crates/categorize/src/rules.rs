use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kontoflow_core::{Direction, ParsedRow};

use crate::merchants::MerchantMatch;
use crate::normalize::normalize_for_match;

#[derive(Error, Debug)]
pub enum RuleSetError {
    #[error("failed to parse rule TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("rule {rule_id}: invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        rule_id: String,
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    System,
    User,
}

fn default_enabled() -> bool {
    true
}

fn default_source() -> RuleSource {
    RuleSource::System
}

/// Predicates are AND-combined; absent predicates are wildcards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulePredicates {
    pub direction: Option<Direction>,
    /// Substring tokens, normalized like the description before comparison.
    pub contains: Option<Vec<String>>,
    pub regex: Option<String>,
    pub iban_equals: Option<String>,
    pub mcc_in: Option<Vec<String>>,
    /// Matches the merchant detected by the pattern set, not raw text.
    pub merchant_equals: Option<String>,
    pub min_amount_abs: Option<i64>,
    pub max_amount_abs: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_source")]
    pub source: RuleSource,
    pub score: f64,
    #[serde(default)]
    pub when: RulePredicates,
    pub category: String,
}

/// A rule with its regex predicate compiled once at load. Evaluation never
/// compiles patterns; invalid ones are rejected by [`RuleSet::new`].
#[derive(Debug)]
struct CompiledRule {
    rule: CategoryRule,
    compiled_regex: Option<Regex>,
}

#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<CategoryRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CategoryRule>) -> Result<Self, RuleSetError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let compiled_regex = match &rule.when.regex {
                Some(pattern) => Some(
                    RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|source| RuleSetError::InvalidRegex {
                            rule_id: rule.id.clone(),
                            pattern: pattern.clone(),
                            source,
                        })?,
                ),
                None => None,
            };
            compiled.push(CompiledRule { rule, compiled_regex });
        }
        Ok(RuleSet { rules: compiled })
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, RuleSetError> {
        let file: RuleFile = toml::from_str(toml_content)?;
        Self::new(file.rules)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Evaluates every enabled rule; the engine merges and ranks matches.
    pub(crate) fn matches(
        &self,
        row: &ParsedRow,
        normalized_description: &str,
        merchant: Option<&MerchantMatch>,
    ) -> Vec<&CategoryRule> {
        let merchant_name = merchant.map(|m| m.merchant.to_uppercase());
        self.rules
            .iter()
            .filter(|compiled| {
                rule_matches(compiled, row, normalized_description, merchant_name.as_deref())
            })
            .map(|compiled| &compiled.rule)
            .collect()
    }
}

fn rule_matches(
    compiled: &CompiledRule,
    row: &ParsedRow,
    normalized_description: &str,
    merchant_name: Option<&str>,
) -> bool {
    let rule = &compiled.rule;
    if !rule.enabled {
        return false;
    }
    let when = &rule.when;

    if let Some(direction) = when.direction {
        if direction != row.direction {
            return false;
        }
    }

    if let Some(tokens) = &when.contains {
        let hit = tokens
            .iter()
            .any(|token| normalized_description.contains(&normalize_for_match(token)));
        if !hit {
            return false;
        }
    }

    if let Some(regex) = &compiled.compiled_regex {
        if !regex.is_match(normalized_description) {
            return false;
        }
    }

    if let Some(expected) = &when.iban_equals {
        let expected = expected.to_uppercase();
        match row.counterparty_iban.as_deref() {
            Some(iban) if iban.to_uppercase() == expected => {}
            _ => return false,
        }
    }

    if let Some(allowed) = &when.mcc_in {
        match row.mcc.as_deref() {
            Some(mcc) => {
                let mcc = mcc.to_uppercase();
                if !allowed.iter().any(|code| code.to_uppercase() == mcc) {
                    return false;
                }
            }
            None => return false,
        }
    }

    if let Some(expected) = &when.merchant_equals {
        match merchant_name {
            Some(merchant) if merchant == expected.to_uppercase() => {}
            _ => return false,
        }
    }

    if let Some(min) = when.min_amount_abs {
        if row.amount_cents.abs() < min {
            return false;
        }
    }
    if let Some(max) = when.max_amount_abs {
        if row.amount_cents.abs() > max {
            return false;
        }
    }

    true
}
