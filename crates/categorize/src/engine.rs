use kontoflow_core::{CategorizedTransaction, CategorySource, ParsedRow};

use crate::merchants::{MerchantMatch, PatternSet};
use crate::normalize::normalize_description;
use crate::rules::{RuleSet, RuleSetError, RuleSource};

/// Built-in rule and pattern tables, compiled into the binary.
pub const SYSTEM_RULES_TOML: &str = include_str!("../rules/system_rules.toml");
pub const MERCHANT_PATTERNS_TOML: &str = include_str!("../rules/merchant_patterns.toml");

pub const FALLBACK_CATEGORY: &str = "other";
pub const FALLBACK_CONFIDENCE: f64 = 0.1;

/// All configuration the engine consults. There is no global state: tests
/// and callers alike construct a context and pass rows through it.
#[derive(Debug, Default)]
pub struct EngineContext {
    system_rules: RuleSet,
    merchant_patterns: PatternSet,
    user_rules: RuleSet,
}

struct Candidate<'a> {
    category: &'a str,
    score: f64,
    user: bool,
    rule_id: String,
}

impl EngineContext {
    pub fn new(system_rules: RuleSet, merchant_patterns: PatternSet) -> Self {
        EngineContext {
            system_rules,
            merchant_patterns,
            user_rules: RuleSet::default(),
        }
    }

    /// Context over the embedded system tables.
    pub fn with_defaults() -> Result<Self, RuleSetError> {
        Ok(Self::new(
            RuleSet::from_toml(SYSTEM_RULES_TOML)?,
            PatternSet::from_toml(MERCHANT_PATTERNS_TOML)?,
        ))
    }

    pub fn with_user_rules(mut self, user_rules: RuleSet) -> Self {
        self.user_rules = user_rules;
        self
    }

    /// Assigns a category to one row. Never fails: rows matching nothing get
    /// the fallback category with low confidence.
    pub fn categorize(&self, row: ParsedRow) -> CategorizedTransaction {
        let normalized_description = normalize_description(&row);
        let merchant = self.merchant_patterns.detect(&normalized_description);

        let mut candidates: Vec<Candidate> = Vec::new();
        for rule in self
            .user_rules
            .matches(&row, &normalized_description, merchant.as_ref())
        {
            candidates.push(Candidate {
                category: &rule.category,
                score: rule.score,
                user: rule.source == RuleSource::User,
                rule_id: rule.id.clone(),
            });
        }
        for rule in self
            .system_rules
            .matches(&row, &normalized_description, merchant.as_ref())
        {
            candidates.push(Candidate {
                category: &rule.category,
                score: rule.score,
                user: false,
                rule_id: rule.id.clone(),
            });
        }
        if let Some(m) = merchant.as_ref() {
            if let Some(category) = m.category.as_deref() {
                candidates.push(Candidate {
                    category,
                    score: m.score,
                    user: false,
                    rule_id: format!("merchant:{}", m.pattern_id),
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.user.cmp(&a.user))
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        let merchant_name = merchant_display(&merchant, &row);
        match candidates.first() {
            Some(best) => CategorizedTransaction {
                category: best.category.to_string(),
                category_confidence: score_to_confidence(best.score),
                category_source: if best.user {
                    CategorySource::User
                } else {
                    CategorySource::Rule
                },
                category_rule_id: Some(best.rule_id.clone()),
                merchant: merchant_name,
                normalized_description,
                row,
            },
            None => CategorizedTransaction {
                category: FALLBACK_CATEGORY.to_string(),
                category_confidence: FALLBACK_CONFIDENCE,
                category_source: CategorySource::Unknown,
                category_rule_id: None,
                merchant: merchant_name,
                normalized_description,
                row,
            },
        }
    }

    pub fn categorize_batch(&self, rows: Vec<ParsedRow>) -> Vec<CategorizedTransaction> {
        rows.into_iter().map(|row| self.categorize(row)).collect()
    }
}

fn merchant_display(merchant: &Option<MerchantMatch>, row: &ParsedRow) -> Option<String> {
    merchant
        .as_ref()
        .map(|m| m.merchant.clone())
        .or_else(|| row.counterparty.clone())
}

/// Fixed step function from rule score to confidence.
pub fn score_to_confidence(score: f64) -> f64 {
    if score >= 220.0 {
        1.0
    } else if score >= 180.0 {
        0.9
    } else if score >= 150.0 {
        0.8
    } else {
        (score / 200.0).clamp(0.4, 0.7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(amount_cents: i64, text: &str) -> ParsedRow {
        let mut row = ParsedRow::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), amount_cents);
        row.raw_text = text.to_string();
        row
    }

    fn ctx() -> EngineContext {
        EngineContext::with_defaults().unwrap()
    }

    #[test]
    fn embedded_tables_load() {
        let ctx = ctx();
        assert!(!ctx.system_rules.is_empty());
        assert!(!ctx.merchant_patterns.is_empty());
    }

    #[test]
    fn salary_scenario_scores_high() {
        let tx = ctx().categorize(row(300000, "GEHALT ACME GMBH"));
        assert_eq!(tx.category, "income_salary");
        assert!(tx.category_confidence >= 0.9, "{}", tx.category_confidence);
        assert_eq!(tx.category_source, CategorySource::Rule);
    }

    #[test]
    fn fallback_is_other_unknown() {
        let tx = ctx().categorize(row(-123, "XQZRT"));
        assert_eq!(tx.category, "other");
        assert_eq!(tx.category_confidence, 0.1);
        assert_eq!(tx.category_source, CategorySource::Unknown);
        assert!(tx.category_rule_id.is_none());
    }

    #[test]
    fn categorization_is_deterministic() {
        let ctx = ctx();
        let a = ctx.categorize(row(-1299, "LASTSCHRIFT NETFLIX ABO"));
        let b = ctx.categorize(row(-1299, "LASTSCHRIFT NETFLIX ABO"));
        assert_eq!(a.category, b.category);
        assert_eq!(a.category_confidence, b.category_confidence);
        assert_eq!(a.category_rule_id, b.category_rule_id);
    }

    #[test]
    fn merchant_pattern_supplies_category() {
        let tx = ctx().categorize(row(-4523, "KARTENZAHLUNG REWE SAGT DANKE"));
        assert_eq!(tx.category, "groceries");
        assert_eq!(tx.merchant.as_deref(), Some("REWE"));
    }

    #[test]
    fn user_rule_wins_tie_against_system() {
        use crate::rules::{CategoryRule, RulePredicates, RuleSource};

        let user_rule = CategoryRule {
            id: "user.cafe".to_string(),
            enabled: true,
            source: RuleSource::User,
            score: 200.0,
            when: RulePredicates {
                contains: Some(vec!["MIETE".to_string()]),
                ..RulePredicates::default()
            },
            category: "shared_flat".to_string(),
        };
        let ctx = ctx().with_user_rules(RuleSet::new(vec![user_rule]).unwrap());
        let tx = ctx.categorize(row(-85000, "MIETE MUSTERSTR 1"));
        assert_eq!(tx.category, "shared_flat");
        assert_eq!(tx.category_source, CategorySource::User);
        assert_eq!(tx.category_rule_id.as_deref(), Some("user.cafe"));
    }

    #[test]
    fn confidence_steps() {
        assert_eq!(score_to_confidence(230.0), 1.0);
        assert_eq!(score_to_confidence(200.0), 0.9);
        assert_eq!(score_to_confidence(160.0), 0.8);
        assert_eq!(score_to_confidence(120.0), 0.6);
        assert_eq!(score_to_confidence(10.0), 0.4);
        assert_eq!(score_to_confidence(149.0), 0.7);
    }

    #[test]
    fn transfer_keywords_hit_internal_category() {
        let tx = ctx().categorize(row(-50000, "UEBERWEISUNG AUF TAGESGELD SPARPLAN"));
        assert_eq!(tx.category, "transfer_internal");
    }
}
