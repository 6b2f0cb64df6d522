use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kontoflow_core::{CategorizedTransaction, CategorySource, ParsedRow};

use crate::normalize::normalize_description;

/// Which transaction attribute an override rule tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideScope {
    /// Substring match on the counterparty name.
    Payee,
    /// Substring match on reference or raw purpose text.
    Memo,
    /// Exact match on the counterparty (or account) IBAN.
    Iban,
    Mcc,
    /// Exact match on the transaction fingerprint; pins one transaction.
    Fingerprint,
}

/// A user-authored categorization override. Overrides bypass the rule engine
/// entirely and carry confidence 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRule {
    pub id: String,
    pub scope: OverrideScope,
    pub pattern: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn rule_matches(rule: &OverrideRule, row: &ParsedRow, fingerprint: &str) -> bool {
    let pattern = rule.pattern.to_lowercase();
    match rule.scope {
        OverrideScope::Payee => row
            .counterparty
            .as_deref()
            .is_some_and(|p| p.to_lowercase().contains(&pattern)),
        OverrideScope::Memo => {
            let memo_hit = row
                .reference
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(&pattern));
            memo_hit || row.raw_text.to_lowercase().contains(&pattern)
        }
        OverrideScope::Iban => {
            let target = squash(&pattern);
            row.counterparty_iban
                .as_deref()
                .or(row.account_iban.as_deref())
                .is_some_and(|iban| squash(iban) == target)
        }
        OverrideScope::Mcc => row
            .mcc
            .as_deref()
            .is_some_and(|mcc| mcc.to_lowercase() == pattern),
        OverrideScope::Fingerprint => fingerprint.to_lowercase() == pattern,
    }
}

/// Most recently created matching override, or none. Newest-wins keeps the
/// behavior stable as users refine their rules over time.
pub fn find_matching_override<'a>(
    row: &ParsedRow,
    fingerprint: &str,
    rules: &'a [OverrideRule],
) -> Option<&'a OverrideRule> {
    let mut ordered: Vec<&OverrideRule> = rules.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ordered
        .into_iter()
        .find(|rule| rule_matches(rule, row, fingerprint))
}

/// Applies an override verbatim: its category, confidence 1.0, and rule
/// provenance carrying the override id for audit.
pub fn apply_override(row: ParsedRow, rule: &OverrideRule) -> CategorizedTransaction {
    let normalized_description = normalize_description(&row);
    let merchant = row.counterparty.clone();
    CategorizedTransaction {
        category: rule.category.clone(),
        category_confidence: 1.0,
        category_source: CategorySource::Rule,
        category_rule_id: Some(rule.id.clone()),
        merchant,
        normalized_description,
        row,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row() -> ParsedRow {
        let mut row = ParsedRow::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), -1299);
        row.counterparty = Some("NETFLIX INTERNATIONAL B.V.".to_string());
        row.reference = Some("Abo 03/2025".to_string());
        row.counterparty_iban = Some("NL91 ABNA 0417 1643 00".to_string());
        row
    }

    fn rule(id: &str, scope: OverrideScope, pattern: &str, hours_ago: i64) -> OverrideRule {
        OverrideRule {
            id: id.to_string(),
            scope,
            pattern: pattern.to_string(),
            category: "subscriptions".to_string(),
            created_at: Utc::now() - chrono::Duration::hours(hours_ago),
        }
    }

    #[test]
    fn payee_and_memo_are_substring_matches() {
        let rules = vec![rule("o1", OverrideScope::Payee, "netflix", 1)];
        assert!(find_matching_override(&row(), "fp", &rules).is_some());

        let rules = vec![rule("o2", OverrideScope::Memo, "abo 03", 1)];
        assert!(find_matching_override(&row(), "fp", &rules).is_some());
    }

    #[test]
    fn iban_match_ignores_spacing() {
        let rules = vec![rule("o1", OverrideScope::Iban, "NL91ABNA0417164300", 1)];
        assert!(find_matching_override(&row(), "fp", &rules).is_some());
    }

    #[test]
    fn fingerprint_match_is_exact() {
        let rules = vec![rule("o1", OverrideScope::Fingerprint, "ABCDEF", 1)];
        assert!(find_matching_override(&row(), "abcdef", &rules).is_some());
        assert!(find_matching_override(&row(), "abcdef99", &rules).is_none());
    }

    #[test]
    fn newest_rule_wins() {
        let mut newer = rule("newer", OverrideScope::Payee, "netflix", 1);
        newer.category = "streaming".to_string();
        let older = rule("older", OverrideScope::Payee, "netflix", 48);
        let rules = vec![older, newer];
        let hit = find_matching_override(&row(), "fp", &rules).unwrap();
        assert_eq!(hit.id, "newer");
    }

    #[test]
    fn applied_override_has_full_confidence() {
        let r = rule("o1", OverrideScope::Payee, "netflix", 1);
        let tx = apply_override(row(), &r);
        assert_eq!(tx.category, "subscriptions");
        assert_eq!(tx.category_confidence, 1.0);
        assert_eq!(tx.category_source, CategorySource::Rule);
        assert_eq!(tx.category_rule_id.as_deref(), Some("o1"));
    }
}
