use sha2::{Digest, Sha256};

use crate::transaction::ParsedRow;

/// Content address of a transaction, stable across re-exports of the same
/// statement. Cosmetic differences (whitespace, letter case) are normalized
/// away before hashing; the storage layer keys its unique index on this.
pub fn fingerprint(row: &ParsedRow) -> String {
    let value_date = row
        .value_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let parts = [
        row.booking_date.format("%Y-%m-%d").to_string(),
        value_date,
        row.amount_cents.to_string(),
        row.currency.to_uppercase(),
        collapse_whitespace(&row.raw_text).to_lowercase(),
        row.counterparty
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default(),
        row.counterparty_iban
            .as_deref()
            .map(|s| s.split_whitespace().collect::<String>().to_uppercase())
            .unwrap_or_default(),
    ];

    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(purpose: &str, counterparty: Option<&str>) -> ParsedRow {
        let mut r = ParsedRow::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), -6699);
        r.raw_text = purpose.to_string();
        r.counterparty = counterparty.map(|s| s.to_string());
        r
    }

    #[test]
    fn identical_rows_hash_identically() {
        let a = row("REWE SAGT DANKE", Some("REWE Markt GmbH"));
        let b = row("REWE SAGT DANKE", Some("REWE Markt GmbH"));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn stable_under_whitespace_and_case() {
        let a = row("REWE SAGT DANKE", Some("REWE Markt GmbH"));
        let b = row("  rewe   sagt danke ", Some(" rewe markt gmbh "));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn iban_spacing_is_ignored() {
        let mut a = row("Miete", None);
        a.counterparty_iban = Some("DE02120300000000202051".to_string());
        let mut b = row("Miete", None);
        b.counterparty_iban = Some("de02 1203 0000 0000 2020 51".to_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn amount_changes_the_hash() {
        let a = row("Miete", None);
        let mut b = row("Miete", None);
        b.amount_cents = -6700;
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn value_date_participates() {
        let a = row("Miete", None);
        let mut b = row("Miete", None);
        b.value_date = Some(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn hash_is_hex_sha256() {
        let fp = fingerprint(&row("x", None));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
