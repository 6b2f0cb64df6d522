use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use kontoflow_core::ParsedRow;

/// SEPA bookkeeping tokens (`SVWZ+...`, `EREF+...`, IBAN/BIC prefixes) are
/// high-entropy noise that defeats substring matching.
static SEPA_METADATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:SVWZ|EREF|MREF|KREF|CRED|IBAN|BIC)\+[^ ]*").unwrap()
});

static GERMAN_IBAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bDE\d{2}[A-Z0-9]{18,}").unwrap());

static PAYPAL_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)PAYPAL ?\*?").unwrap());

/// Alphanumeric runs of ten or more characters. Dropped only when they carry
/// at least one digit, so real words survive.
static LONG_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9A-Za-z]{10,}\b").unwrap());

pub fn transliterate_german(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'Ä' => out.push_str("AE"),
            'ä' => out.push_str("ae"),
            'Ö' => out.push_str("OE"),
            'ö' => out.push_str("oe"),
            'Ü' => out.push_str("UE"),
            'ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            other => out.push(other),
        }
    }
    out
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Transliterates, decomposes (NFKD) and strips combining marks, uppercases
/// and collapses whitespace. The canonical form all matching runs on.
pub fn normalize_for_match(input: &str) -> String {
    let text = transliterate_german(input);
    let text: String = text
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();
    collapse_whitespace(&text.to_uppercase())
}

/// Strips everything but ASCII alphanumerics; both sides of a fuzzy merchant
/// comparison are reduced to this compact form.
pub fn sanitize_compact(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn strip_long_ids(input: &str) -> Cow<'_, str> {
    LONG_ID.replace_all(input, |caps: &regex::Captures| {
        let token = &caps[0];
        if token.chars().any(|c| c.is_ascii_digit()) {
            String::from(" ")
        } else {
            token.to_string()
        }
    })
}

/// Removes SEPA metadata, embedded IBANs, PayPal statement prefixes and long
/// numeric identifiers from free text.
pub fn strip_noise(input: &str) -> String {
    let text = collapse_whitespace(input);
    let text = SEPA_METADATA.replace_all(&text, " ");
    let text = GERMAN_IBAN.replace_all(&text, " ");
    let text = PAYPAL_PREFIX.replace_all(&text, " ");
    let text = strip_long_ids(&text);
    collapse_whitespace(&text)
}

/// Builds the normalized description the engine matches against: the row's
/// descriptive fields joined, de-noised and canonicalized.
pub fn normalize_description(row: &ParsedRow) -> String {
    let mut candidates: Vec<&str> = Vec::new();
    if !row.raw_text.trim().is_empty() {
        candidates.push(&row.raw_text);
    }
    if let Some(reference) = row.reference.as_deref() {
        if !reference.trim().is_empty() {
            candidates.push(reference);
        }
    }
    if let Some(counterparty) = row.counterparty.as_deref() {
        if !counterparty.trim().is_empty() {
            candidates.push(counterparty);
        }
    }
    normalize_for_match(&strip_noise(&candidates.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn german_letters_are_transliterated() {
        assert_eq!(normalize_for_match("Bäckerei Müßig"), "BAECKEREI MUESSIG");
        assert_eq!(normalize_for_match("ÜBERWEISUNG"), "UEBERWEISUNG");
    }

    #[test]
    fn accents_are_stripped() {
        assert_eq!(normalize_for_match("Café"), "CAFE");
    }

    #[test]
    fn sepa_tokens_and_long_ids_are_removed() {
        let cleaned = strip_noise("SVWZ+RE2025-0042 EREF+X9912 Miete Maerz MREF+M1");
        assert_eq!(cleaned, "Miete Maerz");

        let cleaned = strip_noise("Kartenzahlung 1234567890123 REWE");
        assert_eq!(cleaned, "Kartenzahlung REWE");
    }

    #[test]
    fn long_words_without_digits_survive() {
        assert_eq!(strip_noise("HAUSVERWALTUNG Meyer"), "HAUSVERWALTUNG Meyer");
    }

    #[test]
    fn paypal_prefix_is_stripped() {
        assert_eq!(strip_noise("PAYPAL *SPOTIFY"), "SPOTIFY");
    }

    #[test]
    fn description_joins_fields() {
        let mut row = ParsedRow::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), -1299);
        row.raw_text = "Lastschrift".to_string();
        row.reference = Some("SVWZ+ABC123 Netflix Abo".to_string());
        row.counterparty = Some("NETFLIX INTERNATIONAL".to_string());
        assert_eq!(
            normalize_description(&row),
            "LASTSCHRIFT NETFLIX ABO NETFLIX INTERNATIONAL"
        );
    }
}
