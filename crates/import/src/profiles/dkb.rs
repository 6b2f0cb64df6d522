use kontoflow_core::{parse_euro_amount, parse_flexible_date, ParsedRow};

use super::{
    build_raw_text, header_score, non_empty, normalize_header, sample_parse_score,
    value_by_includes, value_for, BankProfile, Record,
};
use crate::error::RowError;

const HEADER_KEYWORDS: [&str; 5] = [
    "buchungstag",
    "verwendungszweck",
    "betrag (eur)",
    "wertstellung",
    "auftragskonto",
];

pub struct Dkb;

impl BankProfile for Dkb {
    fn id(&self) -> &'static str {
        "dkb"
    }

    fn matches(&self, headers: &[String], sample_rows: &[Vec<String>]) -> f64 {
        let header_weight = header_score(headers, &HEADER_KEYWORDS);
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        // "Betrag (EUR)" and "Buchungsart" are DKB-only among the supported
        // layouts; ING and Sparkasse label the amount column plain "Betrag".
        let has_signature = normalized
            .iter()
            .any(|h| h == "betrag (eur)" || h == "buchungsart");
        let sample = sample_parse_score(
            headers,
            sample_rows,
            &["betrag (eur)", "betrag", "umsatz"],
            &["buchungstag"],
        );
        let base = (header_weight * 0.65 + sample * 0.35).min(1.0);
        let bonus = if has_signature { 0.15 } else { 0.0 };
        (base + bonus).min(1.0)
    }

    fn map_row(&self, record: &Record) -> Result<ParsedRow, RowError> {
        let booking_raw = value_by_includes(record, &["buchungstag"]);
        if booking_raw.trim().is_empty() {
            return Err(RowError::MissingField("booking date"));
        }
        let booking_date = parse_flexible_date(booking_raw)?;

        let amount_raw = non_empty(value_by_includes(
            record,
            &["betrag (eur)", "betrag", "umsatz", "betrag eur", "betrag in eur"],
        ))
        .ok_or(RowError::MissingField("amount"))?;
        let amount_cents = parse_euro_amount(&amount_raw)?;

        let mut row = ParsedRow::new(booking_date, amount_cents);
        let valuta_raw = value_by_includes(record, &["wertstellung"]);
        row.value_date = Some(match non_empty(valuta_raw) {
            Some(v) => parse_flexible_date(&v)?,
            None => booking_date,
        });

        row.counterparty = non_empty(value_by_includes(
            record,
            &["auftraggeber", "zahlungspflichtiger", "name", "gegenkonto"],
        ))
        .or_else(|| non_empty(value_for(record, &["Gegenkonto"])));
        row.counterparty_iban =
            non_empty(value_by_includes(record, &["iban", "gegenkonto iban"]));
        row.reference = non_empty(value_by_includes(
            record,
            &["verwendungszweck", "buchungstext", "zweck"],
        ))
        .or_else(|| non_empty(value_for(record, &["Beschreibung"])));

        row.raw_text = build_raw_text(
            record,
            &["Verwendungszweck", "Buchungstext", "Zweck", "Beschreibung", "Info"],
        );
        row.raw = record.to_map();
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        [
            "Buchungstag",
            "Wertstellung",
            "Buchungstext",
            "Auftraggeber / Begünstigter",
            "Verwendungszweck",
            "Kontonummer",
            "BLZ",
            "Betrag (EUR)",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matches_dkb_export() {
        let sample =
            vec![row(&["01.03.2025", "01.03.2025", "Lastschrift", "NETFLIX", "Abo", "DE12", "100", "-12,99"])];
        let score = Dkb.matches(&headers(), &sample);
        assert!(score >= 0.55, "score was {score}");
    }

    #[test]
    fn outscores_ing_on_own_layout() {
        let sample =
            vec![row(&["01.03.2025", "01.03.2025", "Lastschrift", "NETFLIX", "Abo", "DE12", "100", "-12,99"])];
        let dkb = Dkb.matches(&headers(), &sample);
        let ing = super::super::Ing.matches(&headers(), &sample);
        assert!(dkb > ing, "dkb {dkb} vs ing {ing}");
    }

    #[test]
    fn maps_row_with_counterparty() {
        let record = Record::from_headers(
            &headers(),
            &row(&["01.03.2025", "02.03.2025", "Lastschrift", "NETFLIX", "Abo 123", "DE12", "100", "-12,99"]),
        );
        let parsed = Dkb.map_row(&record).unwrap();
        assert_eq!(parsed.amount_cents, -1299);
        assert_eq!(parsed.counterparty.as_deref(), Some("NETFLIX"));
        assert_eq!(parsed.reference.as_deref(), Some("Abo 123"));
    }
}
