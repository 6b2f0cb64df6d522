use kontoflow_core::{parse_euro_amount, parse_flexible_date, ParsedRow};

use super::{
    build_raw_text, header_score, non_empty, sample_parse_score, value_by_includes, value_for,
    BankProfile, Record,
};
use crate::error::RowError;

const HEADER_KEYWORDS: [&str; 4] = ["buchung", "datum", "betrag", "verwendungszweck"];

/// Catch-all for German exports no fixed profile claims. The score is clamped
/// to [0.2, 0.85] so it never outbids a bank-specific profile on that bank's
/// own file, but still wins over nothing.
pub struct GenericDe;

impl BankProfile for GenericDe {
    fn id(&self) -> &'static str {
        "generic_de"
    }

    fn matches(&self, headers: &[String], sample_rows: &[Vec<String>]) -> f64 {
        let header_weight = header_score(headers, &HEADER_KEYWORDS);
        let sample = sample_parse_score(
            headers,
            sample_rows,
            &["betrag", "umsatz", "betrag in eur", "soll", "haben"],
            &["buchung", "datum"],
        );
        (header_weight * 0.5 + sample * 0.5).clamp(0.2, 0.85)
    }

    fn map_row(&self, record: &Record) -> Result<ParsedRow, RowError> {
        let booking_raw = value_by_includes(record, &["buchung", "buchungstag", "datum"]);
        if booking_raw.trim().is_empty() {
            return Err(RowError::MissingField("booking date"));
        }
        let booking_date = parse_flexible_date(booking_raw)?;

        let amount_raw =
            non_empty(value_by_includes(record, &["betrag", "umsatz", "betrag in eur"]))
                .or_else(|| signed_amount(record))
                .ok_or(RowError::MissingField("amount"))?;
        let amount_cents = parse_euro_amount(&amount_raw)?;

        let mut row = ParsedRow::new(booking_date, amount_cents);
        let valuta_raw = value_by_includes(record, &["wertstellung", "valuta"]);
        row.value_date = Some(match non_empty(valuta_raw) {
            Some(v) => parse_flexible_date(&v)?,
            None => booking_date,
        });

        row.counterparty = non_empty(value_by_includes(
            record,
            &["auftraggeber", "empfaenger", "gegenkonto", "name"],
        ))
        .or_else(|| non_empty(value_for(record, &["Name"])));
        row.counterparty_iban =
            non_empty(value_by_includes(record, &["iban", "gegenkonto iban"]));
        row.reference = non_empty(value_by_includes(
            record,
            &["verwendungszweck", "buchungstext", "beschreibung", "zweck"],
        ))
        .or_else(|| non_empty(value_for(record, &["Beschreibung"])));

        row.raw_text = build_raw_text(
            record,
            &["Verwendungszweck", "Buchungstext", "Beschreibung", "Zweck", "Text"],
        );
        row.raw = record.to_map();
        Ok(row)
    }
}

fn signed_amount(record: &Record) -> Option<String> {
    if let Some(soll) = non_empty(value_by_includes(record, &["soll"])) {
        return Some(format!("-{soll}"));
    }
    non_empty(value_by_includes(record, &["haben"]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        ["Datum", "Beschreibung", "Betrag"].iter().map(|s| s.to_string()).collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn score_is_clamped() {
        let empty: Vec<String> = vec!["A".to_string(), "B".to_string()];
        assert_eq!(GenericDe.matches(&empty, &[]), 0.2);
        let sample = vec![row(&["01.03.2025", "Einkauf", "-5,00"])];
        assert!(GenericDe.matches(&headers(), &sample) <= 0.85);
    }

    #[test]
    fn maps_minimal_layout() {
        let record =
            Record::from_headers(&headers(), &row(&["01.03.2025", "Einkauf REWE", "-5,00"]));
        let parsed = GenericDe.map_row(&record).unwrap();
        assert_eq!(parsed.amount_cents, -500);
        assert_eq!(parsed.reference.as_deref(), Some("Einkauf REWE"));
    }
}
