use kontoflow_core::{parse_euro_amount, parse_flexible_date, ParsedRow};

use super::{
    build_raw_text, header_score, non_empty, normalize_header, sample_parse_score,
    value_by_includes, value_for, BankProfile, Record,
};
use crate::error::RowError;

const HEADER_KEYWORDS: [&str; 5] =
    ["buchung", "wertstellung", "betrag", "verwendungszweck", "gegenkonto"];

pub struct Ing;

impl BankProfile for Ing {
    fn id(&self) -> &'static str {
        "ing"
    }

    fn matches(&self, headers: &[String], sample_rows: &[Vec<String>]) -> f64 {
        let header_weight = header_score(headers, &HEADER_KEYWORDS);
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        // ING is the only supported bank whose date column is exactly
        // "Buchung" (not "Buchungstag") next to a "Währung" column.
        let has_signature = normalized.iter().any(|h| h == "buchung")
            && normalized.iter().any(|h| h == "waehrung");
        let sample = sample_parse_score(
            headers,
            sample_rows,
            &["betrag", "umsatz"],
            &["buchung", "buchungstag"],
        );
        let base = (header_weight * 0.6 + sample * 0.4).min(1.0);
        let bonus = if has_signature { 0.15 } else { 0.0 };
        (base + bonus).min(1.0)
    }

    fn map_row(&self, record: &Record) -> Result<ParsedRow, RowError> {
        let booking_raw = value_by_includes(record, &["buchung", "buchungstag", "datum"]);
        if booking_raw.trim().is_empty() {
            return Err(RowError::MissingField("booking date"));
        }
        let booking_date = parse_flexible_date(booking_raw)?;

        let amount_raw =
            non_empty(value_by_includes(record, &["betrag", "umsatz", "betrag in eur"]))
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
            &["gegenkonto", "auftraggeber", "empfaenger", "beguenstigter"],
        ))
        .or_else(|| non_empty(value_for(record, &["Name"])));
        row.counterparty_iban =
            non_empty(value_by_includes(record, &["gegenkonto iban", "iban"]));
        row.reference = non_empty(value_by_includes(
            record,
            &["verwendungszweck", "text", "buchungstext"],
        ))
        .or_else(|| non_empty(value_for(record, &["Beschreibung"])));

        row.raw_text = build_raw_text(
            record,
            &["Verwendungszweck", "Buchungstext", "Text", "Beschreibung"],
        );
        row.raw = record.to_map();
        Ok(row)
    }
}
