use kontoflow_core::{parse_euro_amount, parse_flexible_date, ParsedRow};

use super::{
    build_raw_text, header_score, non_empty, sample_parse_score, value_by_includes, value_for,
    BankProfile, Record,
};
use crate::error::RowError;

const HEADER_KEYWORDS: [&str; 4] = ["buchungstag", "wertstellung", "umsatz in eur", "buchungstext"];

pub struct Comdirect;

impl BankProfile for Comdirect {
    fn id(&self) -> &'static str {
        "comdirect"
    }

    fn matches(&self, headers: &[String], sample_rows: &[Vec<String>]) -> f64 {
        let header_weight = header_score(headers, &HEADER_KEYWORDS);
        let sample = sample_parse_score(
            headers,
            sample_rows,
            &["umsatz in eur", "betrag"],
            &["buchungstag"],
        );
        (header_weight * 0.7 + sample * 0.3).min(1.0)
    }

    fn map_row(&self, record: &Record) -> Result<ParsedRow, RowError> {
        let booking_raw = value_by_includes(record, &["buchungstag"]);
        let amount_raw = value_by_includes(record, &["umsatz in eur", "betrag"]);
        if booking_raw.trim().is_empty() {
            return Err(RowError::MissingField("booking date"));
        }
        if amount_raw.trim().is_empty() {
            return Err(RowError::MissingField("amount"));
        }

        let booking_date = parse_flexible_date(booking_raw)?;
        let amount_cents = parse_euro_amount(amount_raw)?;

        let mut row = ParsedRow::new(booking_date, amount_cents);
        let valuta_raw = value_by_includes(record, &["wertstellung"]);
        row.value_date = Some(match non_empty(valuta_raw) {
            Some(v) => parse_flexible_date(&v)?,
            None => booking_date,
        });

        row.counterparty = non_empty(value_for(
            record,
            &["Auftraggeber/Empfänger", "Begünstigter", "Empfänger"],
        ))
        .or_else(|| {
            non_empty(value_by_includes(
                record,
                &["auftraggeber", "empfänger", "beguenstigter"],
            ))
        });
        row.counterparty_iban = non_empty(value_by_includes(record, &["iban"]));
        row.reference = non_empty(value_by_includes(
            record,
            &["verwendungszweck", "buchungstext", "vorgang"],
        ));
        row.raw_text = build_raw_text(
            record,
            &["Buchungstext", "Vorgang", "Verwendungszweck", "Notiz", "Kategorie"],
        );
        row.raw = record.to_map();
        Ok(row)
    }
}
