use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use unicode_normalization::UnicodeNormalization;

use kontoflow_core::{parse_euro_amount, parse_flexible_date, ParsedRow};

use crate::error::RowError;
use crate::profiles::{non_empty, Record};

/// Minimum field coverage for the heuristic adapter to be trusted at all.
pub const MIN_COVERAGE: f64 = 0.5;

static GERMAN_DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\d{1,2}$").unwrap());

/// How the amount is encoded in the layout.
#[derive(Debug, Clone)]
pub enum AmountRule {
    /// One signed column; `german` selects comma-decimal parsing.
    Single { column: String, german: bool },
    /// Split credit/debit columns; the debit side becomes negative.
    CreditDebit { credit: String, debit: String },
}

/// A column mapping inferred from headers alone, used when no fixed bank
/// profile claims the file. Built once per file, then applied row by row.
#[derive(Debug, Clone)]
pub struct HeuristicAdapter {
    pub booking_date: String,
    pub value_date: Option<String>,
    pub amount: AmountRule,
    pub currency: Option<String>,
    pub purpose: Option<String>,
    pub counterparty: Option<String>,
    pub counterparty_iban: Option<String>,
    pub tx_type: Option<String>,
}

/// Accent-folds and lower-cases a header for alias comparison, replacing
/// every non-alphanumeric run with a single space.
fn fold_header(value: &str) -> String {
    let stripped: String = value
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();
    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for c in stripped.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// First header equal to one of the aliases after folding; failing that, the
/// first header the fallback pattern matches.
fn pick<'a>(headers: &'a [String], aliases: &[&str], fallback: Option<&Regex>) -> Option<&'a str> {
    let folded: Vec<String> = headers.iter().map(|h| fold_header(h)).collect();
    for alias in aliases {
        let target = fold_header(alias);
        if let Some(idx) = folded.iter().position(|h| *h == target) {
            return Some(&headers[idx]);
        }
    }
    if let Some(re) = fallback {
        if let Some(idx) = folded.iter().position(|h| re.is_match(h)) {
            return Some(&headers[idx]);
        }
    }
    None
}

/// Infers an adapter from the headers and one sample row. Coverage counts
/// how many of the six core fields were found, with a half-field bonus for a
/// value-date column; reasons record which header backed each field.
pub fn build_heuristic_adapter(
    headers: &[String],
    sample: &Record,
) -> (Option<HeuristicAdapter>, f64, Vec<String>) {
    let booking_re = Regex::new(r"(buch|post|book|completed|datum|date)").ok();
    let value_re = Regex::new(r"(valuta|wertstell|value)").ok();

    let mut reasons = Vec::new();

    let booking_date = pick(
        headers,
        &["buchungstag", "buchungsdatum", "date", "completed date", "datum", "posting date"],
        booking_re.as_ref(),
    );
    if let Some(col) = booking_date {
        reasons.push(format!("bookingDate:{col}"));
    }
    let value_date = pick(
        headers,
        &["valuta", "wertstellung", "valuedate"],
        value_re.as_ref(),
    );
    if let Some(col) = value_date {
        reasons.push(format!("valueDate:{col}"));
    }

    let credit = pick(headers, &["paid in (eur)", "paid in", "credit amount"], None);
    let debit = pick(headers, &["paid out (eur)", "paid out", "debit amount"], None);
    let amount_col = pick(
        headers,
        &["betrag (eur)", "betrag", "amount", "umsatz (eur)", "umsatz in eur"],
        None,
    );
    let amount = match (credit, debit) {
        (Some(c), Some(d)) => {
            reasons.push(format!("amount:creditDebit({c},{d})"));
            Some(AmountRule::CreditDebit { credit: c.to_string(), debit: d.to_string() })
        }
        _ => amount_col.map(|col| {
            let sample_value = sample
                .entries()
                .find(|(key, _)| key == &col)
                .map(|(_, v)| v)
                .unwrap_or("");
            let german = GERMAN_DECIMAL.is_match(sample_value.trim());
            reasons.push(if german {
                format!("amount:{col}(de-DE)")
            } else {
                format!("amount:{col}")
            });
            AmountRule::Single { column: col.to_string(), german }
        }),
    };

    let currency = pick(headers, &["währung", "currency", "currency code", "ccy"], None);
    if let Some(col) = currency {
        reasons.push(format!("currency:{col}"));
    }
    let purpose = pick(
        headers,
        &[
            "verwendungszweck",
            "reference",
            "beschreibung",
            "description",
            "payment reference",
            "vorgang/verwendungszweck",
        ],
        None,
    );
    if let Some(col) = purpose {
        reasons.push(format!("purpose:{col}"));
    }
    let counterparty = pick(
        headers,
        &[
            "auftraggeber/empfänger",
            "begünstigter/zahlungspflichtiger",
            "payee",
            "counterparty",
            "name",
            "beneficiary",
            "merchant",
        ],
        None,
    );
    if let Some(col) = counterparty {
        reasons.push(format!("counterpartName:{col}"));
    }
    let counterparty_iban = pick(headers, &["iban", "account number", "kontonummer"], None);
    if let Some(col) = counterparty_iban {
        reasons.push(format!("counterpartIban:{col}"));
    }
    let tx_type = pick(headers, &["buchungstext", "transaction type", "type"], None);
    if let Some(col) = tx_type {
        reasons.push(format!("txType:{col}"));
    }

    let core_found = [
        booking_date.is_some(),
        amount.is_some(),
        currency.is_some(),
        purpose.is_some(),
        counterparty.is_some(),
        tx_type.is_some(),
    ]
    .iter()
    .filter(|found| **found)
    .count();
    let mut coverage = core_found as f64 / 6.0;
    if value_date.is_some() {
        coverage += 0.5 / 6.0;
    }

    let adapter = match (booking_date, amount) {
        (Some(booking), Some(amount)) => Some(HeuristicAdapter {
            booking_date: booking.to_string(),
            value_date: value_date.map(str::to_string),
            amount,
            currency: currency.map(str::to_string),
            purpose: purpose.map(str::to_string),
            counterparty: counterparty.map(str::to_string),
            counterparty_iban: counterparty_iban.map(str::to_string),
            tx_type: tx_type.map(str::to_string),
        }),
        _ => None,
    };

    (adapter, coverage, reasons)
}

impl HeuristicAdapter {
    pub fn map_row(&self, record: &Record) -> Result<ParsedRow, RowError> {
        let booking_raw = exact(record, &self.booking_date);
        if booking_raw.trim().is_empty() {
            return Err(RowError::MissingField("booking date"));
        }
        let booking_date = parse_flexible_date(booking_raw)?;

        let amount_cents = match &self.amount {
            AmountRule::Single { column, german } => {
                let raw = non_empty(exact(record, column))
                    .ok_or(RowError::MissingField("amount"))?;
                if *german {
                    parse_euro_amount(&raw)?
                } else {
                    parse_plain_amount(&raw)?
                }
            }
            AmountRule::CreditDebit { credit, debit } => {
                if let Some(raw) = non_empty(exact(record, credit)) {
                    parse_plain_amount(&raw)?.abs()
                } else if let Some(raw) = non_empty(exact(record, debit)) {
                    -parse_plain_amount(&raw)?.abs()
                } else {
                    return Err(RowError::MissingField("amount"));
                }
            }
        };

        let mut row = ParsedRow::new(booking_date, amount_cents);
        row.value_date = match self.value_date.as_deref().map(|c| exact(record, c)) {
            Some(v) if !v.trim().is_empty() => Some(parse_flexible_date(v)?),
            _ => Some(booking_date),
        };
        if let Some(currency) =
            self.currency.as_deref().and_then(|c| non_empty(exact(record, c)))
        {
            row.currency = currency.to_uppercase();
        }
        row.reference = self.purpose.as_deref().and_then(|c| non_empty(exact(record, c)));
        row.counterparty =
            self.counterparty.as_deref().and_then(|c| non_empty(exact(record, c)));
        row.counterparty_iban =
            self.counterparty_iban.as_deref().and_then(|c| non_empty(exact(record, c)));

        let mut parts: Vec<String> = Vec::new();
        for col in [self.tx_type.as_deref(), self.purpose.as_deref(), self.counterparty.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(v) = non_empty(exact(record, col)) {
                parts.push(v);
            }
        }
        row.raw_text = if parts.is_empty() {
            record
                .entries()
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(" | ")
        } else {
            parts.join(" | ")
        };
        row.raw = record.to_map();
        Ok(row)
    }
}

fn exact<'a>(record: &'a Record, column: &str) -> &'a str {
    record
        .entries()
        .find(|(key, _)| *key == column)
        .map(|(_, v)| v)
        .unwrap_or("")
}

/// Dot-decimal amounts with optional comma thousands separators, as English
/// exports write them.
fn parse_plain_amount(raw: &str) -> Result<i64, RowError> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches("EUR")
        .trim_end_matches('€')
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let value: Decimal = cleaned
        .parse()
        .map_err(|_| kontoflow_core::MoneyError::Invalid(raw.trim().to_string()))?;
    (value * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| kontoflow_core::MoneyError::Invalid(raw.trim().to_string()))
        .map_err(RowError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn sample(h: &[String], row: &[&str]) -> Record {
        Record::from_headers(h, &row.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn header_folding_strips_accents() {
        assert_eq!(fold_header("Währung"), "wahrung");
        assert_eq!(fold_header("  Paid In (EUR) "), "paid in eur");
    }

    #[test]
    fn builds_adapter_for_english_layout() {
        let h = headers(&["Completed Date", "Description", "Paid Out", "Paid In", "Currency"]);
        let s = sample(&h, &["2025-03-01", "Coffee", "4.50", "", "EUR"]);
        let (adapter, coverage, reasons) = build_heuristic_adapter(&h, &s);
        let adapter = adapter.unwrap();
        assert!(coverage >= MIN_COVERAGE, "coverage was {coverage}");
        assert!(matches!(adapter.amount, AmountRule::CreditDebit { .. }));
        assert!(reasons.iter().any(|r| r.starts_with("bookingDate:")));

        let row = adapter.map_row(&s).unwrap();
        assert_eq!(row.amount_cents, -450);
        assert_eq!(row.reference.as_deref(), Some("Coffee"));
    }

    #[test]
    fn german_decimal_detected_from_sample() {
        let h = headers(&["Datum", "Beschreibung", "Betrag"]);
        let s = sample(&h, &["01.03.2025", "Einkauf", "-1.234,56"]);
        let (adapter, _, _) = build_heuristic_adapter(&h, &s);
        let adapter = adapter.unwrap();
        assert!(matches!(adapter.amount, AmountRule::Single { german: true, .. }));
        assert_eq!(adapter.map_row(&s).unwrap().amount_cents, -123456);
    }

    #[test]
    fn value_date_adds_half_field_bonus() {
        let h = headers(&["Datum", "Betrag"]);
        let s = sample(&h, &["01.03.2025", "-5,00"]);
        let (_, bare, _) = build_heuristic_adapter(&h, &s);

        let h2 = headers(&["Datum", "Valuta", "Betrag"]);
        let s2 = sample(&h2, &["01.03.2025", "01.03.2025", "-5,00"]);
        let (_, with_valuta, _) = build_heuristic_adapter(&h2, &s2);
        assert!((with_valuta - bare - 0.5 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn unusable_headers_yield_no_adapter() {
        let h = headers(&["Foo", "Bar"]);
        let s = sample(&h, &["x", "y"]);
        let (adapter, coverage, _) = build_heuristic_adapter(&h, &s);
        assert!(adapter.is_none());
        assert!(coverage < MIN_COVERAGE);
    }
}
