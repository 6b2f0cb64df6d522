use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use kontoflow_core::{ParseReport, ParsedRow, ProfileCandidate, TxSource};

use crate::error::{default_hints, ParseError};

/// Quick structural check before committing to the XML parser.
pub fn is_camt_xml(text: &str) -> bool {
    let head = text.trim_start();
    (head.starts_with("<?xml") || head.starts_with("<Document"))
        && (text.contains("BkToCstmrStmt") || text.contains("BkToCstmrAcctRpt"))
}

#[derive(Default)]
struct EntryBuilder {
    booking_date: Option<NaiveDate>,
    value_date: Option<NaiveDate>,
    amount_cents: Option<i64>,
    currency: Option<String>,
    debit: bool,
    purpose: Vec<String>,
    end_to_end_id: Option<String>,
    creditor_name: Option<String>,
    debtor_name: Option<String>,
    creditor_iban: Option<String>,
    debtor_iban: Option<String>,
}

impl EntryBuilder {
    fn finish(self, account_iban: &Option<String>) -> Option<ParsedRow> {
        let booking_date = self.booking_date.or(self.value_date)?;
        let mut amount_cents = self.amount_cents?;
        if self.debit {
            amount_cents = -amount_cents.abs();
        }

        let mut row = ParsedRow::new(booking_date, amount_cents);
        row.value_date = Some(self.value_date.unwrap_or(booking_date));
        row.source = TxSource::Camt;
        row.account_iban = account_iban.clone();
        if let Some(currency) = self.currency {
            row.currency = currency.to_uppercase();
        }
        // The counterparty is whoever is on the other side of the booking.
        row.counterparty = if self.debit {
            self.creditor_name.or(self.debtor_name)
        } else {
            self.debtor_name.or(self.creditor_name)
        };
        row.counterparty_iban = if self.debit {
            self.creditor_iban.or(self.debtor_iban)
        } else {
            self.debtor_iban.or(self.creditor_iban)
        };
        let purpose = self.purpose.join(" ");
        if !purpose.trim().is_empty() {
            row.reference = Some(purpose.trim().to_string());
        }
        row.external_id = self.end_to_end_id;
        row.raw_text = row
            .reference
            .clone()
            .or_else(|| row.counterparty.clone())
            .unwrap_or_default();
        Some(row)
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_xml_amount(raw: &str) -> Option<i64> {
    let value: Decimal = raw.trim().parse().ok()?;
    (value * Decimal::from(100)).round().to_i64()
}

fn path_ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

/// Parses an ISO 20022 camt.053 bank-to-customer statement. Entries without
/// a booking date or amount are skipped; everything else is best-effort.
pub fn parse_camt053(text: &str) -> Result<ParseReport, ParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut account_iban: Option<String> = None;
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                let name = local_name(start.name().as_ref());
                if name == "Ntry" {
                    entry = Some(EntryBuilder::default());
                }
                if name == "Amt" {
                    if let Some(builder) = entry.as_mut() {
                        for attr in start.attributes().flatten() {
                            if attr.key.as_ref().ends_with(b"Ccy") {
                                builder.currency =
                                    Some(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                }
                path.push(name);
            }
            Event::End(end) => {
                let name = local_name(end.name().as_ref());
                if name == "Ntry" {
                    if let Some(builder) = entry.take() {
                        match builder.finish(&account_iban) {
                            Some(row) => rows.push(row),
                            None => skipped += 1,
                        }
                    }
                }
                path.pop();
            }
            Event::Text(text) => {
                let value = text.unescape()?.trim().to_string();
                if value.is_empty() {
                    buf.clear();
                    continue;
                }
                let Some(builder) = entry.as_mut() else {
                    if path_ends_with(&path, &["Acct", "Id", "IBAN"]) {
                        account_iban = Some(value);
                    }
                    buf.clear();
                    continue;
                };
                if path_ends_with(&path, &["BookgDt", "Dt"])
                    || path_ends_with(&path, &["BookgDt", "DtTm"])
                {
                    builder.booking_date = parse_iso_date(&value);
                } else if path_ends_with(&path, &["ValDt", "Dt"])
                    || path_ends_with(&path, &["ValDt", "DtTm"])
                {
                    builder.value_date = parse_iso_date(&value);
                } else if (path_ends_with(&path, &["Ntry", "Amt"])
                    || path_ends_with(&path, &["TxDtls", "Amt"]))
                    && builder.amount_cents.is_none()
                {
                    builder.amount_cents = parse_xml_amount(&value);
                } else if path_ends_with(&path, &["Ntry", "CdtDbtInd"]) {
                    builder.debit = value.eq_ignore_ascii_case("DBIT");
                } else if path_ends_with(&path, &["RmtInf", "Ustrd"]) {
                    builder.purpose.push(value);
                } else if path_ends_with(&path, &["Refs", "EndToEndId"]) {
                    if builder.end_to_end_id.is_none() && value != "NOTPROVIDED" {
                        builder.end_to_end_id = Some(value);
                    }
                } else if path_ends_with(&path, &["Cdtr", "Nm"]) {
                    builder.creditor_name.get_or_insert(value);
                } else if path_ends_with(&path, &["Dbtr", "Nm"]) {
                    builder.debtor_name.get_or_insert(value);
                } else if path_ends_with(&path, &["CdtrAcct", "Id", "IBAN"]) {
                    builder.creditor_iban.get_or_insert(value);
                } else if path_ends_with(&path, &["DbtrAcct", "Id", "IBAN"]) {
                    builder.debtor_iban.get_or_insert(value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if rows.is_empty() {
        return Err(ParseError::NoValidRows {
            hints: default_hints(),
            candidates: vec![ProfileCandidate {
                profile_id: "camt053".to_string(),
                confidence: 1.0,
            }],
        });
    }

    let mut warnings = Vec::new();
    if skipped > 0 {
        warnings.push(format!(
            "{skipped} Einträge ohne Datum oder Betrag übersprungen"
        ));
    }

    Ok(ParseReport {
        profile_id: "camt053".to_string(),
        confidence: 1.0,
        rows,
        warnings,
        candidates: vec![ProfileCandidate {
            profile_id: "camt053".to_string(),
            confidence: 1.0,
        }],
        opening_balance_cents: None,
        closing_balance_cents: None,
    })
}
