use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Sign of the money movement from the account holder's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Positive amounts (including zero) are inflows.
    pub fn from_amount(amount_cents: i64) -> Self {
        if amount_cents >= 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Which ingestion path produced a transaction. Reconciliation segregates
/// PayPal-sourced rows from everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxSource {
    CsvBank,
    CsvPaypal,
    Camt,
}

impl TxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxSource::CsvBank => "csv_bank",
            TxSource::CsvPaypal => "csv_paypal",
            TxSource::Camt => "camt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv_bank" => Some(TxSource::CsvBank),
            "csv_paypal" => Some(TxSource::CsvPaypal),
            "camt" => Some(TxSource::Camt),
            _ => None,
        }
    }
}

/// Canonical transaction as produced by a bank profile, before categorization.
///
/// `direction` always agrees with the sign of `amount_cents`; use
/// [`ParsedRow::new`] to keep that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRow {
    pub booking_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    /// Signed minor units; positive = inflow.
    pub amount_cents: i64,
    /// ISO 4217, upper-cased.
    pub currency: String,
    pub direction: Direction,
    pub source: TxSource,
    pub account_id: String,
    pub account_iban: Option<String>,
    pub counterparty: Option<String>,
    pub counterparty_iban: Option<String>,
    pub mcc: Option<String>,
    pub reference: Option<String>,
    /// Export-assigned transaction code, when the source carries one.
    pub external_id: Option<String>,
    /// Free-text purpose joined from the descriptive columns.
    pub raw_text: String,
    /// Original record, retained verbatim for audit and debugging.
    pub raw: BTreeMap<String, String>,
}

impl ParsedRow {
    pub fn new(booking_date: NaiveDate, amount_cents: i64) -> Self {
        ParsedRow {
            booking_date,
            value_date: None,
            amount_cents,
            currency: "EUR".to_string(),
            direction: Direction::from_amount(amount_cents),
            source: TxSource::CsvBank,
            account_id: "bank:unknown".to_string(),
            account_iban: None,
            counterparty: None,
            counterparty_iban: None,
            mcc: None,
            reference: None,
            external_id: None,
            raw_text: String::new(),
            raw: BTreeMap::new(),
        }
    }

    pub fn value_date_or_booking(&self) -> NaiveDate {
        self.value_date.unwrap_or(self.booking_date)
    }
}

/// Where a category assignment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    Rule,
    User,
    Unknown,
}

impl CategorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategorySource::Rule => "rule",
            CategorySource::User => "user",
            CategorySource::Unknown => "unknown",
        }
    }
}

/// A [`ParsedRow`] with its category assignment attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedTransaction {
    #[serde(flatten)]
    pub row: ParsedRow,
    pub category: String,
    /// In [0, 1].
    pub category_confidence: f64,
    pub category_source: CategorySource,
    /// Rule or pattern id recorded for audit.
    pub category_rule_id: Option<String>,
    pub merchant: Option<String>,
    /// Fully normalized description the engine matched against.
    pub normalized_description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    InternalTransfer,
}

/// Append-only link between the two recordings of one real-world transfer.
/// `from_tx_id` is the outflow side. A transaction participates in at most
/// one link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLink {
    pub id: String,
    pub from_tx_id: String,
    pub to_tx_id: String,
    pub kind: LinkKind,
    pub score: f64,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A profile's confidence for a given input, reported on success and failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCandidate {
    pub profile_id: String,
    pub confidence: f64,
}

/// Successful parse of one statement file.
#[derive(Debug, Clone)]
pub struct ParseReport {
    pub profile_id: String,
    pub confidence: f64,
    pub rows: Vec<ParsedRow>,
    /// Per-row mapping problems, 1-based over the physical file.
    pub warnings: Vec<String>,
    pub candidates: Vec<ProfileCandidate>,
    pub opening_balance_cents: Option<i64>,
    pub closing_balance_cents: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn direction_follows_amount_sign() {
        assert_eq!(Direction::from_amount(100), Direction::In);
        assert_eq!(Direction::from_amount(0), Direction::In);
        assert_eq!(Direction::from_amount(-1), Direction::Out);
    }

    #[test]
    fn new_row_keeps_direction_invariant() {
        let row = ParsedRow::new(date(2025, 3, 1), -6699);
        assert_eq!(row.direction, Direction::Out);
        assert_eq!(row.currency, "EUR");
    }

    #[test]
    fn value_date_falls_back_to_booking() {
        let mut row = ParsedRow::new(date(2025, 3, 1), 100);
        assert_eq!(row.value_date_or_booking(), date(2025, 3, 1));
        row.value_date = Some(date(2025, 3, 3));
        assert_eq!(row.value_date_or_booking(), date(2025, 3, 3));
    }

    #[test]
    fn tx_source_round_trips() {
        for src in [TxSource::CsvBank, TxSource::CsvPaypal, TxSource::Camt] {
            assert_eq!(TxSource::parse(src.as_str()), Some(src));
        }
        assert_eq!(TxSource::parse("ofx"), None);
    }
}
