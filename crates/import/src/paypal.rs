use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use unicode_normalization::UnicodeNormalization;

use kontoflow_core::{
    parse_flexible_date, ParseReport, ParsedRow, ProfileCandidate, TxSource,
};

use crate::error::{default_hints, ParseError};
use crate::profiles::{non_empty, value_for, Record};

/// Header tokens every official German PayPal activity export carries.
const REQUIRED_HEADER_TOKENS: [&str; 12] = [
    "datum",
    "uhrzeit",
    "zeitzone",
    "name",
    "typ",
    "status",
    "währung",
    "brutto",
    "gebühr",
    "netto",
    "transaktionscode",
    "auswirkungaufguthaben",
];

/// Statuses that mark a row as not (or not yet) settled.
const SKIP_STATUSES: [&str; 12] = [
    "",
    "ausstehend",
    "pending",
    "offen",
    "storniert",
    "storno",
    "cancelled",
    "canceled",
    "entfernt",
    "zurückgerufen",
    "zurueckgerufen",
    "abgelehnt",
];

fn ascii_fold(value: &str) -> String {
    value
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect()
}

fn normalize_header_line(line: &str) -> String {
    line.replace('\u{feff}', "")
        .replace('"', "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// True when one of the first thirty non-blank lines carries all twelve
/// PayPal header tokens, comparing accent-folded as a fallback so that
/// mis-decoded exports are still recognized.
pub fn is_paypal_csv(text: &str) -> bool {
    for line in text.lines().filter(|l| !l.trim().is_empty()).take(30) {
        let norm = normalize_header_line(line);
        if !norm.contains("datum") || !norm.contains("status") || !norm.contains("transaktionscode")
        {
            continue;
        }
        let folded = ascii_fold(&norm);
        let all_present = REQUIRED_HEADER_TOKENS.iter().all(|token| {
            norm.contains(token) || folded.contains(&ascii_fold(token))
        });
        if all_present {
            return true;
        }
    }
    false
}

/// Money parsing for PayPal exports, which mix German and English number
/// formats depending on the account locale. Empty or unparseable cells
/// count as zero, matching the fallback amount arithmetic.
fn money_or_zero(raw: &str) -> i64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '"' && *c != '\'')
        .collect();
    if cleaned.is_empty() {
        return 0;
    }
    let negative = cleaned.starts_with('-') || (cleaned.contains('(') && cleaned.contains(')'));
    let digits: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.'))
        .collect();

    let last_comma = digits.rfind(',');
    let last_dot = digits.rfind('.');
    let normalized = if last_comma > last_dot {
        digits.replace('.', "").replace(',', ".")
    } else {
        digits.replace(',', "")
    };

    let Ok(value) = normalized.parse::<Decimal>() else {
        return 0;
    };
    let Some(cents) = (value.abs() * Decimal::from(100)).round().to_i64() else {
        return 0;
    };
    if negative {
        -cents
    } else {
        cents
    }
}

fn map_record(record: &Record) -> Option<ParsedRow> {
    let status = value_for(record, &["Status", "Status der Zahlung"])
        .trim()
        .to_lowercase();
    if SKIP_STATUSES.contains(&status.as_str()) {
        return None;
    }

    let impact = value_for(record, &["Auswirkung auf Guthaben", "Balance Impact"])
        .trim()
        .to_lowercase();
    if (impact.contains("kein") && impact.contains("auswirkung"))
        || (impact.contains("no") && impact.contains("impact"))
    {
        return None;
    }

    let date_raw = value_for(record, &["Datum", "Date", "Datum und Uhrzeit"]).trim();
    let booking_date = parse_flexible_date(date_raw).ok()?;

    let mut amount_cents = money_or_zero(value_for(record, &["Netto", "Net"]));
    if amount_cents == 0 {
        let gross = money_or_zero(value_for(record, &["Brutto", "Gross"]));
        let fee = money_or_zero(value_for(record, &["Gebühr", "Fee"]));
        if gross != 0 || fee != 0 {
            amount_cents = gross - fee;
        }
    }
    if amount_cents == 0 {
        return None;
    }

    let external_id = non_empty(value_for(
        record,
        &["Transaktionscode", "Transaktions-ID", "Transaction ID"],
    ))?;
    let related_id = non_empty(value_for(
        record,
        &[
            "Zugehöriger Transaktionscode",
            "Referenztransaktionscode",
            "Reference Txn ID",
        ],
    ));

    let tx_type = value_for(record, &["Typ", "Art", "Type"]).trim();
    let name = value_for(record, &["Name"]).trim();
    let subject = value_for(record, &["Betreff", "Subject"]).trim();
    let note = value_for(record, &["Hinweis", "Note"]).trim();
    let parts: Vec<&str> = [tx_type, name, subject, note]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();

    let mut row = ParsedRow::new(booking_date, amount_cents);
    row.value_date = Some(booking_date);
    row.source = TxSource::CsvPaypal;
    row.account_id = "paypal:wallet".to_string();
    if let Some(currency) = non_empty(value_for(record, &["Währung", "Currency"])) {
        row.currency = currency.to_uppercase();
    }
    row.counterparty = non_empty(name);
    row.external_id = Some(external_id);
    row.reference = related_id;
    row.raw_text = if parts.is_empty() {
        "PayPal".to_string()
    } else {
        parts.join(" ")
    };
    row.raw = record.to_map();
    Some(row)
}

/// Parses an already-decoded PayPal activity export. Callers gate on
/// [`is_paypal_csv`] first; the error here means the export had a PayPal
/// header but no settled bookings.
pub fn parse_paypal_csv(text: &str) -> Result<ParseReport, ParseError> {
    let delimiter = pick_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_matches('"').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut balances = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        let record = Record::from_headers(&headers, &cells);

        let balance_raw = value_for(&record, &["Guthaben", "Balance"]).trim();
        if !balance_raw.is_empty() {
            balances.push(money_or_zero(balance_raw));
        }

        if let Some(row) = map_record(&record) {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(ParseError::NoValidRows {
            hints: default_hints(),
            candidates: vec![ProfileCandidate { profile_id: "paypal".to_string(), confidence: 1.0 }],
        });
    }

    let closing_balance_cents = balances.last().copied();
    let opening_balance_cents = if balances.len() > 1 {
        balances.first().copied()
    } else {
        None
    };

    Ok(ParseReport {
        profile_id: "paypal".to_string(),
        confidence: 1.0,
        rows,
        warnings: Vec::new(),
        candidates: vec![ProfileCandidate { profile_id: "paypal".to_string(), confidence: 1.0 }],
        opening_balance_cents,
        closing_balance_cents,
    })
}

/// PayPal exports come comma-separated by default; older German downloads
/// use semicolons. Decide from the header line.
fn pick_delimiter(text: &str) -> u8 {
    let Some(header) = text.lines().find(|l| !l.trim().is_empty()) else {
        return b',';
    };
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}
