use tracing::debug;

use kontoflow_core::{ParseReport, ParsedRow, ProfileCandidate};

use crate::auto_adapter::{build_heuristic_adapter, MIN_COVERAGE};
use crate::error::{default_hints, ParseError, RowError};
use crate::profiles::{normalize_header, registry, BankProfile, Record};
use crate::{camt, decode, dialect, paypal};

/// Best profile score below this is treated as "format not recognized" and
/// handed to the heuristic adapter.
pub const MIN_PROFILE_CONFIDENCE: f64 = 0.55;

/// Parses one statement file of any supported kind: camt.053 XML, a PayPal
/// activity export, or a German bank CSV. The format gates run in that order
/// so that quoting quirks in PayPal exports never reach the generic CSV path.
///
/// `hinted_bank` lifts the named profile to at least 0.8 confidence; the
/// actual mapping still runs through profile selection so a wrong hint cannot
/// force an unparseable layout.
pub fn parse_statement(bytes: &[u8], hinted_bank: Option<&str>) -> Result<ParseReport, ParseError> {
    let (text, encoding) = decode::decode_bytes(bytes)?;
    debug!(?encoding, "decoded statement input");

    if camt::is_camt_xml(&text) {
        return camt::parse_camt053(&text);
    }
    if paypal::is_paypal_csv(&text) {
        return paypal::parse_paypal_csv(&text);
    }

    let delimiter = dialect::sniff_delimiter(&text);
    let rows = read_records(&text, delimiter)?;
    if rows.is_empty() {
        return Err(ParseError::Empty);
    }

    let (header_index, headers) = dialect::find_header_row(&rows).ok_or(ParseError::NoHeader {
        hints: default_hints(),
    })?;
    let (opening_balance_cents, closing_balance_cents) = dialect::extract_balances(&rows);

    let cleaned = dialect::clean_data_rows(&headers, &rows[header_index + 1..], header_index + 1);
    if cleaned.is_empty() {
        return Err(ParseError::NoValidRows {
            hints: default_hints(),
            candidates: Vec::new(),
        });
    }

    let sample: Vec<Vec<String>> = cleaned.iter().take(5).map(|(_, row)| row.clone()).collect();
    let mut candidates: Vec<ProfileCandidate> = registry()
        .iter()
        .map(|profile| ProfileCandidate {
            profile_id: profile.id().to_string(),
            confidence: profile.matches(&headers, &sample),
        })
        .collect();

    if let Some(hint) = hinted_bank {
        let target = normalize_header(hint);
        if let Some(hinted) = candidates
            .iter_mut()
            .find(|c| normalize_header(&c.profile_id) == target)
        {
            hinted.confidence = hinted.confidence.max(0.8);
        }
    }
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let best = &candidates[0];
    debug!(profile = %best.profile_id, confidence = best.confidence, "profile selection");

    if best.confidence < MIN_PROFILE_CONFIDENCE {
        return parse_with_adapter(&headers, &cleaned, candidates, opening_balance_cents, closing_balance_cents);
    }

    let profile = registry()
        .iter()
        .copied()
        .find(|p| p.id() == best.profile_id)
        .ok_or(ParseError::UnsupportedFormat {
            hints: default_hints(),
            candidates: candidates.clone(),
        })?;

    let mut warnings = Vec::new();
    let rows = map_rows(&cleaned, &headers, &mut warnings, |record| {
        profile.map_row(record)
    });
    if rows.is_empty() {
        return Err(ParseError::NoValidRows {
            hints: default_hints(),
            candidates,
        });
    }

    Ok(ParseReport {
        profile_id: profile.id().to_string(),
        confidence: candidates[0].confidence,
        rows,
        warnings,
        candidates,
        opening_balance_cents,
        closing_balance_cents,
    })
}

/// Fallback for layouts no fixed profile claims: infer a column mapping from
/// the headers alone and require at least half the core fields.
fn parse_with_adapter(
    headers: &[String],
    cleaned: &[(usize, Vec<String>)],
    mut candidates: Vec<ProfileCandidate>,
    opening_balance_cents: Option<i64>,
    closing_balance_cents: Option<i64>,
) -> Result<ParseReport, ParseError> {
    let sample = Record::from_headers(headers, &cleaned[0].1);
    let (adapter, coverage, reasons) = build_heuristic_adapter(headers, &sample);
    debug!(coverage, ?reasons, "heuristic adapter");

    candidates.push(ProfileCandidate {
        profile_id: "auto_csv_v1".to_string(),
        confidence: coverage,
    });

    let Some(adapter) = adapter.filter(|_| coverage >= MIN_COVERAGE) else {
        return Err(ParseError::UnsupportedFormat {
            hints: default_hints(),
            candidates,
        });
    };

    let mut warnings = Vec::new();
    let rows = map_rows(cleaned, headers, &mut warnings, |record| {
        adapter.map_row(record)
    });
    if rows.is_empty() {
        return Err(ParseError::NoValidRows {
            hints: default_hints(),
            candidates,
        });
    }

    Ok(ParseReport {
        profile_id: "auto_csv_v1".to_string(),
        confidence: coverage,
        rows,
        warnings,
        candidates,
        opening_balance_cents,
        closing_balance_cents,
    })
}

fn map_rows<F>(
    cleaned: &[(usize, Vec<String>)],
    headers: &[String],
    warnings: &mut Vec<String>,
    mut map: F,
) -> Vec<ParsedRow>
where
    F: FnMut(&Record) -> Result<ParsedRow, RowError>,
{
    let mut rows = Vec::with_capacity(cleaned.len());
    for (record_index, cells) in cleaned {
        let record = Record::from_headers(headers, cells);
        match map(&record) {
            Ok(row) => rows.push(row),
            Err(err) => warnings.push(format!("Zeile {}: {err}", record_index + 1)),
        }
    }
    rows
}

fn read_records(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }
    Ok(rows)
}
