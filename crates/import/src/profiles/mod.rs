use std::collections::BTreeMap;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use kontoflow_core::ParsedRow;

use crate::error::RowError;

mod comdirect;
mod dkb;
mod generic_de;
mod ing;
mod sparkasse;

pub use comdirect::Comdirect;
pub use dkb::Dkb;
pub use generic_de::GenericDe;
pub use ing::Ing;
pub use sparkasse::Sparkasse;

/// One data row keyed by its header cells, in column order. Column order is
/// preserved so that candidate lookups are deterministic when several headers
/// contain the same keyword.
#[derive(Debug, Clone)]
pub struct Record {
    entries: Vec<(String, String)>,
}

impl Record {
    pub fn from_headers(headers: &[String], row: &[String]) -> Self {
        let entries = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let value = row.get(idx).cloned().unwrap_or_default();
                (header.clone(), value)
            })
            .collect();
        Record { entries }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A fixed statement layout for one bank: a confidence score over headers and
/// sample rows, and a mapping from one record to the canonical row.
///
/// Profiles are immutable and registered once in [`registry`]; evaluation
/// order only matters as the tie-break when scores are equal.
pub trait BankProfile: Send + Sync {
    fn id(&self) -> &'static str;
    /// Confidence in [0, 1] that this profile fits the given headers.
    fn matches(&self, headers: &[String], sample_rows: &[Vec<String>]) -> f64;
    fn map_row(&self, record: &Record) -> Result<ParsedRow, RowError>;
}

static REGISTRY: [&(dyn BankProfile); 5] = [&Comdirect, &Sparkasse, &Dkb, &Ing, &GenericDe];

pub fn registry() -> &'static [&'static dyn BankProfile] {
    &REGISTRY
}

/// Lower-cases, trims surrounding quotes, folds German umlauts to their
/// ASCII digraphs and collapses inner whitespace, so "Begünstigter" and
/// "beguenstigter" compare equal regardless of export encoding.
pub(crate) fn normalize_header(value: &str) -> String {
    let lowered = value.trim_matches('"').trim().to_lowercase();
    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        match c {
            'ä' => folded.push_str("ae"),
            'ö' => folded.push_str("oe"),
            'ü' => folded.push_str("ue"),
            'ß' => folded.push_str("ss"),
            _ => folded.push(c),
        }
    }
    folded
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Value of the first column whose normalized header equals a candidate.
pub(crate) fn value_for<'a>(record: &'a Record, candidates: &[&str]) -> &'a str {
    for candidate in candidates {
        let target = normalize_header(candidate);
        if let Some((_, value)) = record
            .entries
            .iter()
            .find(|(key, _)| normalize_header(key) == target)
        {
            return value;
        }
    }
    ""
}

/// Value of the first column whose normalized header contains a candidate.
/// Tolerates minor header spelling drift between export versions.
pub(crate) fn value_by_includes<'a>(record: &'a Record, candidates: &[&str]) -> &'a str {
    for candidate in candidates {
        let target = normalize_header(candidate);
        if let Some((_, value)) = record
            .entries
            .iter()
            .find(|(key, _)| normalize_header(key).contains(&target))
        {
            return value;
        }
    }
    ""
}

/// Fraction of expected keywords present in the headers.
pub(crate) fn header_score(headers: &[String], keywords: &[&str]) -> f64 {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let hits = keywords
        .iter()
        .filter(|kw| normalized.iter().any(|h| h.contains(*kw)))
        .count();
    hits as f64 / keywords.len().max(1) as f64
}

/// Joins the descriptive columns into the audit text; falls back to every
/// non-empty cell when none of the preferred fields exist.
pub(crate) fn build_raw_text(record: &Record, fields: &[&str]) -> String {
    let parts: Vec<&str> = fields
        .iter()
        .map(|field| value_for(record, &[field]))
        .filter(|value| !value.trim().is_empty())
        .collect();
    if !parts.is_empty() {
        return parts.join(" | ");
    }
    record
        .entries
        .iter()
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Fraction of the first three sample rows whose date and amount cells parse
/// under this profile's column candidates.
pub(crate) fn sample_parse_score(
    headers: &[String],
    sample_rows: &[Vec<String>],
    amount_candidates: &[&str],
    date_candidates: &[&str],
) -> f64 {
    let sample = &sample_rows[..sample_rows.len().min(3)];
    if sample.is_empty() {
        return 0.0;
    }
    let hits = sample
        .iter()
        .filter(|row| {
            let record = Record::from_headers(headers, row);
            let amount = value_by_includes(&record, amount_candidates);
            let date = value_by_includes(&record, date_candidates);
            kontoflow_core::parse_euro_amount(amount).is_ok()
                && kontoflow_core::parse_flexible_date(date).is_ok()
        })
        .count();
    hits as f64 / sample.len() as f64
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
