use std::sync::LazyLock;

use regex::Regex;

use kontoflow_core::{is_likely_date, parse_euro_amount};

use crate::profiles::{normalize_header, registry};

/// Statement preambles German banks prepend before the actual table: title
/// rows and running-balance rows.
static PREAMBLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)umsätze\s+girokonto",
        r"(?i)umsaetze\s+girokonto",
        r"(?i)neuer\s+kontostand",
        r"(?i)alter\s+kontostand",
        r"(?i)kontostand\s+nach",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const HEADER_SCAN_LIMIT: usize = 30;

/// Infers the field delimiter by counting `;`, `,` and tab over the first ten
/// non-blank lines. German exports predominate, so `;` wins ties.
pub fn sniff_delimiter(text: &str) -> u8 {
    let mut semicolons = 0usize;
    let mut commas = 0usize;
    let mut tabs = 0usize;

    for line in text.lines().filter(|l| !l.trim().is_empty()).take(10) {
        semicolons += line.matches(';').count();
        commas += line.matches(',').count();
        tabs += line.matches('\t').count();
    }

    if semicolons >= commas && semicolons >= tabs {
        b';'
    } else if commas >= tabs {
        b','
    } else {
        b'\t'
    }
}

pub fn is_preamble_row(cells: &[String]) -> bool {
    let joined = cells
        .iter()
        .map(|c| c.trim())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.trim().is_empty() {
        return true;
    }
    PREAMBLE_PATTERNS.iter().any(|p| p.is_match(&joined))
}

/// Locates the header row: among the first thirty non-blank, non-preamble
/// rows, the one the profile registry scores highest; the first such row when
/// no profile recognizes anything.
pub fn find_header_row(rows: &[Vec<String>]) -> Option<(usize, Vec<String>)> {
    let mut best: Option<(usize, f64)> = None;
    let mut fallback: Option<usize> = None;
    let mut scanned = 0usize;

    for (idx, row) in rows.iter().enumerate() {
        let trimmed: Vec<String> = row.iter().map(|c| c.trim().to_string()).collect();
        if trimmed.iter().all(|c| c.is_empty()) {
            continue;
        }
        scanned += 1;
        if scanned > HEADER_SCAN_LIMIT {
            break;
        }
        if is_preamble_row(&trimmed) {
            continue;
        }
        if fallback.is_none() {
            fallback = Some(idx);
        }

        let score = registry()
            .iter()
            .map(|p| p.matches(&trimmed, &[]))
            .fold(0.0f64, f64::max);
        if score > best.map(|(_, s)| s).unwrap_or(0.0) {
            best = Some((idx, score));
        }
    }

    let index = best.map(|(i, _)| i).or(fallback)?;
    Some((
        index,
        rows[index].iter().map(|c| c.trim().to_string()).collect(),
    ))
}

/// Pulls opening/closing balances out of "Alter Kontostand" / "Neuer
/// Kontostand" rows. Display-only; never inserted as transactions.
pub fn extract_balances(rows: &[Vec<String>]) -> (Option<i64>, Option<i64>) {
    let mut opening = None;
    let mut closing = None;

    for row in rows {
        if row.len() < 2 {
            continue;
        }
        let label = row[0].trim().to_lowercase();
        if label.is_empty() {
            continue;
        }
        let Some(amount_cell) = row[1..].iter().find(|c| !c.trim().is_empty()) else {
            continue;
        };
        let Ok(cents) = parse_euro_amount(amount_cell) else {
            continue;
        };
        if label.starts_with("alter kontostand") && opening.is_none() {
            opening = Some(cents);
        } else if label.starts_with("neuer kontostand") && closing.is_none() {
            closing = Some(cents);
        }
    }

    (opening, closing)
}

/// Filters the rows after the header down to plausible bookings, keeping each
/// row's index into the original record list for line-number reporting.
/// Preamble rows and rows whose date column does not look like a date
/// (running balances inside the table body) are dropped.
pub fn clean_data_rows(
    headers: &[String],
    rows: &[Vec<String>],
    offset: usize,
) -> Vec<(usize, Vec<String>)> {
    let date_column = headers.iter().position(|h| {
        let norm = normalize_header(h);
        norm.contains("buchung") || norm.contains("datum") || norm.contains("date")
    });

    let mut cleaned = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let trimmed: Vec<String> = row.iter().map(|c| c.trim().to_string()).collect();
        if trimmed.iter().all(|c| c.is_empty()) {
            continue;
        }
        if is_preamble_row(&trimmed) {
            continue;
        }
        if let Some(col) = date_column {
            let candidate = trimmed.get(col).map(String::as_str).unwrap_or("");
            if !is_likely_date(candidate) {
                continue;
            }
        }
        cleaned.push((offset + idx, trimmed));
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn semicolon_wins_ties() {
        assert_eq!(sniff_delimiter("a;b;c\nd;e;f\n"), b';');
        assert_eq!(sniff_delimiter("a;b\nc,d\n"), b';');
    }

    #[test]
    fn comma_and_tab_detection() {
        assert_eq!(sniff_delimiter("a,b,c\nd,e,f\n"), b',');
        assert_eq!(sniff_delimiter("a\tb\tc\n"), b'\t');
    }

    #[test]
    fn preamble_rows_are_recognized() {
        assert!(is_preamble_row(&cells(&["Umsätze Girokonto", "", ""])));
        assert!(is_preamble_row(&cells(&["Neuer Kontostand", "1.234,56 EUR"])));
        assert!(is_preamble_row(&cells(&["", "", ""])));
        assert!(!is_preamble_row(&cells(&["Buchungstag", "Betrag"])));
    }

    #[test]
    fn header_found_behind_preamble() {
        let rows = vec![
            cells(&["Umsätze Girokonto", "", "", "", ""]),
            cells(&["Neuer Kontostand", "1.000,00", "", "", ""]),
            cells(&["Buchungstag", "Wertstellung", "Buchungstext", "Umsatz in EUR", ""]),
            cells(&["01.03.2025", "01.03.2025", "GEHALT", "3.000,00", ""]),
        ];
        let (idx, headers) = find_header_row(&rows).unwrap();
        assert_eq!(idx, 2);
        assert_eq!(headers[0], "Buchungstag");
    }

    #[test]
    fn header_fallback_is_first_plain_row() {
        let rows = vec![cells(&["", ""]), cells(&["colA", "colB"]), cells(&["1", "2"])];
        let (idx, _) = find_header_row(&rows).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn balances_extracted_from_preamble() {
        let rows = vec![
            cells(&["Alter Kontostand", "1.000,00 EUR"]),
            cells(&["Buchungstag", "Betrag"]),
            cells(&["Neuer Kontostand", "", "1.234,56 EUR"]),
        ];
        let (opening, closing) = extract_balances(&rows);
        assert_eq!(opening, Some(100000));
        assert_eq!(closing, Some(123456));
    }

    #[test]
    fn clean_rows_drops_non_date_body_rows() {
        let headers = cells(&["Buchungstag", "Buchungstext", "Umsatz in EUR"]);
        let rows = vec![
            cells(&["01.03.2025", "GEHALT", "3.000,00"]),
            cells(&["Kontostand nach Buchung", "", "3.500,00"]),
            cells(&["", "", ""]),
            cells(&["02.03.2025", "MIETE", "-850,00"]),
        ];
        let cleaned = clean_data_rows(&headers, &rows, 3);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].0, 3);
        assert_eq!(cleaned[1].0, 6);
    }
}
