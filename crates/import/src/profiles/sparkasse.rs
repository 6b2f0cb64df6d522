use kontoflow_core::{parse_euro_amount, parse_flexible_date, ParsedRow};

use super::{
    build_raw_text, header_score, non_empty, normalize_header, sample_parse_score,
    value_by_includes, value_for, BankProfile, Record,
};
use crate::error::RowError;

const HEADER_KEYWORDS: [&str; 9] = [
    "buchungstag",
    "betrag",
    "verwendungszweck",
    "auftraggeber",
    "wertstellung",
    "valutadatum",
    "beguenstigter",
    "zahlungspflichtiger",
    "buchungstext",
];

pub struct Sparkasse;

impl BankProfile for Sparkasse {
    fn id(&self) -> &'static str {
        "sparkasse"
    }

    fn matches(&self, headers: &[String], sample_rows: &[Vec<String>]) -> f64 {
        let header_weight = header_score(headers, &HEADER_KEYWORDS);
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        // A combined counterparty column next to a currency column is the
        // layout signature Sparkasse exports carry and the other banks do not.
        let has_signature = normalized.iter().any(|h| {
            h.contains("auftraggeber/beg") || h.contains("beguenstigter/zahlungspflichtiger")
        }) && normalized.iter().any(|h| h == "waehrung");
        let sample = sample_parse_score(
            headers,
            sample_rows,
            &["betrag", "umsatz", "soll", "haben", "betrag (eur)", "betrag eur"],
            &["buchungstag", "datum"],
        );
        let base = (header_weight * 0.6 + sample * 0.4).min(1.0);
        let bonus = if has_signature { 0.15 } else { 0.0 };
        (base + bonus).min(1.0)
    }

    fn map_row(&self, record: &Record) -> Result<ParsedRow, RowError> {
        let booking_raw = value_by_includes(record, &["buchungstag", "datum", "buchungsdatum"]);
        if booking_raw.trim().is_empty() {
            return Err(RowError::MissingField("booking date"));
        }
        let booking_date = parse_flexible_date(booking_raw)?;

        let amount_raw = non_empty(value_by_includes(
            record,
            &["betrag (eur)", "betrag eur", "umsatz in eur", "umsatz", "betrag"],
        ))
        .or_else(|| signed_amount_from_soll_haben(record))
        .ok_or(RowError::MissingField("amount"))?;
        let amount_cents = parse_euro_amount(&amount_raw)?;

        let mut row = ParsedRow::new(booking_date, amount_cents);
        let valuta_raw = value_by_includes(
            record,
            &["wertstellung", "valutadatum", "valuta", "wertstellung (valuta)"],
        );
        row.value_date = Some(match non_empty(valuta_raw) {
            Some(v) => parse_flexible_date(&v)?,
            None => booking_date,
        });

        row.counterparty = non_empty(value_by_includes(
            record,
            &[
                "auftraggeber",
                "empfaenger",
                "beguenstigter",
                "zahlungspflichtiger",
                "auftraggeber/empfaenger",
                "beguenstigter/zahlungspflichtiger",
            ],
        ))
        .or_else(|| {
            non_empty(value_for(
                record,
                &["Name", "Empfänger", "Begünstigter/Zahlungspflichtiger", "Auftraggeber/Empfänger"],
            ))
        });
        row.counterparty_iban = non_empty(value_by_includes(record, &["iban", "kontonummer"]));
        row.reference = non_empty(value_by_includes(
            record,
            &["verwendungszweck", "buchungstext", "vorgang"],
        ))
        .or_else(|| non_empty(value_for(record, &["Beschreibung"])));

        row.raw_text = build_raw_text(
            record,
            &[
                "Buchungstext",
                "Verwendungszweck",
                "Begünstigter/Zahlungspflichtiger",
                "Auftraggeber/Empfänger",
                "Vorgang",
                "Beschreibung",
            ],
        );

        let currency = non_empty(value_by_includes(record, &["waehrung", "währung", "currency"]));
        if let Some(currency) = currency {
            row.currency = currency.to_uppercase();
        }

        row.raw = record.to_map();
        Ok(row)
    }
}

/// Some Sparkasse variants split the amount into Soll/Haben columns; Soll is
/// the debit side and becomes negative.
fn signed_amount_from_soll_haben(record: &Record) -> Option<String> {
    if let Some(soll) = non_empty(value_by_includes(record, &["soll"])) {
        return Some(format!("-{soll}"));
    }
    non_empty(value_by_includes(record, &["haben"]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        [
            "Auftragskonto",
            "Buchungstag",
            "Valutadatum",
            "Buchungstext",
            "Verwendungszweck",
            "Begünstigter/Zahlungspflichtiger",
            "Kontonummer/IBAN",
            "Betrag",
            "Währung",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn signature_bonus_applies() {
        let mut plain_headers = headers();
        // Split counterparty column: no Sparkasse layout signature.
        plain_headers[5] = "Name".to_string();
        let sample = vec![row(&["DE00", "01.03.2025", "01.03.2025", "KARTENZAHLUNG", "EDEKA", "EDEKA", "DE99", "-12,34", "EUR"])];
        let plain = Sparkasse.matches(&plain_headers, &sample);
        let boosted = Sparkasse.matches(&headers(), &sample);
        assert!(boosted > plain, "{boosted} vs {plain}");
    }

    #[test]
    fn outscores_catch_all_on_own_layout() {
        let sample = vec![row(&["DE00", "01.03.2025", "01.03.2025", "KARTENZAHLUNG", "EDEKA", "EDEKA", "DE99", "-12,34", "EUR"])];
        let sparkasse = Sparkasse.matches(&headers(), &sample);
        let generic = super::super::GenericDe.matches(&headers(), &sample);
        assert!(sparkasse > generic, "sparkasse {sparkasse} vs generic {generic}");
    }

    #[test]
    fn maps_soll_haben_split() {
        let h: Vec<String> = ["Buchungstag", "Verwendungszweck", "Soll", "Haben"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let record = Record::from_headers(&h, &row(&["01.03.2025", "Miete", "850,00", ""]));
        let parsed = Sparkasse.map_row(&record).unwrap();
        assert_eq!(parsed.amount_cents, -85000);

        let record = Record::from_headers(&h, &row(&["01.03.2025", "Gutschrift", "", "100,00"]));
        assert_eq!(Sparkasse.map_row(&record).unwrap().amount_cents, 10000);
    }

    #[test]
    fn currency_column_is_respected() {
        let record = Record::from_headers(
            &headers(),
            &row(&["DE00", "01.03.2025", "01.03.2025", "KARTENZAHLUNG", "Einkauf", "EDEKA", "DE99", "-12,34", "chf"]),
        );
        let parsed = Sparkasse.map_row(&record).unwrap();
        assert_eq!(parsed.currency, "CHF");
        assert_eq!(parsed.counterparty.as_deref(), Some("EDEKA"));
    }
}
