use kontoflow_core::ProfileCandidate;
use thiserror::Error;

use crate::decode::DecodeError;

/// Remediation suggestions attached to every user-facing parse failure.
pub fn default_hints() -> Vec<String> {
    vec![
        "Prüfe Kopfzeile: enthält sie \"Buchungstag\" und \"Betrag\"?".to_string(),
        "Prüfe Trennzeichen (; vs ,) und Dezimalformat (1.234,56).".to_string(),
        "CSV als UTF-8 oder ISO-8859-1 (Latin-1) speichern.".to_string(),
    ]
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Leere Datei")]
    Empty,
    #[error("Kein Tabellenkopf erkannt")]
    NoHeader { hints: Vec<String> },
    #[error("Unsupported or undetected bank format")]
    UnsupportedFormat {
        hints: Vec<String>,
        candidates: Vec<ProfileCandidate>,
    },
    #[error("Keine gültigen Umsätze erkannt")]
    NoValidRows {
        hints: Vec<String>,
        candidates: Vec<ProfileCandidate>,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl ParseError {
    /// Human-readable remediation hints for the caller to render.
    pub fn hints(&self) -> &[String] {
        match self {
            ParseError::NoHeader { hints }
            | ParseError::UnsupportedFormat { hints, .. }
            | ParseError::NoValidRows { hints, .. } => hints,
            _ => &[],
        }
    }

    /// Every profile tried, with its score, for diagnostics.
    pub fn candidates(&self) -> &[ProfileCandidate] {
        match self {
            ParseError::UnsupportedFormat { candidates, .. }
            | ParseError::NoValidRows { candidates, .. } => candidates,
            _ => &[],
        }
    }
}

impl From<DecodeError> for ParseError {
    fn from(_: DecodeError) -> Self {
        ParseError::Empty
    }
}

/// Non-fatal failure mapping a single record; the row is skipped and the
/// message surfaces as a warning with its line number.
#[derive(Error, Debug)]
pub enum RowError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Money(#[from] kontoflow_core::MoneyError),
    #[error(transparent)]
    Date(#[from] kontoflow_core::DateError),
}
