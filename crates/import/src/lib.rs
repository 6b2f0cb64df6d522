//! Statement ingestion: decoding, format detection and row mapping for
//! German bank CSV exports, PayPal activity exports and camt.053 XML.

pub mod auto_adapter;
pub mod camt;
pub mod decode;
pub mod dialect;
pub mod error;
pub mod parse;
pub mod paypal;
pub mod profiles;

pub use error::{default_hints, ParseError, RowError};
pub use parse::{parse_statement, MIN_PROFILE_CONFIDENCE};
pub use profiles::{registry, BankProfile, Record};
