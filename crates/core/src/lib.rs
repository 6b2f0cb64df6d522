pub mod dates;
pub mod fingerprint;
pub mod money;
pub mod transaction;

pub use dates::{is_likely_date, parse_flexible_date, DateError};
pub use fingerprint::fingerprint;
pub use money::{format_euro_cents, parse_euro_amount, MoneyError};
pub use transaction::{
    CategorizedTransaction, CategorySource, Direction, LinkKind, ParseReport, ParsedRow,
    ProfileCandidate, TransferLink, TxSource,
};
