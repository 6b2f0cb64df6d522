//! Internal transfer reconciliation between PayPal wallet activity and the
//! bank transactions that fund or drain it.

pub mod matcher;

pub use matcher::{
    CategoryUpdate, MatchInput, MatchOutcome, TransferMatcher, SCORE_FLOOR, TRANSFER_CATEGORY,
};
