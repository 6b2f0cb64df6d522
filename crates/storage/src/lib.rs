pub mod db;

pub use db::{
    create_db, get_all_transactions, get_bank_transactions, get_override_rules,
    get_paypal_transactions, get_transfer_links, insert_transactions, record_transfer_link,
    save_override_rule, DbPool, ImportStats, StorageError, StoredTransaction,
};
