use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use kontoflow_categorize::{OverrideRule, OverrideScope};
use kontoflow_core::{
    CategorizedTransaction, CategorySource, Direction, LinkKind, ParsedRow, TransferLink, TxSource,
};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("JSON-Spalte nicht lesbar: {0}")]
    Json(#[from] serde_json::Error),
}

/// A persisted transaction keyed by its dedupe fingerprint.
#[derive(Debug, Clone)]
pub struct StoredTransaction {
    pub id: String,
    pub tx: CategorizedTransaction,
}

/// Outcome of one import batch. Duplicates are rows whose fingerprint was
/// already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub inserted: u64,
    pub duplicates: u64,
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            booking_date TEXT NOT NULL,
            value_date TEXT,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            source TEXT NOT NULL,
            account_id TEXT NOT NULL,
            account_iban TEXT,
            counterparty TEXT,
            counterparty_iban TEXT,
            mcc TEXT,
            reference TEXT,
            external_id TEXT,
            raw_text TEXT NOT NULL,
            raw_json TEXT NOT NULL,
            category TEXT NOT NULL,
            category_confidence REAL NOT NULL,
            category_source TEXT NOT NULL,
            category_rule_id TEXT,
            merchant TEXT,
            normalized_description TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transfer_links (
            id TEXT PRIMARY KEY,
            from_tx_id TEXT NOT NULL,
            to_tx_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            score REAL NOT NULL,
            reasons TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (from_tx_id) REFERENCES transactions(id),
            FOREIGN KEY (to_tx_id) REFERENCES transactions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS override_rules (
            id TEXT PRIMARY KEY,
            scope TEXT NOT NULL,
            pattern TEXT NOT NULL,
            category TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_source ON transactions(source)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn parse_category_source(value: &str) -> CategorySource {
    match value {
        "rule" => CategorySource::Rule,
        "user" => CategorySource::User,
        _ => CategorySource::Unknown,
    }
}

fn override_scope_str(scope: OverrideScope) -> &'static str {
    match scope {
        OverrideScope::Payee => "payee",
        OverrideScope::Memo => "memo",
        OverrideScope::Iban => "iban",
        OverrideScope::Mcc => "mcc",
        OverrideScope::Fingerprint => "fingerprint",
    }
}

fn parse_override_scope(value: &str) -> OverrideScope {
    match value {
        "payee" => OverrideScope::Payee,
        "iban" => OverrideScope::Iban,
        "mcc" => OverrideScope::Mcc,
        "fingerprint" => OverrideScope::Fingerprint,
        _ => OverrideScope::Memo,
    }
}

/// Inserts a batch, skipping fingerprints that already exist. Each element
/// pairs the fingerprint with its categorized transaction.
pub async fn insert_transactions(
    pool: &DbPool,
    batch: &[(String, CategorizedTransaction)],
) -> Result<ImportStats, StorageError> {
    let mut stats = ImportStats {
        inserted: 0,
        duplicates: 0,
    };

    for (fingerprint, tx) in batch {
        let raw_json = serde_json::to_string(&tx.row.raw)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO transactions (
                id, booking_date, value_date, amount_cents, currency, source,
                account_id, account_iban, counterparty, counterparty_iban, mcc,
                reference, external_id, raw_text, raw_json,
                category, category_confidence, category_source, category_rule_id,
                merchant, normalized_description
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(fingerprint)
        .bind(tx.row.booking_date)
        .bind(tx.row.value_date)
        .bind(tx.row.amount_cents)
        .bind(&tx.row.currency)
        .bind(tx.row.source.as_str())
        .bind(&tx.row.account_id)
        .bind(&tx.row.account_iban)
        .bind(&tx.row.counterparty)
        .bind(&tx.row.counterparty_iban)
        .bind(&tx.row.mcc)
        .bind(&tx.row.reference)
        .bind(&tx.row.external_id)
        .bind(&tx.row.raw_text)
        .bind(raw_json)
        .bind(&tx.category)
        .bind(tx.category_confidence)
        .bind(tx.category_source.as_str())
        .bind(&tx.category_rule_id)
        .bind(&tx.merchant)
        .bind(&tx.normalized_description)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            stats.inserted += 1;
        } else {
            stats.duplicates += 1;
        }
    }

    Ok(stats)
}

#[derive(sqlx::FromRow)]
struct TxRow {
    id: String,
    booking_date: NaiveDate,
    value_date: Option<NaiveDate>,
    amount_cents: i64,
    currency: String,
    source: String,
    account_id: String,
    account_iban: Option<String>,
    counterparty: Option<String>,
    counterparty_iban: Option<String>,
    mcc: Option<String>,
    reference: Option<String>,
    external_id: Option<String>,
    raw_text: String,
    raw_json: String,
    category: String,
    category_confidence: f64,
    category_source: String,
    category_rule_id: Option<String>,
    merchant: Option<String>,
    normalized_description: String,
}

const TX_COLUMNS: &str = "id, booking_date, value_date, amount_cents, currency, source, \
     account_id, account_iban, counterparty, counterparty_iban, mcc, \
     reference, external_id, raw_text, raw_json, \
     category, category_confidence, category_source, category_rule_id, \
     merchant, normalized_description";

fn hydrate(row: TxRow) -> Result<StoredTransaction, StorageError> {
    let raw: BTreeMap<String, String> = serde_json::from_str(&row.raw_json)?;
    let source = TxSource::parse(&row.source).unwrap_or(TxSource::CsvBank);
    let parsed = ParsedRow {
        booking_date: row.booking_date,
        value_date: row.value_date,
        amount_cents: row.amount_cents,
        currency: row.currency,
        direction: Direction::from_amount(row.amount_cents),
        source,
        account_id: row.account_id,
        account_iban: row.account_iban,
        counterparty: row.counterparty,
        counterparty_iban: row.counterparty_iban,
        mcc: row.mcc,
        reference: row.reference,
        external_id: row.external_id,
        raw_text: row.raw_text,
        raw,
    };
    Ok(StoredTransaction {
        id: row.id,
        tx: CategorizedTransaction {
            row: parsed,
            category: row.category,
            category_confidence: row.category_confidence,
            category_source: parse_category_source(&row.category_source),
            category_rule_id: row.category_rule_id,
            merchant: row.merchant,
            normalized_description: row.normalized_description,
        },
    })
}

pub async fn get_all_transactions(pool: &DbPool) -> Result<Vec<StoredTransaction>, StorageError> {
    let query = format!(
        "SELECT {TX_COLUMNS} FROM transactions ORDER BY booking_date, id"
    );
    let rows = sqlx::query_as::<_, TxRow>(&query).fetch_all(pool).await?;
    rows.into_iter().map(hydrate).collect()
}

/// Wallet-side rows for transfer matching.
pub async fn get_paypal_transactions(
    pool: &DbPool,
) -> Result<Vec<StoredTransaction>, StorageError> {
    let query = format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE source = 'csv_paypal' ORDER BY booking_date, id"
    );
    let rows = sqlx::query_as::<_, TxRow>(&query).fetch_all(pool).await?;
    rows.into_iter().map(hydrate).collect()
}

/// Bank-side rows (CSV and CAMT) for transfer matching.
pub async fn get_bank_transactions(pool: &DbPool) -> Result<Vec<StoredTransaction>, StorageError> {
    let query = format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE source != 'csv_paypal' ORDER BY booking_date, id"
    );
    let rows = sqlx::query_as::<_, TxRow>(&query).fetch_all(pool).await?;
    rows.into_iter().map(hydrate).collect()
}

/// Persists a transfer link and the category updates for both sides in one
/// database transaction. Re-running the matcher over the same data is a no-op
/// thanks to INSERT OR IGNORE on the link id.
pub async fn record_transfer_link(
    pool: &DbPool,
    link: &TransferLink,
    updates: &[(String, String, f64)],
) -> Result<bool, StorageError> {
    let reasons = serde_json::to_string(&link.reasons)?;
    let kind = match link.kind {
        LinkKind::InternalTransfer => "internal_transfer",
    };

    let mut db_tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT OR IGNORE INTO transfer_links (id, from_tx_id, to_tx_id, kind, score, reasons, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&link.id)
    .bind(&link.from_tx_id)
    .bind(&link.to_tx_id)
    .bind(kind)
    .bind(link.score)
    .bind(reasons)
    .bind(link.created_at.to_rfc3339())
    .execute(&mut *db_tx)
    .await?;

    let inserted = result.rows_affected() == 1;
    if inserted {
        for (tx_id, category, confidence) in updates {
            sqlx::query(
                "UPDATE transactions SET category = ?, category_confidence = ? WHERE id = ?",
            )
            .bind(category)
            .bind(confidence)
            .bind(tx_id)
            .execute(&mut *db_tx)
            .await?;
        }
    }

    db_tx.commit().await?;
    Ok(inserted)
}

pub async fn get_transfer_links(pool: &DbPool) -> Result<Vec<TransferLink>, StorageError> {
    let rows = sqlx::query_as::<_, (String, String, String, f64, String, String)>(
        "SELECT id, from_tx_id, to_tx_id, score, reasons, created_at \
         FROM transfer_links ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    let mut links = Vec::with_capacity(rows.len());
    for row in rows {
        let reasons: Vec<String> = serde_json::from_str(&row.4)?;
        let created_at = DateTime::parse_from_rfc3339(&row.5)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_default();
        links.push(TransferLink {
            id: row.0,
            from_tx_id: row.1,
            to_tx_id: row.2,
            kind: LinkKind::InternalTransfer,
            score: row.3,
            reasons,
            created_at,
        });
    }
    Ok(links)
}

pub async fn save_override_rule(pool: &DbPool, rule: &OverrideRule) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT OR REPLACE INTO override_rules (id, scope, pattern, category, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&rule.id)
    .bind(override_scope_str(rule.scope))
    .bind(&rule.pattern)
    .bind(&rule.category)
    .bind(rule.created_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_override_rules(pool: &DbPool) -> Result<Vec<OverrideRule>, StorageError> {
    let rows = sqlx::query_as::<_, (String, String, String, String, String)>(
        "SELECT id, scope, pattern, category, created_at FROM override_rules ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| OverrideRule {
            id: row.0,
            scope: parse_override_scope(&row.1),
            pattern: row.2,
            category: row.3,
            created_at: DateTime::parse_from_rfc3339(&row.4)
                .map(|ts| ts.with_timezone(&Utc))
                .unwrap_or_default(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kontoflow_core::fingerprint;

    async fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("kontoflow.db")).await.unwrap();
        (dir, pool)
    }

    fn sample_tx(day: u32, amount_cents: i64, counterparty: &str) -> (String, CategorizedTransaction) {
        let mut row = ParsedRow::new(NaiveDate::from_ymd_opt(2025, 3, day).unwrap(), amount_cents);
        row.counterparty = Some(counterparty.to_string());
        let id = fingerprint(&row);
        let tx = CategorizedTransaction {
            category: "groceries".to_string(),
            category_confidence: 0.8,
            category_source: CategorySource::Rule,
            category_rule_id: Some("sys.groceries".to_string()),
            merchant: Some(counterparty.to_string()),
            normalized_description: counterparty.to_uppercase(),
            row,
        };
        (id, tx)
    }

    #[tokio::test]
    async fn insert_reports_duplicates() {
        let (_dir, pool) = test_pool().await;
        let batch = vec![sample_tx(1, -1099, "REWE"), sample_tx(2, -2550, "EDEKA")];

        let first = insert_transactions(&pool, &batch).await.unwrap();
        assert_eq!(first, ImportStats { inserted: 2, duplicates: 0 });

        let second = insert_transactions(&pool, &batch).await.unwrap();
        assert_eq!(second, ImportStats { inserted: 0, duplicates: 2 });
    }

    #[tokio::test]
    async fn roundtrip_preserves_fields() {
        let (_dir, pool) = test_pool().await;
        let (id, mut tx) = sample_tx(5, -1299, "NETFLIX");
        tx.row.raw.insert("Buchungstag".to_string(), "05.03.2025".to_string());
        insert_transactions(&pool, &[(id.clone(), tx.clone())])
            .await
            .unwrap();

        let stored = get_all_transactions(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].tx.category, "groceries");
        assert_eq!(stored[0].tx.row.amount_cents, -1299);
        assert_eq!(stored[0].tx.row.raw.get("Buchungstag").map(String::as_str), Some("05.03.2025"));
    }

    #[tokio::test]
    async fn sources_are_segregated() {
        let (_dir, pool) = test_pool().await;
        let (bank_id, bank) = sample_tx(1, -5000, "PAYPAL");
        let (pp_id, mut pp) = sample_tx(1, 5000, "Bankkonto");
        pp.row.source = TxSource::CsvPaypal;
        pp.row.account_id = "paypal:wallet".to_string();
        insert_transactions(&pool, &[(bank_id.clone(), bank), (pp_id.clone(), pp)])
            .await
            .unwrap();

        let paypal = get_paypal_transactions(&pool).await.unwrap();
        assert_eq!(paypal.len(), 1);
        assert_eq!(paypal[0].id, pp_id);

        let bank_side = get_bank_transactions(&pool).await.unwrap();
        assert_eq!(bank_side.len(), 1);
        assert_eq!(bank_side[0].id, bank_id);
    }

    #[tokio::test]
    async fn link_insert_is_idempotent_and_updates_categories() {
        let (_dir, pool) = test_pool().await;
        let (bank_id, bank) = sample_tx(2, 5000, "PAYPAL EUROPE");
        let (pp_id, mut pp) = sample_tx(1, -5000, "Bankkonto");
        pp.row.source = TxSource::CsvPaypal;
        insert_transactions(&pool, &[(bank_id.clone(), bank), (pp_id.clone(), pp)])
            .await
            .unwrap();

        let link = TransferLink {
            id: format!("transfer:{pp_id}->{bank_id}"),
            from_tx_id: pp_id.clone(),
            to_tx_id: bank_id.clone(),
            kind: LinkKind::InternalTransfer,
            score: 0.9,
            reasons: vec!["amount_match".to_string()],
            created_at: Utc::now(),
        };
        let updates = vec![
            (pp_id.clone(), "transfer_internal".to_string(), 0.95),
            (bank_id.clone(), "transfer_internal".to_string(), 0.95),
        ];

        assert!(record_transfer_link(&pool, &link, &updates).await.unwrap());
        assert!(!record_transfer_link(&pool, &link, &updates).await.unwrap());

        let stored = get_all_transactions(&pool).await.unwrap();
        assert!(stored.iter().all(|t| t.tx.category == "transfer_internal"));

        let links = get_transfer_links(&pool).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].reasons, vec!["amount_match".to_string()]);
    }

    #[tokio::test]
    async fn override_rules_roundtrip() {
        let (_dir, pool) = test_pool().await;
        let rule = OverrideRule {
            id: "ovr-1".to_string(),
            scope: OverrideScope::Payee,
            pattern: "netflix".to_string(),
            category: "subscriptions".to_string(),
            created_at: Utc::now(),
        };
        save_override_rule(&pool, &rule).await.unwrap();

        let loaded = get_override_rules(&pool).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "ovr-1");
        assert_eq!(loaded[0].scope, OverrideScope::Payee);
    }
}
