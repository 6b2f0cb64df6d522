use std::path::Path;

use anyhow::Context;
use tracing::info;

use kontoflow_categorize::{apply_override, find_matching_override, EngineContext};
use kontoflow_core::{fingerprint, format_euro_cents, CategorizedTransaction};
use kontoflow_reconcile::{MatchInput, TransferMatcher};
use kontoflow_storage::{DbPool, StoredTransaction};

/// Parses a statement file, categorizes every row and stores the batch.
pub async fn run_import(db: &DbPool, file: &Path, bank: Option<&str>) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Datei nicht lesbar: {}", file.display()))?;

    let report = kontoflow_import::parse_statement(&bytes, bank).map_err(|err| {
        for hint in err.hints() {
            eprintln!("Hinweis: {hint}");
        }
        anyhow::anyhow!("{err}")
    })?;

    info!(profile = %report.profile_id, rows = report.rows.len(), "statement parsed");
    println!(
        "Profil: {} (Konfidenz {:.2}), {} Zeilen",
        report.profile_id,
        report.confidence,
        report.rows.len()
    );
    for warning in &report.warnings {
        println!("Warnung: {warning}");
    }
    if let Some(balance) = report.opening_balance_cents {
        println!("Alter Kontostand: {}", format_euro_cents(balance));
    }
    if let Some(balance) = report.closing_balance_cents {
        println!("Neuer Kontostand: {}", format_euro_cents(balance));
    }

    let engine = EngineContext::with_defaults()?;
    let overrides = kontoflow_storage::get_override_rules(db).await?;

    let mut batch: Vec<(String, CategorizedTransaction)> = Vec::with_capacity(report.rows.len());
    for row in report.rows {
        let id = fingerprint(&row);
        let tx = match find_matching_override(&row, &id, &overrides) {
            Some(rule) => apply_override(row, rule),
            None => engine.categorize(row),
        };
        batch.push((id, tx));
    }

    let stats = kontoflow_storage::insert_transactions(db, &batch).await?;
    println!(
        "{} Buchungen übernommen, {} Duplikate übersprungen",
        stats.inserted, stats.duplicates
    );
    Ok(())
}

fn to_match_input(stored: StoredTransaction) -> MatchInput {
    let tx = stored.tx;
    MatchInput {
        id: stored.id,
        source: tx.row.source,
        booking_date: tx.row.booking_date,
        amount_cents: tx.row.amount_cents,
        counterparty: tx.row.counterparty,
        reference: tx.row.reference,
        raw_text: tx.row.raw_text,
        external_id: tx.row.external_id,
        category: tx.category,
        category_confidence: tx.category_confidence,
    }
}

/// Matches PayPal payouts and top-ups against bank entries and records the
/// resulting links.
pub async fn run_reconcile(db: &DbPool) -> anyhow::Result<()> {
    let paypal: Vec<MatchInput> = kontoflow_storage::get_paypal_transactions(db)
        .await?
        .into_iter()
        .map(to_match_input)
        .collect();
    let bank: Vec<MatchInput> = kontoflow_storage::get_bank_transactions(db)
        .await?
        .into_iter()
        .map(to_match_input)
        .collect();

    let outcome = TransferMatcher::default().match_transfers(&paypal, &bank);
    if outcome.links.is_empty() {
        println!("Keine internen Umbuchungen gefunden");
        return Ok(());
    }

    let mut recorded = 0u64;
    for link in &outcome.links {
        let updates: Vec<(String, String, f64)> = outcome
            .updates
            .iter()
            .filter(|u| u.tx_id == link.from_tx_id || u.tx_id == link.to_tx_id)
            .map(|u| (u.tx_id.clone(), u.category.clone(), u.confidence))
            .collect();
        if kontoflow_storage::record_transfer_link(db, link, &updates).await? {
            recorded += 1;
            println!(
                "{} (Score {:.2}, {})",
                link.id,
                link.score,
                link.reasons.join(", ")
            );
        }
    }
    println!("{recorded} Umbuchungen verknüpft");
    Ok(())
}
