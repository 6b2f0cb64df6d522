use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{NaiveDate, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use kontoflow_core::{LinkKind, TransferLink, TxSource};

/// Category both sides of an accepted pair are moved to.
pub const TRANSFER_CATEGORY: &str = "transfer_internal";
/// Minimum evidence score; partial evidence never silently recategorizes
/// money movements.
pub const SCORE_FLOOR: f64 = 0.8;

static TRANSFER_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(transfer|withdrawal|payout|add funds|top\s?up|überweisung|abbuchung auf bankkonto|bankgutschrift)").unwrap());

static PAYPAL_DESCRIPTOR: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)paypal", r"(?i)pp\.", r"(?i)europe s\.?.*r\.l"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// One stored transaction as the matcher sees it. The id is the storage key
/// (the fingerprint) and must be unique within a run.
#[derive(Debug, Clone)]
pub struct MatchInput {
    pub id: String,
    pub source: TxSource,
    pub booking_date: NaiveDate,
    pub amount_cents: i64,
    pub counterparty: Option<String>,
    pub reference: Option<String>,
    pub raw_text: String,
    pub external_id: Option<String>,
    pub category: String,
    pub category_confidence: f64,
}

/// Category change the caller persists for one side of an accepted link.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryUpdate {
    pub tx_id: String,
    pub category: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub links: Vec<TransferLink>,
    pub updates: Vec<CategoryUpdate>,
}

/// Finds PayPal/bank transaction pairs recording the same real-world
/// transfer. Tunables default to a three-day window and two cents of
/// rounding tolerance.
#[derive(Debug, Clone)]
pub struct TransferMatcher {
    pub date_window_days: i64,
    pub amount_tolerance_cents: i64,
}

impl Default for TransferMatcher {
    fn default() -> Self {
        TransferMatcher {
            date_window_days: 3,
            amount_tolerance_cents: 2,
        }
    }
}

struct Candidate<'a> {
    tx: &'a MatchInput,
    descriptor: String,
}

struct ScoredMatch<'a> {
    paypal: &'a MatchInput,
    bank: &'a MatchInput,
    score: f64,
    reasons: Vec<String>,
}

impl TransferMatcher {
    pub fn match_transfers(&self, paypal: &[MatchInput], bank: &[MatchInput]) -> MatchOutcome {
        let fee_references = fee_reference_set(paypal);

        let paypal_candidates: Vec<Candidate> = paypal
            .iter()
            .filter(|tx| tx.source == TxSource::CsvPaypal)
            .map(to_candidate)
            .collect();
        let bank_candidates: Vec<Candidate> = bank
            .iter()
            .filter(|tx| tx.source != TxSource::CsvPaypal)
            .map(to_candidate)
            .collect();

        if paypal_candidates.is_empty() || bank_candidates.is_empty() {
            return MatchOutcome { links: Vec::new(), updates: Vec::new() };
        }

        let mut bank_index: HashMap<i64, Vec<&Candidate>> = HashMap::new();
        for candidate in &bank_candidates {
            bank_index.entry(candidate.tx.amount_cents).or_default().push(candidate);
        }
        for list in bank_index.values_mut() {
            list.sort_by(|a, b| {
                a.tx.booking_date
                    .cmp(&b.tx.booking_date)
                    .then_with(|| a.tx.id.cmp(&b.tx.id))
            });
        }

        let mut matches: Vec<ScoredMatch> = Vec::new();
        for candidate in &paypal_candidates {
            if let Some(best) = self.best_match(candidate, &bank_index, &fee_references) {
                matches.push(best);
            }
        }

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.bank.booking_date.cmp(&b.bank.booking_date))
                .then_with(|| a.bank.id.cmp(&b.bank.id))
        });

        let mut used: HashSet<&str> = HashSet::new();
        let mut links = Vec::new();
        let mut updates = Vec::new();

        for m in &matches {
            if used.contains(m.paypal.id.as_str()) || used.contains(m.bank.id.as_str()) {
                continue;
            }
            used.insert(&m.paypal.id);
            used.insert(&m.bank.id);

            let (from, to) = if m.paypal.amount_cents < 0 {
                (&m.paypal.id, &m.bank.id)
            } else {
                (&m.bank.id, &m.paypal.id)
            };
            let booked = m.paypal.booking_date.min(m.bank.booking_date);
            let link = TransferLink {
                id: format!("transfer:{}->{}", m.paypal.id, m.bank.id),
                from_tx_id: from.clone(),
                to_tx_id: to.clone(),
                kind: LinkKind::InternalTransfer,
                score: m.score.min(1.0),
                reasons: m.reasons.clone(),
                created_at: Utc.from_utc_datetime(&booked.and_hms_opt(0, 0, 0).unwrap_or_default()),
            };
            debug!(link = %link.id, score = link.score, "accepted transfer pair");
            links.push(link);

            for side in [m.paypal, m.bank] {
                updates.push(CategoryUpdate {
                    tx_id: side.id.clone(),
                    category: TRANSFER_CATEGORY.to_string(),
                    confidence: side.category_confidence.max(0.95),
                });
            }
        }

        MatchOutcome { links, updates }
    }

    fn best_match<'a>(
        &self,
        paypal: &Candidate<'a>,
        bank_index: &HashMap<i64, Vec<&Candidate<'a>>>,
        fee_references: &HashSet<&str>,
    ) -> Option<ScoredMatch<'a>> {
        if !looks_like_transfer(paypal) {
            return None;
        }

        let mut candidates: Vec<ScoredMatch<'a>> = Vec::new();
        for delta in -self.amount_tolerance_cents..=self.amount_tolerance_cents {
            let Some(list) = bank_index.get(&(-paypal.tx.amount_cents + delta)) else {
                continue;
            };
            for bank in list {
                let scored = self.evaluate(paypal, bank, fee_references);
                if scored.score > 0.0 {
                    candidates.push(scored);
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.bank.booking_date.cmp(&b.bank.booking_date))
                .then_with(|| a.bank.id.cmp(&b.bank.id))
        });
        candidates.into_iter().next().filter(|best| best.score >= SCORE_FLOOR)
    }

    fn evaluate<'a>(
        &self,
        paypal: &Candidate<'a>,
        bank: &Candidate<'a>,
        fee_references: &HashSet<&str>,
    ) -> ScoredMatch<'a> {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        if (paypal.tx.amount_cents + bank.tx.amount_cents).abs() <= self.amount_tolerance_cents {
            score += 0.4;
            reasons.push("amount_match".to_string());
        }

        let days_apart = (paypal.tx.booking_date - bank.tx.booking_date).num_days().abs();
        if days_apart <= self.date_window_days {
            score += if days_apart <= 1 { 0.3 } else { 0.2 };
            reasons.push("date_within_window".to_string());
        }

        if PAYPAL_DESCRIPTOR.iter().any(|p| p.is_match(&bank.descriptor)) {
            score += 0.2;
            reasons.push("descriptor_match".to_string());
        }

        if let (Some(a), Some(b)) = (paypal.tx.reference.as_deref(), bank.tx.reference.as_deref()) {
            if !a.is_empty() && a == b {
                score += 0.1;
                reasons.push("reference_match".to_string());
            }
        }

        let fee_hit = [paypal.tx.reference.as_deref(), paypal.tx.external_id.as_deref()]
            .into_iter()
            .flatten()
            .any(|key| fee_references.contains(key));
        if fee_hit {
            // Corroborating only; carries no score.
            reasons.push("fee_associated".to_string());
        }

        ScoredMatch { paypal: paypal.tx, bank: bank.tx, score, reasons }
    }
}

fn to_candidate(tx: &MatchInput) -> Candidate<'_> {
    let descriptor = [
        tx.counterparty.as_deref(),
        tx.reference.as_deref(),
        Some(tx.raw_text.as_str()),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();
    Candidate { tx, descriptor }
}

fn looks_like_transfer(candidate: &Candidate) -> bool {
    candidate.tx.category == TRANSFER_CATEGORY || TRANSFER_HINT.is_match(&candidate.descriptor)
}

/// Reference and external ids of transactions already categorized as fees.
/// Attached to matches as informational evidence only.
fn fee_reference_set(txs: &[MatchInput]) -> HashSet<&str> {
    let mut set = HashSet::new();
    for tx in txs {
        if tx.category != "fees_charges" {
            continue;
        }
        if let Some(reference) = tx.reference.as_deref() {
            set.insert(reference);
        }
        if let Some(external) = tx.external_id.as_deref() {
            set.insert(external);
        }
    }
    set
}
