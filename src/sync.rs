//! Per-source sync orchestration: SMS sync, statement upload and CSV
//! import all funnel through signature dedup and batched idempotent writes.

use crate::app_state::AppState;
use crate::csvio;
use crate::db::TransactionsDb;
use crate::model::{Category, Transaction};
use crate::rules::GENERAL_LABEL;
use crate::sms::{self, RawSmsMessage};
use crate::statement;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Backend batch-commit size limit.
pub const WRITE_BATCH_CAP: usize = 450;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Message ids already handled this session. Purely an optimization — a
/// fresh process starts empty and the signature/doc-id dedup still holds.
/// Lifetime is owned by the caller; reset on sign-out.
#[derive(Clone, Default)]
pub struct SessionCache {
    seen: Arc<Mutex<HashSet<u64>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.seen.lock().unwrap().contains(&id)
    }

    pub fn mark(&self, id: u64) {
        self.seen.lock().unwrap().insert(id);
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

/// Buffers upserts and flushes them in capped batches.
pub struct BatchWriter<'a> {
    db: &'a TransactionsDb,
    cap: usize,
    pending: Vec<Transaction>,
    written: usize,
}

impl<'a> BatchWriter<'a> {
    pub fn new(db: &'a TransactionsDb) -> Self {
        Self::with_cap(db, WRITE_BATCH_CAP)
    }

    pub fn with_cap(db: &'a TransactionsDb, cap: usize) -> Self {
        Self {
            db,
            cap,
            pending: Vec::new(),
            written: 0,
        }
    }

    pub fn push(&mut self, transaction: Transaction) -> Result<(), Box<dyn std::error::Error>> {
        self.pending.push(transaction);
        if self.pending.len() >= self.cap {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        self.written += batch.len();
        debug!("Committing batch of {} transactions", batch.len());
        self.db.upsert_many(batch)
    }

    pub fn finish(mut self) -> Result<usize, Box<dyn std::error::Error>> {
        self.flush()?;
        Ok(self.written)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SmsSyncReport {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Syncs device messages from the lookback window into the transaction
/// store. Re-running over the same messages is a no-op: doc ids are
/// deterministic (`SMS_<id>`) and signatures suppress cross-source
/// duplicates.
pub async fn sync_sms_messages(
    state: &AppState,
    messages: Vec<RawSmsMessage>,
    lookback_days: Option<i64>,
) -> Result<SmsSyncReport, Box<dyn std::error::Error>> {
    let lookback = lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS);
    let cutoff_ms = (Utc::now() - Duration::days(lookback)).timestamp_millis();

    let mut signatures: HashSet<String> = state
        .transaction_db
        .data()
        .iter()
        .map(|t| t.signature())
        .collect();

    let mut live_pool = state.category_db.data();
    let mut new_categories: Vec<Category> = Vec::new();
    let mut writer = BatchWriter::new(&state.transaction_db);
    let mut report = SmsSyncReport::default();

    info!("Syncing {} messages (lookback {} days)", messages.len(), lookback);

    for message in messages {
        if message.date < cutoff_ms {
            report.skipped += 1;
            continue;
        }
        if state.session_cache.contains(message.id) {
            report.skipped += 1;
            continue;
        }
        if !sms::is_bank_sms(&message) {
            state.session_cache.mark(message.id);
            report.skipped += 1;
            continue;
        }

        let Some(parsed) = sms::parse_transaction(&message, &live_pool) else {
            state.session_cache.mark(message.id);
            report.failed += 1;
            continue;
        };
        let mut transaction = parsed.transaction;
        if let Some(created) = parsed.created {
            live_pool.push(created.clone());
            new_categories.push(created);
        }

        let signature = transaction.signature();
        if signatures.contains(&signature) {
            state.session_cache.mark(message.id);
            report.skipped += 1;
            continue;
        }

        // AI assist only when the rules fell through to the generic bucket
        if transaction.category.label == GENERAL_LABEL {
            let label = state
                .classifier
                .predict_category(&transaction.note, &live_pool)
                .await;
            if label != GENERAL_LABEL {
                if let Some(category) = live_pool.iter().find(|c| c.matches_label(&label)) {
                    transaction.category = category.clone();
                }
            }
        }

        signatures.insert(signature);
        state.session_cache.mark(message.id);
        writer.push(transaction)?;
        report.imported += 1;
    }

    let written = writer.finish()?;
    state.category_db.upsert_many(new_categories)?;

    info!(
        "SMS sync done: {} written, {} skipped, {} failed",
        written, report.skipped, report.failed
    );
    Ok(report)
}

/// Ingests extracted statement text. The caller gates this behind the
/// statement-upload rate limit.
pub async fn import_statement_text(
    state: &AppState,
    text: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    let pool = state.category_db.data();
    let outcome = statement::parse_statement(text, &pool, &state.classifier).await;

    let imported = write_deduplicated(state, outcome.transactions)?;
    state.category_db.upsert_many(outcome.new_categories)?;

    info!("Statement import done: {} transactions written", imported);
    Ok(imported)
}

pub async fn import_csv_text(
    state: &AppState,
    text: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    let pool = state.category_db.data();
    let outcome = csvio::parse_csv(text, &pool);

    let imported = write_deduplicated(state, outcome.transactions)?;
    state.category_db.upsert_many(outcome.new_categories)?;

    info!("CSV import done: {} transactions written", imported);
    Ok(imported)
}

/// Signature-based cross-source dedup, then capped batch writes.
fn write_deduplicated(
    state: &AppState,
    transactions: Vec<Transaction>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let signatures: HashSet<String> = state
        .transaction_db
        .data()
        .iter()
        .map(|t| t.signature())
        .collect();

    let mut writer = BatchWriter::new(&state.transaction_db);
    for transaction in transactions {
        if signatures.contains(&transaction.signature()) {
            continue;
        }
        writer.push(transaction)?;
    }
    writer.finish()
}

/// Re-runs AI categorization over stored transactions still in the generic
/// bucket. Spawned at startup and on the daily schedule.
pub async fn reclassify_uncategorized(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let transactions = state.transaction_db.data();
    let pool = state.category_db.data();

    let targets: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.category.label == GENERAL_LABEL)
        .collect();
    if targets.is_empty() {
        info!("No uncategorized transactions to reclassify.");
        return Ok(());
    }

    let notes: Vec<String> = targets.iter().map(|t| t.note.clone()).collect();
    let labels = state.classifier.predict_categories_batch(&notes, &pool).await;

    let mut updated = Vec::new();
    for (target, label) in targets.iter().zip(labels.iter()) {
        if label == GENERAL_LABEL {
            continue;
        }
        if let Some(category) = pool.iter().find(|c| c.matches_label(label)) {
            let mut transaction = (*target).clone();
            transaction.category = category.clone();
            updated.push(transaction);
        }
    }

    info!(
        "Reclassified {} of {} uncategorized transactions",
        updated.len(),
        targets.len()
    );
    state.transaction_db.upsert_many(updated)?;
    Ok(())
}
