//! Bank-statement text parsing.
//!
//! Input is plain text extracted upstream from a statement PDF. Rows are
//! reconstructed from date+balance patterns (with a two-line join when the
//! balance wraps), sorted chronologically, and each transaction's amount is
//! derived from the delta between successive balances. Rows the rules could
//! not categorize are re-classified in one AI batch call and patched back
//! by index.

use crate::genai::GeminiClassifier;
use crate::model::{Category, Transaction, TxnKind};
use crate::rules::{self, GENERAL_LABEL};
use crate::sms::{normalize_year, title_case};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

/// Balance deltas below this are balance-inquiry noise, not transactions.
const DELTA_EPSILON: f64 = 0.01;

/// One reconstructed statement row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementLine {
    pub date: NaiveDate,
    /// Signed running balance; a trailing `Dr` suffix negates.
    pub balance: f64,
    pub raw_description: String,
}

#[derive(Debug, Clone, Default)]
pub struct StatementOutcome {
    /// Newest-first.
    pub transactions: Vec<Transaction>,
    pub new_categories: Vec<Category>,
}

/// Full parse: scan, derive, AI-patch, newest-first. Malformed text (no
/// date/balance patterns at all) yields an empty outcome, never an error.
pub async fn parse_statement(
    text: &str,
    pool: &[Category],
    classifier: &GeminiClassifier,
) -> StatementOutcome {
    let lines = scan_statement_lines(text);
    let (mut transactions, new_categories, live_pool) = derive_transactions(&lines, pool);

    // one batch call for everything that fell through to the generic bucket
    let uncertain: Vec<usize> = transactions
        .iter()
        .enumerate()
        .filter(|(_, t)| t.category.label == GENERAL_LABEL)
        .map(|(i, _)| i)
        .collect();

    if !uncertain.is_empty() {
        let notes: Vec<String> = uncertain
            .iter()
            .map(|&i| transactions[i].note.clone())
            .collect();
        let labels = classifier.predict_categories_batch(&notes, &live_pool).await;

        for (&index, label) in uncertain.iter().zip(labels.iter()) {
            if label != GENERAL_LABEL {
                if let Some(category) = live_pool.iter().find(|c| c.matches_label(label)) {
                    transactions[index].category = category.clone();
                }
            }
        }
    }

    transactions.reverse(); // chronological -> newest first

    StatementOutcome {
        transactions,
        new_categories,
    }
}

/// Scans for lines carrying a date and a trailing balance. When a line has
/// a date but the balance wrapped, the next line is joined before giving up.
pub fn scan_statement_lines(text: &str) -> Vec<StatementLine> {
    let date_re = Regex::new(
        r"(?i)\b(\d{1,2}[-/]\d{1,2}[-/]\d{2,4}|\d{1,2}[- ][a-z]{3,9}[- ]\d{2,4})\b",
    )
    .unwrap();
    let balance_re = Regex::new(r"(?i)([0-9][0-9,]*\.\d{2})\s*(dr|cr)?\s*$").unwrap();

    let raw_lines: Vec<&str> = text.lines().collect();
    let mut lines = Vec::new();
    let mut i = 0;

    while i < raw_lines.len() {
        let line = raw_lines[i].trim();
        i += 1;

        let Some(date_match) = date_re.find(line) else {
            continue;
        };

        let joined;
        let row = if balance_re.is_match(line) {
            line
        } else if i < raw_lines.len()
            && !date_re.is_match(raw_lines[i].trim())
            && balance_re.is_match(raw_lines[i].trim())
        {
            // balance wrapped onto the next line; a dated next line is a
            // row of its own, not a continuation
            joined = format!("{} {}", line, raw_lines[i].trim());
            i += 1;
            joined.as_str()
        } else {
            continue;
        };

        let Some(balance_caps) = balance_re.captures(row) else {
            continue;
        };
        let Some(date) = parse_row_date(date_match.as_str()) else {
            continue;
        };

        let balance = parse_balance(&balance_caps);
        let raw_description = extract_description(row, date_match.as_str(), &balance_caps[0]);

        lines.push(StatementLine {
            date,
            balance,
            raw_description,
        });
    }

    debug!("Scanned {} statement lines", lines.len());
    lines
}

/// Chronological sort, then balance-delta derivation: positive delta is
/// income, negative is expense, |delta| < epsilon is dropped.
fn derive_transactions(
    lines: &[StatementLine],
    pool: &[Category],
) -> (Vec<Transaction>, Vec<Category>, Vec<Category>) {
    let mut sorted = lines.to_vec();
    sorted.sort_by_key(|l| l.date);

    let mut live_pool = pool.to_vec();
    let mut new_categories = Vec::new();
    let mut transactions = Vec::new();

    for pair in sorted.windows(2) {
        let (prev, line) = (&pair[0], &pair[1]);
        let delta = line.balance - prev.balance;
        if delta.abs() < DELTA_EPSILON {
            continue;
        }

        let kind = if delta > 0.0 {
            TxnKind::Income
        } else {
            TxnKind::Expense
        };
        let amount = (delta.abs() * 100.0).round() / 100.0;

        let resolution = rules::resolve_for_statement(
            &line.raw_description,
            &line.raw_description,
            &live_pool,
            kind == TxnKind::Income,
        );
        if let Some(created) = resolution.created {
            live_pool.push(created.clone());
            new_categories.push(created);
        }

        let mut transaction = Transaction {
            doc_id: String::new(),
            date: format!("{}T00:00:00", line.date.format("%Y-%m-%d")),
            note: line.raw_description.clone(),
            amount,
            kind,
            category: resolution.category,
            payment_method: "Bank Account".to_string(),
            recurring: Some("none".to_string()),
            created_at: Utc::now().to_rfc3339(),
            sms_id: None,
        };
        // signature-derived id keeps re-uploads of the same statement idempotent
        transaction.doc_id = format!("STMT_{}", transaction.signature());

        transactions.push(transaction);
    }

    (transactions, new_categories, live_pool)
}

fn parse_balance(caps: &regex::Captures) -> f64 {
    let value: f64 = caps[1].replace(',', "").parse().unwrap_or(0.0);
    match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(suffix) if suffix == "dr" => -value,
        _ => value,
    }
}

fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    let numeric = Regex::new(r"^(\d{1,2})[-/](\d{1,2})[-/](\d{2,4})$").unwrap();
    if let Some(caps) = numeric.captures(raw) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = normalize_year(caps[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let month_name = Regex::new(r"(?i)^(\d{1,2})[- ]([a-z]{3,9})[- ](\d{2,4})$").unwrap();
    if let Some(caps) = month_name.captures(raw) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_from_name(&caps[2])?;
        let year = normalize_year(caps[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

fn month_from_name(name: &str) -> Option<u32> {
    const MONTHS: &[&str] = &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = name.to_lowercase();
    MONTHS
        .iter()
        .position(|m| prefix.starts_with(m))
        .map(|i| i as u32 + 1)
}

/// Strips the date and balance substrings plus intermediate currency-looking
/// tokens, then runs merchant extraction over what remains.
fn extract_description(row: &str, date_str: &str, balance_str: &str) -> String {
    let mut rest = row.replacen(date_str, "", 1);
    if let Some(pos) = rest.rfind(balance_str.trim()) {
        rest.replace_range(pos.., "");
    }

    let currency_re = Regex::new(r"(?i)[0-9][0-9,]*\.\d{2}|\b(?:rs\.?|inr)\b|₹").unwrap();
    let rest = currency_re.replace_all(&rest, " ").to_string();

    merchant_from_description(rest.trim())
}

/// UPI/NEFT/POS-specific patterns before generic token cleanup.
fn merchant_from_description(desc: &str) -> String {
    let attempts = [
        Regex::new(
            r"(?i)\b(?:upi|neft|imps|rtgs|ach)\b[/: -]*(?:[a-z0-9]*\d[a-z0-9]*[/: -]+)*([A-Za-z][A-Za-z .&_-]{2,40})",
        )
        .unwrap(),
        Regex::new(r"(?i)\bpos\s+(?:\d+\s+)?([A-Za-z][A-Za-z .&_-]{2,40})").unwrap(),
    ];

    for re in &attempts {
        if let Some(caps) = re.captures(desc) {
            if let Some(m) = caps.get(1) {
                let name = m.as_str().split('@').next().unwrap_or("").trim();
                if !name.is_empty() {
                    return title_case(name);
                }
            }
        }
    }

    const NOISE: &[&str] = &[
        "txn", "ref", "chq", "withdrawal", "deposit", "transfer", "balance", "bal", "opening",
        "closing", "brought", "forward",
    ];

    let tokens: Vec<String> = desc
        .split(|c: char| c.is_whitespace() || c == '/' || c == ',' || c == ':' || c == '-')
        .map(|t| t.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|t| t.len() >= 3)
        .filter(|t| t.chars().all(|c| c.is_ascii_alphabetic()))
        .filter(|t| !NOISE.contains(&t.to_lowercase().as_str()))
        .take(3)
        .map(|t| title_case(t))
        .collect();

    if tokens.is_empty() {
        "Unknown".to_string()
    } else {
        tokens.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::ScriptedCompletionApi;
    use crate::ratelimit::{MemoryWindowStore, RateLimiter};
    use std::sync::Arc;

    fn classifier() -> GeminiClassifier {
        // no API key: AI patching short-circuits to General
        GeminiClassifier::new(
            None,
            RateLimiter::new(Arc::new(MemoryWindowStore::default()), true),
        )
    }

    fn pool() -> Vec<Category> {
        vec![
            Category::new("Food", "🍔", "#FF7043", false),
            Category::new("General", "💳", "#9E9E9E", false),
        ]
    }

    const SAMPLE: &str = "\
HDFC BANK  Account Statement
01-01-2025 OPENING BALANCE B/F 10,000.00
02-01-2025 UPI/512345/zomato@ybl 9,500.00
03-01-2025 NEFT SALARY CR ACME CORP 9,700.00
";

    #[test]
    fn scans_date_and_balance_rows() {
        let lines = scan_statement_lines(SAMPLE);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].balance, 10_000.0);
        assert_eq!(lines[1].raw_description, "Zomato");
        assert_eq!(lines[2].date, NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
    }

    #[test]
    fn joins_wrapped_balance_lines() {
        let text = "04-01-2025 IMPS TRANSFER JOHN\n9,600.00\n";
        let lines = scan_statement_lines(text);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].balance, 9_600.0);
        assert_eq!(lines[0].raw_description, "Transfer John");
    }

    #[test]
    fn truncated_row_does_not_swallow_the_next_complete_row() {
        let text = "\
01-01-2025 NARRATION WITHOUT AMOUNT
02-01-2025 UPI/1/zomato@ybl 9,500.00
";
        let lines = scan_statement_lines(text);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(lines[0].raw_description, "Zomato");
    }

    #[test]
    fn dr_suffix_negates_balance() {
        let lines = scan_statement_lines("05-01-2025 OD INTEREST 1,234.56 Dr\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].balance, -1_234.56);
    }

    #[test]
    fn month_name_dates_parse() {
        let lines = scan_statement_lines("5 Jan 2025 POS 1234 BIG BAZAAR 900.00\n");
        assert_eq!(lines[0].date, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());
        assert_eq!(lines[0].raw_description, "Big Bazaar");
    }

    #[tokio::test]
    async fn balance_deltas_become_transactions() {
        let outcome = parse_statement(SAMPLE, &pool(), &classifier()).await;

        // [10000, 9500, 9700] -> expense 500, income 200; newest first
        assert_eq!(outcome.transactions.len(), 2);

        let income = &outcome.transactions[0];
        assert_eq!(income.kind, TxnKind::Income);
        assert_eq!(income.amount, 200.0);
        assert_eq!(income.category.label, "Paycheck");
        assert!(income.date.starts_with("2025-01-03"));

        let expense = &outcome.transactions[1];
        assert_eq!(expense.kind, TxnKind::Expense);
        assert_eq!(expense.amount, 500.0);
        assert_eq!(expense.category.label, "Food");
    }

    #[tokio::test]
    async fn ai_labels_patch_uncertain_rows_by_index() {
        // three person-to-person rows, all falling to the generic bucket
        let text = "\
01-01-2025 OPENING BALANCE B/F 10,000.00
02-01-2025 UPI/1/ramesh@okicici 9,400.00
03-01-2025 UPI/2/suresh@okhdfc 9,100.00
04-01-2025 UPI/3/mahesh@okaxis 8,900.00
";
        let api = Arc::new(ScriptedCompletionApi::new([
            r#"["Food","General","Transport"]"#,
        ]));
        let classifier = GeminiClassifier::new(
            Some(api),
            RateLimiter::new(Arc::new(MemoryWindowStore::default()), true),
        );
        let pool = vec![
            Category::new("Food", "🍔", "#FF7043", false),
            Category::new("Transport", "🚕", "#42A5F5", false),
            Category::new("General", "💳", "#9E9E9E", false),
        ];

        let outcome = parse_statement(text, &pool, &classifier).await;
        assert_eq!(outcome.transactions.len(), 3);

        // newest first: chronological rows 0 and 2 got patched, 1 stayed
        assert_eq!(outcome.transactions[0].category.label, "Transport");
        assert_eq!(outcome.transactions[1].category.label, "General");
        assert_eq!(outcome.transactions[2].category.label, "Food");
    }

    #[tokio::test]
    async fn lazily_created_categories_are_returned() {
        let outcome = parse_statement(SAMPLE, &pool(), &classifier()).await;
        assert!(outcome.new_categories.iter().any(|c| c.label == "Paycheck"));
    }

    #[tokio::test]
    async fn unchanged_balance_rows_are_dropped() {
        let text = "\
01-01-2025 OPENING BALANCE 5,000.00
02-01-2025 BALANCE ENQUIRY 5,000.00
03-01-2025 UPI/1/zomato@ybl 4,800.00
";
        let outcome = parse_statement(text, &pool(), &classifier()).await;
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].amount, 200.0);
    }

    #[tokio::test]
    async fn malformed_text_yields_empty_outcome() {
        let outcome = parse_statement("no transactions here\njust words\n", &pool(), &classifier()).await;
        assert!(outcome.transactions.is_empty());
        assert!(outcome.new_categories.is_empty());
    }

    #[tokio::test]
    async fn repeated_parse_produces_same_doc_ids() {
        let a = parse_statement(SAMPLE, &pool(), &classifier()).await;
        let b = parse_statement(SAMPLE, &pool(), &classifier()).await;
        let ids_a: Vec<&str> = a.transactions.iter().map(|t| t.doc_id.as_str()).collect();
        let ids_b: Vec<&str> = b.transactions.iter().map(|t| t.doc_id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert!(ids_a[0].starts_with("STMT_"));
    }
}
