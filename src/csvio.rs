//! CSV import and export with a fixed column contract:
//! `Date,Note,Amount,Type,Category,PaymentMethod`.
//!
//! Import auto-detects an optional header row and tolerates quoted fields
//! with embedded commas and doubled-quote escaping. Export emits the same
//! columns, so an exported file re-imports cleanly.

use crate::model::{Category, Transaction, TxnKind};
use crate::rules;
use crate::sms::normalize_year;
use chrono::Utc;
use regex::Regex;
use tracing::debug;

pub const CSV_HEADER: &str = "Date,Note,Amount,Type,Category,PaymentMethod";

#[derive(Debug, Clone, Default)]
pub struct CsvOutcome {
    pub transactions: Vec<Transaction>,
    pub new_categories: Vec<Category>,
}

/// Parses the fixed-contract CSV. Rows missing a parsable date or amount
/// are dropped and counted in logs, never raised.
pub fn parse_csv(text: &str, pool: &[Category]) -> CsvOutcome {
    let mut live_pool = pool.to_vec();
    let mut outcome = CsvOutcome::default();
    let mut dropped = 0usize;

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_csv_line(line);
        if index == 0 && looks_like_header(&fields) {
            continue;
        }
        if fields.len() < 6 {
            dropped += 1;
            continue;
        }

        let (Some(date), Some(amount)) = (parse_date(&fields[0]), parse_amount(&fields[2]))
        else {
            dropped += 1;
            continue;
        };

        let kind = parse_kind(&fields[3]);
        let (category, created) = rules::find_or_create(fields[4].trim(), &live_pool);
        if let Some(created) = created {
            live_pool.push(created.clone());
            outcome.new_categories.push(created);
        }

        let mut transaction = Transaction {
            doc_id: String::new(),
            date,
            note: fields[1].trim().to_string(),
            amount,
            kind,
            category,
            payment_method: fields[5].trim().to_string(),
            recurring: Some("none".to_string()),
            created_at: Utc::now().to_rfc3339(),
            sms_id: None,
        };
        transaction.doc_id = format!("CSV_{}", transaction.signature());

        outcome.transactions.push(transaction);
    }

    if dropped > 0 {
        debug!("Dropped {} unparsable CSV rows", dropped);
    }
    outcome
}

/// Quoted-field tokenizer: commas inside quotes are literal, `""` inside a
/// quoted field is an escaped quote.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// The first row is a header when it carries both "date" and "amount".
fn looks_like_header(fields: &[String]) -> bool {
    let lower = fields.join(",").to_lowercase();
    lower.contains("date") && lower.contains("amount")
}

fn parse_amount(raw: &str) -> Option<f64> {
    // currency symbols and thousands separators are noise, the first
    // numeric token is the amount
    let cleaned = raw.replace(',', "");
    let re = Regex::new(r"-?[0-9]+(?:\.[0-9]+)?").unwrap();
    let amount: f64 = re.find(&cleaned)?.as_str().parse().ok()?;
    if amount == 0.0 {
        return None;
    }
    Some(amount.abs())
}

/// `income`/`credit` map to income; everything else is expense.
fn parse_kind(raw: &str) -> TxnKind {
    match raw.trim().to_lowercase().as_str() {
        "income" | "credit" => TxnKind::Income,
        _ => TxnKind::Expense,
    }
}

/// ISO dates pass through; otherwise a `d/m/y`-style split with 2-digit-year
/// normalization to the 2000s.
fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();

    if is_iso_prefixed(raw) {
        let date_part: String = raw.chars().take(10).collect();
        return Some(format!("{}T00:00:00", date_part));
    }

    let parts: Vec<&str> = raw.split(['/', '-', '.']).collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].trim().parse().ok()?;
    let month: u32 = parts[1].trim().parse().ok()?;
    let year = normalize_year(parts[2].trim().parse().ok()?);

    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| format!("{}T00:00:00", d.format("%Y-%m-%d")))
}

fn is_iso_prefixed(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 10
        && bytes[..4].iter().all(|b| b.is_ascii_digit())
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(|b| b.is_ascii_digit())
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(|b| b.is_ascii_digit())
}

trait ToCsv {
    fn header_row() -> &'static str;
    fn to_csv_row(&self) -> String;

    fn format_csv_value(s: &str) -> String {
        if s.contains(',') || s.contains('"') {
            return format!("\"{}\"", s.replace('"', "\"\""));
        }

        s.to_string()
    }
}

pub trait VecToCsv {
    fn to_csv(&self) -> String;
}

impl<T> VecToCsv for Vec<T>
where
    T: ToCsv,
{
    fn to_csv(&self) -> String {
        let mut csv = T::header_row().to_string();
        for item in self {
            csv.push('\n');
            csv.push_str(&item.to_csv_row());
        }
        csv
    }
}

impl ToCsv for Transaction {
    fn header_row() -> &'static str {
        CSV_HEADER
    }

    fn to_csv_row(&self) -> String {
        let note = Self::format_csv_value(&self.note);
        let category = Self::format_csv_value(&self.category.label);
        let payment_method = Self::format_csv_value(&self.payment_method);

        format!(
            "{},{},{:.2},{},{},{}",
            self.date, note, self.amount, self.kind, category, payment_method
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<Category> {
        vec![
            Category::new("Food", "🍔", "#FF7043", false),
            Category::new("General", "💳", "#9E9E9E", false),
        ]
    }

    #[test]
    fn header_row_is_detected_and_skipped() {
        let text = "Date,Note,Amount,Type,Category,PaymentMethod\n2025-01-05,Lunch,250,expense,Food,UPI\n";
        let outcome = parse_csv(text, &pool());
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].note, "Lunch");
    }

    #[test]
    fn headerless_input_parses_from_first_row() {
        let text = "2025-01-05,Lunch,250,expense,Food,UPI\n";
        let outcome = parse_csv(text, &pool());
        assert_eq!(outcome.transactions.len(), 1);
    }

    #[test]
    fn quoted_fields_keep_commas_and_escaped_quotes() {
        let fields = split_csv_line(r#"2025-01-05,"Dinner, with ""friends""",1200,expense,Food,Card"#);
        assert_eq!(fields[1], r#"Dinner, with "friends""#);
        assert_eq!(fields.len(), 6);
    }

    #[test]
    fn amount_strips_currency_noise() {
        let text = "2025-01-05,Lunch,\"Rs. 1,250.50\",expense,Food,UPI\n";
        let outcome = parse_csv(text, &pool());
        assert_eq!(outcome.transactions[0].amount, 1250.5);
    }

    #[test]
    fn type_normalizes_income_and_credit_only() {
        assert_eq!(parse_kind("Income"), TxnKind::Income);
        assert_eq!(parse_kind("credit"), TxnKind::Income);
        assert_eq!(parse_kind("debit"), TxnKind::Expense);
        assert_eq!(parse_kind("whatever"), TxnKind::Expense);
    }

    #[test]
    fn slash_dates_normalize_two_digit_years() {
        let text = "5/1/25,Lunch,250,expense,Food,UPI\n";
        let outcome = parse_csv(text, &pool());
        assert_eq!(outcome.transactions[0].date, "2025-01-05T00:00:00");
    }

    #[test]
    fn iso_dates_pass_through() {
        let text = "2025-01-05T14:30:00,Lunch,250,expense,Food,UPI\n";
        let outcome = parse_csv(text, &pool());
        assert!(outcome.transactions[0].date.starts_with("2025-01-05"));
    }

    #[test]
    fn unknown_category_is_created_with_style_defaults() {
        let text = "2025-01-05,Vet visit,800,expense,Pet Care,Card\n";
        let outcome = parse_csv(text, &pool());
        assert_eq!(outcome.new_categories.len(), 1);
        assert_eq!(outcome.new_categories[0].label, "Pet Care");
        assert!(outcome.new_categories[0].is_custom);
    }

    #[test]
    fn unparsable_rows_are_dropped_silently() {
        let text = "not-a-date,Lunch,250,expense,Food,UPI\n2025-01-05,Ok,100,expense,Food,UPI\n";
        let outcome = parse_csv(text, &pool());
        assert_eq!(outcome.transactions.len(), 1);
    }

    #[test]
    fn export_then_import_round_trips_core_fields() {
        let source = "Date,Note,Amount,Type,Category,PaymentMethod\n\
                      2025-01-05T00:00:00,Lunch,250,expense,Food,UPI\n\
                      2025-02-01T00:00:00,\"Salary, Jan\",55000,income,Paycheck,Bank Account\n";
        let first = parse_csv(source, &pool());

        let exported = first.transactions.to_csv();
        let second = parse_csv(&exported, &pool());

        assert_eq!(first.transactions.len(), second.transactions.len());
        for (a, b) in first.transactions.iter().zip(second.transactions.iter()) {
            assert_eq!(a.date, b.date);
            assert_eq!(a.amount, b.amount);
            assert_eq!(a.kind, b.kind);
        }
    }
}
