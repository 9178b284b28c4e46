//! Bank-SMS filtering and field extraction.
//!
//! Messages are first gated (`is_bank_sms`) to throw away OTPs and
//! promotional noise, then parsed with ordered regex attempts for amount,
//! direction, merchant and date. Parsing never fails past this boundary:
//! a message without an extractable amount yields `None`.

use crate::model::{Category, Transaction, TxnKind};
use crate::rules::{self, Resolution};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

/// An inbound message as read from the device message store.
#[derive(Default, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSmsMessage {
    /// Message-store id; the persisted doc id is derived from it.
    pub id: u64,
    pub address: String,
    pub body: String,
    /// Receipt timestamp, epoch milliseconds.
    pub date: i64,
}

#[derive(Debug, Clone)]
pub struct ParsedSms {
    pub transaction: Transaction,
    pub created: Option<Category>,
}

const OTP_KEYWORDS: &[&str] = &[
    "otp",
    "one time password",
    "one-time password",
    "verification code",
    "login",
    "log in",
    "password",
];

const TXN_KEYWORDS: &[&str] = &[
    "debited",
    "credited",
    "spent",
    "paid",
    "withdrawn",
    "deposited",
    "a/c",
    "acct",
    "txn",
    "purchase",
    "refund",
];

/// Accepts only messages that look like bank transaction notifications.
/// OTP/login vocabulary rejects outright; otherwise at least one
/// transaction keyword is required (this also drops promotional senders
/// and person-to-person chatter from numeric addresses).
pub fn is_bank_sms(message: &RawSmsMessage) -> bool {
    let body = message.body.to_lowercase();

    if OTP_KEYWORDS.iter().any(|k| body.contains(*k)) {
        return false;
    }

    TXN_KEYWORDS.iter().any(|k| body.contains(*k))
}

/// Extracts a structured transaction from a bank SMS.
///
/// Returns `None` when no plausible amount can be found; the caller counts
/// that as a parse failure, not a skip.
pub fn parse_transaction(message: &RawSmsMessage, pool: &[Category]) -> Option<ParsedSms> {
    let body = &message.body;

    let amount = extract_amount(body)?;
    let kind = infer_direction(body);

    let merchant = extract_merchant(body);
    let Resolution {
        category,
        matched_keyword,
        created,
    } = rules::resolve(&merchant, body, pool, kind == TxnKind::Income);

    // brand-matched notes are normalized for consistency across banks;
    // transfer vocabulary resolves to General and keeps the merchant name
    let note = match &matched_keyword {
        Some(keyword) if category.label != rules::GENERAL_LABEL => title_case(keyword),
        _ => merchant,
    };

    let date = extract_date(body, message.date);

    let transaction = Transaction {
        doc_id: format!("SMS_{}", message.id),
        date: date.format("%Y-%m-%dT%H:%M:%S").to_string(),
        note,
        amount,
        kind,
        category,
        payment_method: payment_method_of(body),
        recurring: Some("none".to_string()),
        created_at: Utc::now().to_rfc3339(),
        sms_id: Some(message.id),
    };

    Some(ParsedSms {
        transaction,
        created,
    })
}

/// First currency-prefixed numeric token, thousands separators stripped.
/// Amounts above 10,000,000 are treated as extraction noise.
pub fn extract_amount(body: &str) -> Option<f64> {
    let re = Regex::new(r"(?i)(?:rs\.?|inr|₹)\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)").unwrap();
    let caps = re.captures(body)?;
    let raw = caps.get(1)?.as_str().replace(',', "");
    let amount: f64 = raw.parse().ok()?;

    if amount <= 0.0 || amount > 10_000_000.0 {
        return None;
    }
    Some(amount)
}

/// Credit vs debit vocabulary; when both appear, refund wording wins as
/// income, otherwise expense.
pub fn infer_direction(body: &str) -> TxnKind {
    let credit = Regex::new(r"(?i)\b(credited|received|deposited|credit)\b").unwrap();
    let debit = Regex::new(r"(?i)\b(debited|spent|paid|withdrawn|sent|purchase|debit)\b").unwrap();
    let refund = Regex::new(r"(?i)\b(refund|refunded|reversal|cashback)\b").unwrap();

    let is_credit = credit.is_match(body);
    let is_debit = debit.is_match(body);

    match (is_credit, is_debit) {
        (true, true) => {
            if refund.is_match(body) {
                TxnKind::Income
            } else {
                TxnKind::Expense
            }
        }
        (true, false) => TxnKind::Income,
        _ => TxnKind::Expense,
    }
}

/// Ordered merchant extraction: UPI counterparty, "to/at <name>", POS
/// merchant, ATM, then a cleaned token-window fallback.
pub fn extract_merchant(body: &str) -> String {
    let attempts = [
        Regex::new(r"(?i)\bupi[/:-]+(?:p2[pam][/:-]+)?(?:\d+[/:-]+)?([a-z][a-z0-9 ._-]{2,40})")
            .unwrap(),
        Regex::new(r"(?i)\b(?:to|at)\s+([A-Za-z][A-Za-z0-9&'. _-]{2,40}?)(?:\s+(?:on|via|ref|using|upi|from)\b|[.,;\n]|$)")
            .unwrap(),
        Regex::new(r"(?i)\bpos\s+(?:\d+\s+)?([A-Za-z][A-Za-z0-9&'. _-]{2,40})").unwrap(),
    ];

    for re in &attempts {
        if let Some(caps) = re.captures(body) {
            if let Some(m) = caps.get(1) {
                let name = m.as_str().split('@').next().unwrap_or("").trim();
                if !name.is_empty() {
                    return title_case(name);
                }
            }
        }
    }

    if body.to_lowercase().contains("atm") {
        return "ATM Withdrawal".to_string();
    }

    fallback_merchant(body)
}

/// Strips currency/account/balance noise and takes the first three
/// alphabetic tokens of at least three characters.
fn fallback_merchant(body: &str) -> String {
    const STOPWORDS: &[&str] = &[
        "debited", "credited", "spent", "paid", "withdrawn", "deposited", "sent", "received",
        "purchase", "refund", "from", "your", "has", "been", "with", "the", "for", "and", "info",
        "dear", "customer", "bank", "account", "acct", "avl", "avbl", "bal", "balance", "txn",
        "transaction", "ref", "call", "sms", "inr", "not", "you", "via",
    ];

    let tokens: Vec<String> = body
        .split(|c: char| c.is_whitespace() || c == '/' || c == ',' || c == ':')
        .map(|t| t.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|t| t.len() >= 3)
        .filter(|t| t.chars().all(|c| c.is_ascii_alphabetic()))
        .filter(|t| !STOPWORDS.contains(&t.to_lowercase().as_str()))
        .take(3)
        .map(title_case)
        .collect();

    if tokens.is_empty() {
        "Unknown".to_string()
    } else {
        tokens.join(" ")
    }
}

/// In-body date, month-name pattern preferred over the ambiguous numeric
/// `dd/mm/yy` form; falls back to the receipt timestamp. An embedded time
/// token refines hours/minutes/seconds.
pub fn extract_date(body: &str, receipt_ms: i64) -> NaiveDateTime {
    let date = extract_body_date(body).unwrap_or_else(|| receipt_datetime(receipt_ms).date());

    let time_re = Regex::new(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?\b").unwrap();
    if let Some(caps) = time_re.captures(body) {
        let hour: u32 = caps[1].parse().unwrap_or(0);
        let minute: u32 = caps[2].parse().unwrap_or(0);
        let second: u32 = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        if let Some(dt) = date.and_hms_opt(hour, minute, second) {
            return dt;
        }
    }

    date.and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| receipt_datetime(receipt_ms))
}

fn extract_body_date(body: &str) -> Option<NaiveDate> {
    let month_re = Regex::new(
        r"(?i)\b(\d{1,2})[-/ ]?(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*[-/ ]?(\d{2,4})\b",
    )
    .unwrap();
    if let Some(caps) = month_re.captures(body) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2].to_lowercase())?;
        let year = normalize_year(caps[3].parse().ok()?);
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }

    let numeric_re = Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})\b").unwrap();
    if let Some(caps) = numeric_re.captures(body) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = normalize_year(caps[3].parse().ok()?);
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }

    None
}

fn receipt_datetime(receipt_ms: i64) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp_millis(receipt_ms)
        .unwrap_or_default()
        .naive_utc()
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: &[&str] = &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

pub fn normalize_year(year: i32) -> i32 {
    if year < 100 { year + 2000 } else { year }
}

fn payment_method_of(body: &str) -> String {
    let lower = body.to_lowercase();
    if lower.contains("upi") {
        "UPI"
    } else if lower.contains("atm") {
        "Cash"
    } else if lower.contains("card") {
        "Card"
    } else if lower.contains("neft") || lower.contains("imps") || lower.contains("rtgs") {
        "Bank Transfer"
    } else {
        "Bank Account"
    }
    .to_string()
}

pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
