use serde::{Deserialize, Serialize};

use super::Category;

/// Direction of a transaction. Derived during extraction, never both.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TxnKind {
    Income,
    #[default]
    Expense,
}

/// A structured transaction produced by one of the extraction paths.
///
/// Invariants: `amount > 0` (direction lives in `kind`), `category` is always
/// populated (falls back to "General", never null). `doc_id` is derived from
/// the source (`SMS_<id>`, or signature-based for statement/CSV rows) so a
/// repeated ingestion overwrites the same record.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub doc_id: String,

    /// ISO-8601 date-time, e.g. "2025-01-05T14:30:00".
    pub date: String,

    pub note: String,

    /// Always positive; see `kind` for direction.
    pub amount: f64,

    #[serde(rename = "type")]
    pub kind: TxnKind,

    pub category: Category,

    pub payment_method: String,

    pub recurring: Option<String>,

    /// ISO-8601 creation timestamp.
    pub created_at: String,

    /// Device message-store id, present only for SMS-sourced transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_id: Option<u64>,
}

impl Transaction {
    /// Stable fingerprint used to suppress re-import of a transaction that is
    /// already present, independent of source-specific ids.
    ///
    /// Shape: `amount-type-dateOnly-normalizedNote`.
    pub fn signature(&self) -> String {
        let date_only: String = self.date.chars().take(10).collect();
        let note: String = self
            .note
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        format!("{:.2}-{}-{}-{}", self.amount, self.kind, date_only, note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(note: &str, amount: f64, kind: TxnKind, date: &str) -> Transaction {
        Transaction {
            doc_id: "SMS_1".to_string(),
            date: date.to_string(),
            note: note.to_string(),
            amount,
            kind,
            category: Category::new("General", "💰", "#9E9E9E", false),
            payment_method: "UPI".to_string(),
            recurring: Some("none".to_string()),
            created_at: "2025-01-05T00:00:00".to_string(),
            sms_id: Some(1),
        }
    }

    #[test]
    fn signature_drops_time_and_note_punctuation() {
        let t = sample("Amazon Pay!", 450.0, TxnKind::Expense, "2025-01-05T14:30:00");
        assert_eq!(t.signature(), "450.00-expense-2025-01-05-amazonpay");
    }

    #[test]
    fn signature_is_case_insensitive_on_note() {
        let a = sample("ZOMATO", 120.5, TxnKind::Expense, "2025-02-01T09:00:00");
        let b = sample("Zomato", 120.5, TxnKind::Expense, "2025-02-01T23:59:59");
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signature_distinguishes_direction() {
        let a = sample("refund", 99.0, TxnKind::Income, "2025-02-01T00:00:00");
        let b = sample("refund", 99.0, TxnKind::Expense, "2025-02-01T00:00:00");
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn serializes_with_contract_field_names() {
        let t = sample("Zomato", 120.5, TxnKind::Expense, "2025-02-01T09:00:00");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "expense");
        assert_eq!(json["paymentMethod"], "UPI");
        assert_eq!(json["category"]["isCustom"], false);
        assert_eq!(json["smsId"], 1);
    }
}
