mod category;
mod transaction;

pub use self::category::*;
pub use self::transaction::*;

/// Persistence key of a stored record. Keys are source-derived
/// (e.g. "SMS_1042") so re-ingestion overwrites instead of duplicating.
pub trait HasDocId {
    fn doc_id(&self) -> &str;
}

impl HasDocId for Transaction {
    fn doc_id(&self) -> &str {
        &self.doc_id
    }
}

impl HasDocId for Category {
    fn doc_id(&self) -> &str {
        &self.id
    }
}

pub trait Sortable {
    fn sortable_value(&self) -> impl Ord;
}

impl Sortable for Transaction {
    fn sortable_value(&self) -> impl Ord {
        self.date.clone()
    }
}

impl Sortable for Category {
    fn sortable_value(&self) -> impl Ord {
        self.label.to_lowercase()
    }
}
