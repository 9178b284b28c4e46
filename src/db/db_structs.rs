use super::db_base::{KvFileDb, StructFileDb};
use crate::model::{Category, Transaction};
use tracing::info;

pub type TransactionsDb = StructFileDb<Transaction>;

impl TransactionsDb {
    pub fn new_transaction_db() -> Result<Self, Box<dyn std::error::Error>> {
        let res = StructFileDb::<Transaction>::new("db/transactions.json".to_string());
        info!("Transactions DB initialized.");
        res
    }
}

pub type CategoriesDb = StructFileDb<Category>;

impl CategoriesDb {
    pub fn new_category_db() -> Result<Self, Box<dyn std::error::Error>> {
        let res = StructFileDb::<Category>::new("db/categories.json".to_string());
        info!("Categories DB initialized.");
        res
    }
}

/// Persisted rate-limit windows: per action key, the epoch-ms timestamps of
/// recent requests.
pub type RateLimitDb = KvFileDb<Vec<i64>>;

impl RateLimitDb {
    pub fn new_rate_limit_db() -> Result<Self, Box<dyn std::error::Error>> {
        let res = KvFileDb::<Vec<i64>>::new("db/rate_limits.json".to_string());
        info!("Rate limit DB initialized.");
        res
    }
}
