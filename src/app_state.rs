use crate::db::{CategoriesDb, TransactionsDb};
use crate::genai::GeminiClassifier;
use crate::ratelimit::RateLimiter;
use crate::sync::SessionCache;

#[derive(Clone)]
pub struct AppState {
    pub transaction_db: TransactionsDb,
    pub category_db: CategoriesDb,
    pub rate_limiter: RateLimiter,
    pub classifier: GeminiClassifier,
    pub session_cache: SessionCache,
}
