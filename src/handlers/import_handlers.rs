use crate::app_state::AppState;
use crate::ratelimit::{ActionKind, RateLimitError};
use crate::sms::RawSmsMessage;
use crate::sync::{self, SmsSyncReport};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct SmsSyncParams {
    pub lookback_days: Option<i64>,
}

pub async fn sync_sms_handler(
    State(app_state): State<AppState>,
    Query(params): Query<SmsSyncParams>,
    Json(messages): Json<Vec<RawSmsMessage>>,
) -> Result<Json<SmsSyncReport>, (StatusCode, String)> {
    match sync::sync_sms_messages(&app_state, messages, params.lookback_days).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            error!("Error syncing SMS messages: {:#?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "SMS sync failed".to_string()))
        }
    }
}

/// Statement ingestion is the one surface gated by the rate limiter;
/// everything else degrades silently.
pub async fn import_statement_handler(
    State(app_state): State<AppState>,
    body: String,
) -> Result<String, (StatusCode, String)> {
    if let Err(e) = app_state.rate_limiter.check_limit(ActionKind::StatementUpload) {
        return Err(rate_limit_response(e));
    }

    match sync::import_statement_text(&app_state, &body).await {
        Ok(imported) => Ok(format!("Imported {} transactions", imported)),
        Err(e) => {
            error!("Error importing statement: {:#?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Statement import failed".to_string(),
            ))
        }
    }
}

pub async fn import_csv_handler(
    State(app_state): State<AppState>,
    body: String,
) -> Result<String, (StatusCode, String)> {
    match sync::import_csv_text(&app_state, &body).await {
        Ok(imported) => Ok(format!("Imported {} transactions", imported)),
        Err(e) => {
            error!("Error importing CSV: {:#?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "CSV import failed".to_string(),
            ))
        }
    }
}

/// Sign-out hook: forget the processed-message ids for this session.
pub async fn reset_session_handler(State(app_state): State<AppState>) -> String {
    app_state.session_cache.clear();
    "Session cleared".to_string()
}

fn rate_limit_response(e: RateLimitError) -> (StatusCode, String) {
    match e {
        RateLimitError::Exceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, e.to_string()),
        RateLimitError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}
