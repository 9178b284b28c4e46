use crate::app_state::AppState;
use crate::csvio::VecToCsv;
use axum::extract::State;

pub async fn list_transactions_handler(State(app_state): State<AppState>) -> String {
    serde_json::to_string_pretty(&app_state.transaction_db.data()).unwrap()
}

pub async fn transactions_to_csv_handler(State(app_state): State<AppState>) -> String {
    app_state.transaction_db.data().to_csv()
}

pub async fn list_categories_handler(State(app_state): State<AppState>) -> String {
    serde_json::to_string_pretty(&app_state.category_db.data()).unwrap()
}
