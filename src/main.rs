use axum::{
    Router,
    routing::{get, post},
};
use clokwerk::{Job, Scheduler, TimeUnits};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use tracing::info;
use txn_lens_connector::app_state::AppState;
use txn_lens_connector::db::{CategoriesDb, RateLimitDb, TransactionsDb};
use txn_lens_connector::genai::GeminiClassifier;
use txn_lens_connector::handlers::{
    import_csv_handler, import_statement_handler, list_categories_handler,
    list_transactions_handler, reset_session_handler, sync_sms_handler,
    transactions_to_csv_handler,
};
use txn_lens_connector::model::Category;
use txn_lens_connector::ratelimit::RateLimiter;
use txn_lens_connector::rules;
use txn_lens_connector::sync::{SessionCache, reclassify_uncategorized};

#[tokio::main]
async fn main() {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // init file DBs
    let transaction_db: TransactionsDb = match TransactionsDb::new_transaction_db() {
        Ok(db) => db,
        Err(e) => {
            error!("Error creating TransactionsDb: {:#?}", e);
            return;
        }
    };

    let category_db: CategoriesDb = match CategoriesDb::new_category_db() {
        Ok(db) => db,
        Err(e) => {
            error!("Error creating CategoriesDb: {:#?}", e);
            return;
        }
    };

    let rate_limit_db: RateLimitDb = match RateLimitDb::new_rate_limit_db() {
        Ok(db) => db,
        Err(e) => {
            error!("Error creating RateLimitDb: {:#?}", e);
            return;
        }
    };

    // fail-open: extraction availability beats strict throttling here
    let rate_limiter = RateLimiter::new(Arc::new(rate_limit_db), true);
    let classifier = GeminiClassifier::from_env(rate_limiter.clone());

    // App State
    let app_state = AppState {
        transaction_db,
        category_db,
        rate_limiter,
        classifier,
        session_cache: SessionCache::new(),
    };

    // seed the default category pool on first run
    if let Err(e) = seed_default_categories(&app_state) {
        error!("Error seeding categories: {:#?}", e);
        return;
    }

    // retry AI categorization on anything still in the generic bucket
    // (only transactions the rules could not place), in a separate task
    run_reclassify_job(&app_state);

    // Create a new scheduler
    let mut scheduler = Scheduler::new();
    if let Ok(at) = dotenv::var("SCHEDULER_RECLASSIFY_AT") {
        let app_state = (&app_state).clone();
        scheduler.every(1.day()).at(&at).run(move || {
            let app_state = app_state.clone();
            run_reclassify_job(&app_state);
        });
    } else {
        info!("SCHEDULER_RECLASSIFY_AT not set, daily reclassification disabled.");
    }

    // Run scheduler loop in a spawned task
    tokio::spawn(async move {
        info!("Scheduler started.");
        loop {
            scheduler.run_pending();
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    });

    // build our application with a route
    let app = Router::new()
        .route("/", get(root))
        .route("/sync/sms", post(sync_sms_handler))
        .route("/import/statement", post(import_statement_handler))
        .route("/import/csv", post(import_csv_handler))
        .route("/transactions", get(list_transactions_handler))
        .route("/transactions/csv", get(transactions_to_csv_handler))
        .route("/categories", get(list_categories_handler))
        .route("/session/reset", post(reset_session_handler))
        .with_state(app_state)
        .layer((
            TraceLayer::new_for_http(),
            // Graceful shutdown will wait for outstanding requests to complete. Add a timeout so
            // requests don't hang forever.
            TimeoutLayer::new(Duration::from_secs(30)),
        ));

    // run our app with hyper, listening globally on port 3000
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn root() -> String {
    "ok".to_string()
}

fn run_reclassify_job(app_state: &AppState) {
    let app_state = app_state.clone();
    tokio::spawn(async move {
        if let Err(e) = reclassify_uncategorized(app_state).await {
            error!("Error reclassifying transactions: {:#?}", e);
        }
    });
}

fn seed_default_categories(app_state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    if !app_state.category_db.is_data_empty() {
        return Ok(());
    }

    info!("No categories found, seeding defaults.");
    let defaults = [
        "General",
        "Food",
        "Groceries",
        "Shopping",
        "Transport",
        "Entertainment",
        "Bills",
        "Health",
        "Paycheck",
        "Income",
        "Investments",
    ];
    let categories: Vec<Category> = defaults
        .iter()
        .map(|label| {
            let (emoji, color) = rules::style_for(label);
            Category::new(label, emoji, color, false)
        })
        .collect();
    app_state.category_db.save(categories)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down.");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down.");
        },
    }
}
