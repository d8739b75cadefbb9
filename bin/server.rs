// Receipt Ledger - Web Server
// REST API with Axum: ledger listing, mail fetch, bank comparison

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use receipt_ledger::{
    compare, get_all_receipts, ledger_receipts, parse_bank_csv, setup_database, AppConfig,
    BatchReport, ComparedTransaction, EmlDirectoryMailbox, ExtractionBatch, MailboxConfig,
    PatternExtractor, PdfTextDecoder, ReconciliationSummary, StoredReceipt,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn failure<T: Serialize>(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(ApiResponse::<T>::err(message))).into_response()
}

#[derive(Serialize)]
struct LedgerResponse {
    receipts: Vec<StoredReceipt>,
}

#[derive(Serialize)]
struct FetchResponse {
    inserted: usize,
    #[serde(flatten)]
    report: BatchReport,
}

#[derive(Serialize)]
struct CompareResponse {
    compared: Vec<ComparedTransaction>,
    summary: ReconciliationSummary,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// Read every stored receipt on the blocking pool
async fn load_receipts(db: Arc<Mutex<Connection>>) -> anyhow::Result<Vec<StoredReceipt>> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<StoredReceipt>> {
        let conn = db.lock().map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        get_all_receipts(&conn)
    })
    .await
    .map_err(|e| anyhow::anyhow!("ledger read task failed: {}", e))?
}

/// GET /api/ledger - All stored receipts
async fn get_ledger(State(state): State<AppState>) -> impl IntoResponse {
    match load_receipts(state.db.clone()).await {
        Ok(receipts) => (StatusCode::OK, Json(ApiResponse::ok(LedgerResponse { receipts }))).into_response(),
        Err(e) => {
            error!("Error getting receipts: {:#}", e);
            failure::<LedgerResponse>(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load receipts")
        }
    }
}

/// POST /api/email/fetch - Extract receipts from unseen mail and store them
async fn fetch_email(State(state): State<AppState>) -> impl IntoResponse {
    let mailbox_config = match MailboxConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Mailbox not configured: {}", e);
            return failure::<FetchResponse>(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
        }
    };

    let db = state.db.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<BatchReport> {
        let mut mailbox = EmlDirectoryMailbox::connect(&mailbox_config)?;
        let decoder = PdfTextDecoder;
        let extractor = PatternExtractor::new();
        let batch = ExtractionBatch::new(&decoder, &extractor);

        // Decode outside the lock; only the ledger write holds it
        let (report, messages) = batch.extract(&mut mailbox)?;
        let conn = db.lock().map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        Ok(batch.store(report, &messages, &mut mailbox, &conn)?)
    })
    .await;

    match result {
        Ok(Ok(report)) => {
            info!("{}", report.summary());
            let response = FetchResponse {
                inserted: report.receipts.len() - report.duplicates_skipped,
                report,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Ok(Err(e)) => {
            error!("Email parse/store error: {:#}", e);
            failure::<FetchResponse>(StatusCode::INTERNAL_SERVER_ERROR, "Failed to parse and store emails")
        }
        Err(e) => {
            error!("Fetch task failed: {}", e);
            failure::<FetchResponse>(StatusCode::INTERNAL_SERVER_ERROR, "Failed to parse and store emails")
        }
    }
}

/// POST /api/compare - Body: bank statement CSV. Compares against stored receipts.
async fn compare_bank_feed(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let bank = match parse_bank_csv(body.as_bytes()) {
        Ok(bank) => bank,
        Err(e) => {
            return failure::<CompareResponse>(StatusCode::BAD_REQUEST, format!("Invalid bank CSV: {:#}", e));
        }
    };

    let stored = match load_receipts(state.db.clone()).await {
        Ok(stored) => stored,
        Err(e) => {
            error!("Error getting receipts: {:#}", e);
            return failure::<CompareResponse>(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load receipts");
        }
    };

    let compared = compare(&ledger_receipts(&stored), &bank);
    let summary = ReconciliationSummary::from_results(&compared);
    info!("{}", summary.summary());

    (StatusCode::OK, Json(ApiResponse::ok(CompareResponse { compared, summary }))).into_response()
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ledger", get(get_ledger))
        .route("/email/fetch", post(fetch_email))
        .route("/compare", post(compare_bank_feed))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    receipt_ledger::init_tracing();

    let config = AppConfig::from_env();

    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;
    info!("Database opened: {}", config.db_path.display());

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    info!("🚀 Server running on http://{}", config.server_addr);
    info!("   API: http://{}/api/ledger", config.server_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
