// Payment Claim Verifier - Web Server
// Hosts the claim form and a JSON API over the same claim desk as the CLI

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use claim_verifier::{
    count_submissions, get_submissions_by_reference, AppConfig, ClaimDesk, ClaimForm,
    SqliteSubmissionStore, StoreError,
};

/// Shared application state.
/// One mutex around the desk: verify + append never interleave.
#[derive(Clone)]
struct AppState {
    desk: Arc<Mutex<ClaimDesk<SqliteSubmissionStore>>>,
}

impl AppState {
    fn desk(&self) -> MutexGuard<'_, ClaimDesk<SqliteSubmissionStore>> {
        // Each claim is a single transaction, so a poisoned lock still guards a consistent log
        self.desk.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
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

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn store_failure(context: &str, e: StoreError) -> Response {
    error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(format!("{}: {}", context, e)),
        }),
    )
        .into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// POST /api/claims - Submit a payment claim
async fn submit_claim(State(state): State<AppState>, Json(form): Json<ClaimForm>) -> Response {
    let mut desk = state.desk();

    match desk.submit(&form) {
        Ok(receipt) => ApiResponse::ok(receipt),
        Err(e) => store_failure("Error recording claim", e),
    }
}

/// GET /api/submissions - Full submission log
async fn list_submissions(State(state): State<AppState>) -> Response {
    let desk = state.desk();

    match desk.submissions() {
        Ok(submissions) => ApiResponse::ok(submissions),
        Err(e) => store_failure("Error loading submissions", e),
    }
}

/// GET /api/submissions/:reference - Submissions for one reference
/// (`Path` has already percent-decoded the segment)
async fn submissions_for_reference(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Response {
    let desk = state.desk();

    match get_submissions_by_reference(desk.store().connection(), &reference) {
        Ok(submissions) => ApiResponse::ok(submissions),
        Err(e) => store_failure("Error loading submissions", e),
    }
}

/// GET /api/summary - Dashboard tally
async fn get_summary(State(state): State<AppState>) -> Response {
    let desk = state.desk();

    match desk.summary() {
        Ok(summary) => ApiResponse::ok(summary),
        Err(e) => store_failure("Error building summary", e),
    }
}

/// GET / - Serve the claim form
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/claims", axum::routing::post(submit_claim))
        .route("/submissions", get(list_submissions))
        .route("/submissions/:reference", get(submissions_for_reference))
        .route("/summary", get(get_summary))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    info!("🌐 Payment Claim Verifier - Web Server");

    let config = AppConfig::load_default().context("Failed to load config")?;

    let store = SqliteSubmissionStore::open(&config.storage.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.storage.database_path))?;
    info!(
        path = ?config.storage.database_path,
        submissions = count_submissions(store.connection())?,
        "database opened"
    );

    let desk = ClaimDesk::new(config.build_verifier()?, store)?;
    let state = AppState {
        desk: Arc::new(Mutex::new(desk)),
    };

    let addr = &config.server.bind_address;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("🚀 Server running on http://{}", addr);

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use claim_verifier::ClaimVerifier;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        let desk = ClaimDesk::new(ClaimVerifier::default(), store).unwrap();
        app(AppState {
            desk: Arc::new(Mutex::new(desk)),
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_claim(reference: &str, amount: &str) -> Request<Body> {
        let body = serde_json::json!({
            "reference": reference,
            "amount": amount,
            "contact": "9876543210",
            "address": "7 Lake View",
        });
        Request::post("/api/claims")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = send(&app, get_request("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_claim_then_reuse() {
        let app = test_app();

        let (status, first) = send(&app, post_claim("TXN001DEF", "500.00")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["data"]["result"]["status"], "verified");
        assert_eq!(first["data"]["summary"]["verified"], 1);

        let (_, second) = send(&app, post_claim("txn001def", "500.00")).await;
        assert_eq!(second["data"]["result"]["status"], "fraud");
        assert_eq!(second["data"]["result"]["reason"], "AlreadyUsed");

        let (_, summary) = send(&app, get_request("/api/summary")).await;
        assert_eq!(summary["data"]["total"], 2);
        assert_eq!(summary["data"]["fraud"], 1);
        assert_eq!(summary["data"]["verified_rows"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_amount_is_not_found() {
        let app = test_app();

        let (_, body) = send(&app, post_claim("PAY789LMN", "abc")).await;
        assert_eq!(body["data"]["result"]["status"], "not-found");
        assert!(body["data"]["submission"]["amount"].is_null());
    }

    #[tokio::test]
    async fn test_submissions_by_reference() {
        let app = test_app();

        send(&app, post_claim("PAY789LMN", "299.00")).await;
        send(&app, post_claim("UNKNOWN999", "50.00")).await;

        let (_, all) = send(&app, get_request("/api/submissions")).await;
        assert_eq!(all["data"].as_array().unwrap().len(), 2);

        let (_, one) = send(&app, get_request("/api/submissions/pay789lmn")).await;
        let rows = one["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], "verified");
    }

    #[tokio::test]
    async fn test_reference_path_decoded_once() {
        let app = test_app();

        send(&app, post_claim("A%41", "1.00")).await;
        send(&app, post_claim("AA", "1.00")).await;

        let (_, body) = send(&app, get_request("/api/submissions/A%2541")).await;
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["reference"], "A%41");
    }

    #[tokio::test]
    async fn test_one_cent_off_claim_not_found() {
        let app = test_app();

        let (_, body) = send(&app, post_claim("PAY789LMN", "299.01")).await;
        assert_eq!(body["data"]["result"]["status"], "not-found");

        let (_, body) = send(&app, post_claim("PAY789LMN", "299.00 INR")).await;
        assert_eq!(body["data"]["result"]["status"], "verified");
        assert_eq!(body["data"]["submission"]["amount"], "299.00");
    }

    #[tokio::test]
    async fn test_form_page_checks_response_before_parsing() {
        let app = test_app();

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("res.ok"));
        assert!(page.contains("res.text()"));
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let app = test_app();

        let request = Request::post("/api/claims")
            .header("content-type", "application/json")
            .body(Body::from("{\"amount\": \"1\"}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
    }
}
