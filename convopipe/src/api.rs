//! Read-only HTTP API over published artifacts
//!
//! | Route | Returns |
//! |-------|---------|
//! | `GET /` | Service name, version and endpoints |
//! | `GET /health` | `{"status": "healthy"}` |
//! | `GET /v1/metrics?date=YYYY-MM-DD` | `metrics.json` for the date |
//! | `GET /v1/reports?date=YYYY-MM-DD` | `run_latest.json` for the date |
//!
//! Errors are `{"detail": "..."}` with 400 for a bad date, 404 for a missing
//! artifact and 500 for anything else.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use convopipe_core::config::parse_date;
use convopipe_core::output::{metrics_key, report_key};
use convopipe_core::{Error, Storage};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "convopipe API";

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    date: Option<String>,
}

/// Error response with a `detail` message
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/metrics", get(get_metrics))
        .route("/v1/reports", get(get_reports))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/v1/metrics": "Get daily metrics by date",
            "/v1/reports": "Get daily reports by date",
        },
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, ApiError> {
    let date = validate_date(&query)?;
    fetch_json(state.storage, metrics_key(date)).await
}

async fn get_reports(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, ApiError> {
    let date = validate_date(&query)?;
    fetch_json(state.storage, report_key(date)).await
}

fn validate_date(query: &DateQuery) -> Result<NaiveDate, ApiError> {
    let raw = query.date.as_deref().ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "date query parameter is required (YYYY-MM-DD)",
        )
    })?;
    parse_date(raw).map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Invalid date {:?}, expected a real date in YYYY-MM-DD format", raw),
        )
    })
}

/// Read and decode one artifact. Storage calls block, so they run off the
/// async workers.
async fn fetch_json(storage: Arc<dyn Storage>, key: String) -> Result<Json<Value>, ApiError> {
    let read_key = key.clone();
    let content = tokio::task::spawn_blocking(move || storage.read_to_string(&read_key))
        .await
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unexpected error: {}", e),
            )
        })?;

    let content = content.map_err(|e| match e {
        Error::NotFound(_) => ApiError::new(
            StatusCode::NOT_FOUND,
            format!("File not found for the specified date: {}", key),
        ),
        other => {
            tracing::error!(key = %key, error = %other, "Failed to read artifact");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error retrieving file from storage: {}", other),
            )
        }
    })?;

    serde_json::from_str(&content).map(Json).map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unexpected error: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use convopipe_core::storage::LocalStore;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app() -> (TempDir, Arc<LocalStore>, Router) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(temp.path()).unwrap());
        let router = router(AppState {
            storage: store.clone(),
        });
        (temp, store, router)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (_temp, _store, router) = app();

        let (status, body) = get_json(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy"}));

        let (status, body) = get_json(router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], SERVICE_NAME);
        assert!(body["endpoints"]["/v1/metrics"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_returned_verbatim() {
        let (_temp, store, router) = app();
        let metrics = json!({"date": "2026-01-03", "metrics": [], "total_conversations": 0, "total_events_processed": 0});
        store
            .write_json("curated/metrics_daily/date=2026-01-03/metrics.json", &metrics)
            .unwrap();

        let (status, body) = get_json(router, "/v1/metrics?date=2026-01-03").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, metrics);
    }

    #[tokio::test]
    async fn test_reports_missing_is_404() {
        let (_temp, _store, router) = app();
        let (status, body) = get_json(router, "/v1/reports?date=2026-01-03").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("reports/date=2026-01-03/run_latest.json"));
    }

    #[tokio::test]
    async fn test_bad_dates_are_400() {
        let (_temp, _store, router) = app();
        for uri in [
            "/v1/metrics?date=2026-1-3",
            "/v1/metrics?date=2026-02-30",
            "/v1/reports?date=../etc",
            "/v1/reports",
        ] {
            let (status, body) = get_json(router.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["detail"].is_string());
        }
    }

    #[tokio::test]
    async fn test_corrupt_artifact_is_500() {
        let (_temp, store, router) = app();
        store
            .write_lines("reports/date=2026-01-03/run_latest.json", &["{not json".to_string()])
            .unwrap();
        let (status, body) = get_json(router, "/v1/reports?date=2026-01-03").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].is_string());
    }
}
