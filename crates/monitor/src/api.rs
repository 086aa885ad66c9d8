//! HTTP API for ingestion, queries, health checks and Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::render_metrics,
    reporting::AlertSummaryRow,
    AlertRecord, DetectionEngine, IngestOutcome, MonitorError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

/// Default number of records returned by `/api/alerts`
pub const DEFAULT_ALERT_LIMIT: usize = 10;

/// Default lookback of `/api/alerts/summary`
pub const DEFAULT_SUMMARY_MINUTES: u32 = 60;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DetectionEngine>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(engine: Arc<DetectionEngine>, health_registry: HealthRegistry) -> Self {
        Self {
            engine,
            health_registry,
        }
    }
}

/// JSON error body with an HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        if err.is_validation() {
            Self::bad_request(err.to_string())
        } else {
            error!(error = %err, "Request failed");
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub timestamp: String,
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    #[serde(flatten)]
    pub outcome: IngestOutcome,
    /// `ALERT` when an alert was emitted, otherwise `OK`
    pub recommendation: &'static str,
}

/// Ingest one per-minute count and return its evaluation
async fn ingest_transaction(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = state
        .engine
        .ingest(&request.timestamp, &request.status, request.count)?;

    let recommendation = if outcome.should_alert { "ALERT" } else { "OK" };
    Ok(Json(TransactionResponse {
        outcome,
        recommendation,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub window: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WindowResponse<T> {
    window_minutes: u32,
    as_of: DateTime<Utc>,
    metrics: T,
}

/// Current window metrics for every status
async fn window_metrics(
    State(state): State<Arc<AppState>>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let window = query
        .window
        .unwrap_or(state.engine.config().window_minutes);
    if window == 0 {
        return Err(ApiError::bad_request("window must be at least 1 minute"));
    }

    Ok(Json(WindowResponse {
        window_minutes: window,
        as_of: state.engine.reference_time(),
        metrics: state.engine.window_metrics(window),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AlertsResponse {
    alerts: Vec<AlertRecord>,
}

/// Recent alert records, newest first
async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AlertsQuery>, QueryRejection>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    Ok(Json(AlertsResponse {
        alerts: state.engine.recent_alerts(limit),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub minutes: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    minutes: u32,
    summary: Vec<AlertSummaryRow>,
}

async fn alert_summary(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let Query(query) = query?;
    let minutes = query.minutes.unwrap_or(DEFAULT_SUMMARY_MINUTES);
    Ok(Json(SummaryResponse {
        minutes,
        summary: state.engine.alert_summary(minutes),
    }))
}

/// Last published baseline snapshot
async fn baseline(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.baseline_snapshot();
    Json(json!({
        "loaded": state.engine.baseline_loaded(),
        "baseline": &*snapshot,
    }))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still evaluating
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    match render_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/transaction", post(ingest_transaction))
        .route("/api/metrics", get(window_metrics))
        .route("/api/alerts", get(recent_alerts))
        .route("/api/alerts/summary", get(alert_summary))
        .route("/api/baseline", get(baseline))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
