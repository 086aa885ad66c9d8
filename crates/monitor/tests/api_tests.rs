//! Integration tests for the monitor API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeDelta, TimeZone, Utc};
use monitor_lib::{
    health::{components, HealthRegistry},
    DetectionEngine, DetectorConfig, Observation, TransactionStatus,
};
use std::sync::Arc;
use tower::ServiceExt;
use transaction_monitor::api::{create_router, AppState};

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::BASELINE).await;

    let engine = Arc::new(DetectionEngine::new(DetectorConfig::default()).unwrap());
    let state = Arc::new(AppState::new(engine, health_registry));
    let router = create_router(state.clone());

    (router, state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Healthy traffic for the 15 minutes ending at 13:59
fn seed_quiet_window(engine: &DetectionEngine) {
    let start = Utc.with_ymd_and_hms(2025, 7, 12, 13, 45, 0).unwrap();
    let observations = (0..15).flat_map(|m| {
        let ts = start + TimeDelta::minutes(m);
        [
            Observation::new(ts, TransactionStatus::Approved, 100),
            Observation::new(ts, TransactionStatus::Denied, 5),
        ]
    });
    engine.seed(observations);
}

#[tokio::test]
async fn test_ingest_quiet_traffic_recommends_ok() {
    let (app, state) = setup_test_app().await;
    seed_quiet_window(&state.engine);

    let response = app
        .oneshot(post_json(
            "/api/transaction",
            serde_json::json!({
                "timestamp": "2025-07-12 13:59:30",
                "status": "approved",
                "count": 100
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["recommendation"], "OK");
    assert_eq!(body["should_alert"], false);
    assert_eq!(body["severity"], "INFO");
    assert_eq!(body["timestamp"], "2025-07-12T13:59:00Z");
}

#[tokio::test]
async fn test_ingest_failure_spike_recommends_alert() {
    let (app, state) = setup_test_app().await;
    seed_quiet_window(&state.engine);

    // 40 failed out of 1615 in the window is ~2.5%, over the 2% critical rule
    let response = app
        .oneshot(post_json(
            "/api/transaction",
            serde_json::json!({
                "timestamp": "2025-07-12T13:59:00Z",
                "status": "failed",
                "count": 40
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["recommendation"], "ALERT");
    assert_eq!(body["should_alert"], true);
    assert_eq!(body["severity"], "WARNING");
    assert_eq!(body["anomaly_score"], 50);
    assert_eq!(body["alerts"][0]["status"], "failed");
    assert_eq!(body["alerts"][0]["emitted"], true);
}

#[tokio::test]
async fn test_ingest_rejects_unknown_status() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/transaction",
            serde_json::json!({
                "timestamp": "2025-07-12 13:59:00",
                "status": "pending",
                "count": 3
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("pending"));
}

#[tokio::test]
async fn test_ingest_rejects_negative_count_and_bad_timestamp() {
    let (app, _state) = setup_test_app().await;

    let negative = app
        .clone()
        .oneshot(post_json(
            "/api/transaction",
            serde_json::json!({
                "timestamp": "2025-07-12 13:59:00",
                "status": "failed",
                "count": -1
            }),
        ))
        .await
        .unwrap();
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    let bad_time = app
        .oneshot(post_json(
            "/api/transaction",
            serde_json::json!({
                "timestamp": "yesterday",
                "status": "failed",
                "count": 1
            }),
        ))
        .await
        .unwrap();
    assert_eq!(bad_time.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_rejects_malformed_body_as_json_error() {
    let (app, state) = setup_test_app().await;

    let missing_count = app
        .clone()
        .oneshot(post_json(
            "/api/transaction",
            serde_json::json!({
                "timestamp": "2025-07-12 13:59:00",
                "status": "failed"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(missing_count.status(), StatusCode::BAD_REQUEST);
    let body = json_body(missing_count).await;
    assert!(body["error"].as_str().unwrap().contains("count"));

    let not_json = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/transaction")
                .header("content-type", "application/json")
                .body(Body::from("timestamp=now"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);
    let body = json_body(not_json).await;
    assert!(body["error"].is_string());

    assert!(state.engine.store().is_empty());
}

#[tokio::test]
async fn test_bad_query_parameter_is_json_error() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/api/alerts?limit=lots")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_window_metrics_query() {
    let (app, state) = setup_test_app().await;
    seed_quiet_window(&state.engine);

    let response = app
        .clone()
        .oneshot(get("/api/metrics?window=5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    // Both window ends are inclusive: 13:54 through 13:59
    assert_eq!(body["window_minutes"], 5);
    assert_eq!(body["metrics"]["approved"]["window_count"], 600);
    assert_eq!(body["metrics"]["denied"]["window_count"], 30);
    assert_eq!(body["metrics"]["denied"]["total_count"], 630);

    let zero = app.oneshot(get("/api/metrics?window=0")).await.unwrap();
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_alert_queries_after_spike() {
    let (app, state) = setup_test_app().await;
    seed_quiet_window(&state.engine);
    let ts = Utc.with_ymd_and_hms(2025, 7, 12, 13, 59, 0).unwrap();
    state
        .engine
        .ingest_observation(Observation::new(ts, TransactionStatus::Failed, 40));

    let alerts = json_body(
        app.clone()
            .oneshot(get("/api/alerts?limit=5"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(alerts["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(alerts["alerts"][0]["severity"], "WARNING");

    let summary = json_body(
        app.oneshot(get("/api/alerts/summary?minutes=60"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(summary["minutes"], 60);
    assert_eq!(summary["summary"][0]["status"], "failed");
    assert_eq!(summary["summary"][0]["alert_count"], 1);
}

#[tokio::test]
async fn test_baseline_before_first_refresh() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/api/baseline")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["loaded"], false);
    assert!(body["baseline"]["stats"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::BASELINE, "using stale baseline")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    // Degraded still returns 200 (operational)
    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "degraded");
    assert!(health["components"]["store"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_503_after_repeated_store_failures() {
    let (app, state) = setup_test_app().await;

    for _ in 0..3 {
        state
            .health_registry
            .record_failure(components::STORE, "disk full")
            .await;
    }

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health = json_body(response).await;
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_tracks_ready_flag() {
    let (app, state) = setup_test_app().await;

    // Not ready until bootstrap completes
    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;
    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let readiness = json_body(response).await;
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;
    seed_quiet_window(&state.engine);
    tokio_test::assert_ok!(state.engine.ingest("2025-07-12 13:59:00", "denied", 5));

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("txmon_observations_ingested_total"));
    assert!(metrics_text.contains("txmon_ingest_latency_seconds_bucket"));
}
