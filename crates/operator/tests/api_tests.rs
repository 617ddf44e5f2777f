//! Integration tests for the operator API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use flare_operator::api::{create_router, AppState};
use operator_lib::health::{components, HealthRegistry};
use operator_lib::OperatorMetrics;
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CONTROLLER).await;
    health_registry.register(components::OBJECT_STORE).await;

    let state = Arc::new(AppState::new(health_registry));
    (create_router(state.clone()), state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_healthz_reports_components() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["controller"].is_object());
    assert!(health["components"]["object_store"].is_object());
}

#[tokio::test]
async fn test_healthz_stays_up_while_store_degraded() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(components::OBJECT_STORE, "connection refused")
        .await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["object_store"]["message"],
        "connection refused"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_controller_stopped() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::CONTROLLER, "Controller stopped")
        .await;

    let (status, _) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_follows_initialization() {
    let (app, state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "Operator not yet initialized");

    state.health_registry.set_ready(true).await;
    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_operator_metrics() {
    let (app, _state) = setup_test_app().await;
    let metrics = OperatorMetrics::new();
    metrics.observe_reconcile_duration(0.02);
    metrics.inc_reconcile_outcome("completed");
    metrics.inc_object_apply("Deployment", "created");

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("flare_operator_reconcile_duration_seconds_bucket"));
    assert!(text.contains("flare_operator_reconcile_outcomes_total{outcome=\"completed\"}"));
    assert!(text.contains("flare_operator_object_applies_total"));
}
