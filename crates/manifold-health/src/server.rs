//! HTTP surface of the health registry: `/healthz` and `/metrics`.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;

use crate::exposition::render_readiness;
use crate::health::HealthServer;

/// Build the router serving `GET /healthz` and `GET /metrics`.
pub fn health_router(health: HealthServer) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(health)
}

/// 200 when every component is ready, 500 otherwise; JSON body either way.
pub async fn healthz(State(health): State<HealthServer>) -> impl IntoResponse {
    let status = if health.all_ready() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        [("content-type", "application/json")],
        health.readiness_json(),
    )
}

/// Prometheus exposition of component readiness.
pub async fn metrics(State(health): State<HealthServer>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        render_readiness(&health.snapshot()),
    )
}
