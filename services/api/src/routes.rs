use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use seatwatch::workflows::admission::admission_router;
use seatwatch::workflows::alerts::alerts_router;
use seatwatch::workflows::strategy::strategy_router;
use seatwatch::workflows::turnover::to_events_router;

use crate::infra::{AppState, Services};
use crate::jobs::{jobs_router, JobState};

/// Every workflow router plus the operational endpoints. `AppState` must be layered on by
/// the caller.
pub(crate) fn with_api_routes(services: &Services, jobs: JobState) -> Router {
    admission_router(services.admission.clone())
        .merge(strategy_router(services.strategy.clone()))
        .merge(alerts_router(services.subscriptions.clone()))
        .merge(to_events_router(services.events.clone()))
        .merge(jobs_router(jobs))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
